//! Reduced basis methods: POD-Galerkin reduction of truth problems.
mod basis;
mod reduced_problem;
mod reduction;
mod time_dependent;

pub use basis::*;
pub use reduced_problem::*;
pub use reduction::*;
pub use time_dependent::*;
