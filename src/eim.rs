//! The (discrete) empirical interpolation method.
//!
//! An [`EimApproximation`] represents a parametrized function or operator $g(\mu)$ by
//! $g_N(\mu) = \sum_{i=1}^N c_i(\mu) \xi_i$, where the coefficients solve the interpolation
//! problem at $N$ selected locations. Evaluating $g$ at the locations only requires the cells of a
//! [`ReducedMesh`](crate::reduced_mesh::ReducedMesh), so the online cost does not depend on the
//! size of the full mesh.
mod approximation;
mod factory;
mod interpolation;
mod reduction;

pub use approximation::*;
pub use factory::*;
pub use interpolation::*;
pub use reduction::*;
