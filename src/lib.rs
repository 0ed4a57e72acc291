//! Reduced basis methods with (discrete) empirical interpolation for parametrized PDEs.
//!
//! The offline phase samples a truth problem over a training set of parameters, compresses the
//! snapshots and projects the problem onto the compressed basis. Terms that do not admit an affine
//! parameter dependence are first approximated by EIM/DEIM, whose online evaluation only touches a
//! reduced mesh made up of the cells around the interpolation locations.
pub mod affine;
pub mod assembly;
pub mod collective;
pub mod context;
pub mod deim_problem;
pub mod eim;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod form;
pub mod geometry;
pub mod io;
pub mod linear_solver;
pub mod mesh;
pub mod online_size;
pub mod parameters;
pub mod pod;
pub mod problem;
pub mod quadrature;
pub mod rb;
pub mod reduced_mesh;
pub mod space;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate fenris;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
