//! Linear solvers for truth and reduced systems.
use crate::error::RbError;
use fenris_sparse::cg::{ConjugateGradient, RelativeResidualCriterion};
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// Settings for the preconditioned Conjugate Gradient solver used for truth systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgSettings {
    /// Relative residual tolerance.
    pub tolerance: f64,
    pub max_iterations: Option<usize>,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: Some(10_000),
        }
    }
}

/// The Jacobi preconditioner $D^{-1}$ of a matrix with stored diagonal entries.
///
/// Zero diagonal entries are left at one.
pub fn jacobi_preconditioner(matrix: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let mut inverse_diagonal = matrix.diagonal_as_csr();
    for d in inverse_diagonal.values_mut() {
        *d = if *d != 0.0 { d.recip() } else { 1.0 };
    }
    inverse_diagonal
}

/// Solves the symmetric positive definite system $A x = b$ with Jacobi-preconditioned CG.
pub fn solve_spd(
    matrix: &CsrMatrix<f64>,
    rhs: &DVector<f64>,
    settings: &CgSettings,
) -> Result<DVector<f64>, RbError> {
    let mut x = DVector::zeros(rhs.len());
    let preconditioner = jacobi_preconditioner(matrix);
    let mut cg = ConjugateGradient::new()
        .with_operator(matrix)
        .with_preconditioner(&preconditioner)
        .with_stopping_criterion(RelativeResidualCriterion::new(settings.tolerance));
    if let Some(max_iter) = settings.max_iterations {
        cg = cg.with_max_iter(max_iter);
    }
    let output = cg
        .solve_with_guess(rhs, &mut x)
        .map_err(|err| RbError::LinearSolver(err.to_string()))?;
    debug!(
        "CG converged in {} iterations (dim = {})",
        output.num_iterations,
        rhs.len()
    );
    Ok(x)
}

/// Solves a small dense system with LU factorization.
///
/// The empty system has the empty solution.
pub fn solve_dense(matrix: DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>, RbError> {
    let n = matrix.nrows();
    if n == 0 {
        return Ok(DVector::zeros(0));
    }
    matrix
        .lu()
        .solve(rhs)
        .filter(|x| x.iter().all(|x_i| x_i.is_finite()))
        .ok_or(RbError::SingularReducedSystem { n })
}
