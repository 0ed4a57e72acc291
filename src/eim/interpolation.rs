use crate::error::RbError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// The matrix $B_{ij} = \xi_j(x_i)$ of an empirical interpolation.
///
/// Since every basis function vanishes at all previously selected locations and equals one at its
/// own location, $B$ is unit lower triangular and interpolation reduces to forward substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationMatrix {
    matrix: DMatrix<f64>,
}

impl InterpolationMatrix {
    pub fn new() -> Self {
        Self {
            matrix: DMatrix::zeros(0, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Grows the matrix by one location and one basis function.
    ///
    /// `row` holds the values of all existing basis functions at the new location, and `column`
    /// the values of the new basis function at all locations, including the new one.
    pub fn enrich(&mut self, row: &[f64], column: &[f64]) {
        let n = self.len();
        assert_eq!(row.len(), n, "New row must have one entry per existing basis function");
        assert_eq!(column.len(), n + 1, "New column must have one entry per location");
        let mut matrix = self.matrix.clone().resize(n + 1, n + 1, 0.0);
        for (j, value) in row.iter().enumerate() {
            matrix[(n, j)] = *value;
        }
        for (i, value) in column.iter().enumerate() {
            matrix[(i, n)] = *value;
        }
        self.matrix = matrix;
    }

    /// Solves $B_N c = g$ with the leading $N \times N$ block, where $N$ is the length of `rhs`.
    pub fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, RbError> {
        let n = rhs.len();
        assert!(
            n <= self.len(),
            "Cannot interpolate with {n} functions, the interpolation matrix has size {}",
            self.len()
        );
        let mut c = DVector::zeros(n);
        for i in 0..n {
            let pivot = self.matrix[(i, i)];
            if !pivot.is_finite() || pivot.abs() <= f64::EPSILON {
                return Err(RbError::SingularInterpolationMatrix { size: n, index: i });
            }
            let sum: f64 = (0..i).map(|j| self.matrix[(i, j)] * c[j]).sum();
            c[i] = (rhs[i] - sum) / pivot;
        }
        Ok(c)
    }
}

impl Default for InterpolationMatrix {
    fn default() -> Self {
        Self::new()
    }
}
