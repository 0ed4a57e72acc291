//! Proper Orthogonal Decomposition by the method of snapshots.
use crate::collective::Communicator;
use crate::io::Folder;
use log::{debug, info};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

/// Computes $a^T X b$, where $X$ is the identity if no matrix is given.
pub fn inner_product(matrix: Option<&CsrMatrix<f64>>, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    match matrix {
        None => a.dot(b),
        Some(x) => a.dot(&(x * b)),
    }
}

pub fn norm(matrix: Option<&CsrMatrix<f64>>, a: &DVector<f64>) -> f64 {
    inner_product(matrix, a, a).max(0.0).sqrt()
}

/// Snapshot storage and compression.
#[derive(Debug, Clone)]
pub struct ProperOrthogonalDecomposition {
    inner_product: Option<CsrMatrix<f64>>,
    snapshots: Vec<DVector<f64>>,
}

/// The outcome of [`ProperOrthogonalDecomposition::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodResult {
    /// All eigenvalues of the correlation matrix in decreasing order.
    pub eigenvalues: Vec<f64>,
    /// `retained_energy[n]` is the fraction of the total energy captured by the first `n + 1`
    /// modes.
    pub retained_energy: Vec<f64>,
    #[serde(skip)]
    pub modes: Vec<DVector<f64>>,
}

impl PodResult {
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Saves eigenvalues and retained energy (not the modes).
    pub fn save(
        &self,
        folder: &Folder,
        name: &str,
        communicator: &dyn Communicator,
    ) -> eyre::Result<()> {
        folder.save(communicator, name, self)
    }
}

impl ProperOrthogonalDecomposition {
    /// `inner_product` defines the norm in which modes are orthonormal.
    pub fn new(inner_product: Option<CsrMatrix<f64>>) -> Self {
        Self {
            inner_product,
            snapshots: Vec::new(),
        }
    }

    pub fn store_snapshot(&mut self, snapshot: DVector<f64>) {
        if let Some(first) = self.snapshots.first() {
            assert_eq!(first.len(), snapshot.len(), "All snapshots must have the same dimension");
        }
        self.snapshots.push(snapshot);
    }

    /// Stores `weight * snapshot`.
    pub fn store_weighted_snapshot(&mut self, snapshot: DVector<f64>, weight: f64) {
        self.store_snapshot(snapshot * weight);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn snapshots(&self) -> &[DVector<f64>] {
        &self.snapshots
    }

    /// Computes at most `n_max` modes, stopping as soon as the fraction of energy not retained
    /// drops to `tolerance` or below. Modes with vanishing eigenvalues are never returned.
    pub fn apply(&self, n_max: usize, tolerance: f64) -> PodResult {
        let m = self.snapshots.len();
        if m == 0 {
            return PodResult {
                eigenvalues: Vec::new(),
                retained_energy: Vec::new(),
                modes: Vec::new(),
            };
        }

        let x = self.inner_product.as_ref();
        let correlation = DMatrix::from_fn(m, m, |i, j| {
            if i <= j {
                inner_product(x, &self.snapshots[i], &self.snapshots[j])
            } else {
                0.0
            }
        });
        let correlation = DMatrix::from_fn(m, m, |i, j| correlation[(i.min(j), i.max(j))]);

        let eigen = SymmetricEigen::new(correlation);
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let eigenvalues: Vec<f64> = order.iter().map(|&k| eigen.eigenvalues[k].max(0.0)).collect();

        let total: f64 = eigenvalues.iter().sum();
        let retained_energy: Vec<f64> = eigenvalues
            .iter()
            .scan(0.0, |sum, lambda| {
                *sum += lambda;
                Some(if total > 0.0 { *sum / total } else { 1.0 })
            })
            .collect();

        let lambda_max = eigenvalues[0];
        let mut modes = Vec::new();
        for (n, &k) in order.iter().enumerate().take(n_max) {
            let lambda = eigenvalues[n];
            if lambda <= lambda_max * 1e-14 || lambda <= 0.0 {
                break;
            }
            let coefficients = eigen.eigenvectors.column(k);
            let mut mode = DVector::zeros(self.snapshots[0].len());
            for (snapshot, c) in self.snapshots.iter().zip(coefficients.iter()) {
                mode.axpy(*c, snapshot, 1.0);
            }
            let mode_norm = norm(x, &mode);
            if mode_norm == 0.0 {
                break;
            }
            mode /= mode_norm;
            // Combinations of snapshots are only orthogonal up to the accuracy of the
            // eigenvectors, so orthonormalize again with two passes of modified Gram-Schmidt
            for _ in 0..2 {
                for previous in &modes {
                    let projection = inner_product(x, previous, &mode);
                    mode.axpy(-projection, previous, 1.0);
                }
            }
            let mode_norm = norm(x, &mode);
            if mode_norm < 1e-8 {
                debug!("POD mode {} is linearly dependent on the previous modes", n + 1);
                break;
            }
            mode /= mode_norm;
            modes.push(mode);
            debug!(
                "POD mode {}: eigenvalue {:.3e}, retained energy {:.6}",
                n + 1,
                lambda,
                retained_energy[n]
            );
            if 1.0 - retained_energy[n] <= tolerance {
                break;
            }
        }

        info!(
            "POD of {} snapshots retained {} modes ({:.6} of the energy)",
            m,
            modes.len(),
            modes.len().checked_sub(1).map_or(0.0, |n| retained_energy[n])
        );
        PodResult {
            eigenvalues,
            retained_energy,
            modes,
        }
    }
}
