use crate::eim::{BasisGeneration, EimApproximation};
use crate::error::RbError;
use crate::io::ErrorAnalysisTable;
use crate::parameters::{Distribution, Parameter, ParameterSpaceSubset};
use crate::pod::ProperOrthogonalDecomposition;
use crate::problem::ParametrizedProblem;
use eyre::eyre;
use itertools::Itertools;
use log::{info, warn};
use nalgebra::DVector;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EimSettings {
    pub n_max: usize,
    /// Greedy: absolute tolerance on the maximum residual. POD: largest discarded energy fraction.
    pub tolerance: f64,
    pub basis_generation: BasisGeneration,
}

impl Default for EimSettings {
    fn default() -> Self {
        Self {
            n_max: 10,
            tolerance: 0.0,
            basis_generation: BasisGeneration::Greedy,
        }
    }
}

/// A training snapshot together with the parameter and time it was computed at.
struct Snapshot {
    mu: Parameter,
    t: f64,
    values: DVector<f64>,
}

/// Index and absolute value of the largest entry, skipping `excluded` indices.
fn arg_max_abs(values: &DVector<f64>, excluded: &[usize]) -> Option<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(i))
        .map(|(i, v)| (i, v.abs()))
        .max_by_key(|&(i, v)| (OrderedFloat(v), std::cmp::Reverse(i)))
}

/// Offline driver of empirical interpolation.
#[derive(Debug, Clone, Default)]
pub struct EimReductionMethod {
    settings: EimSettings,
    training_set: ParameterSpaceSubset,
    testing_set: ParameterSpaceSubset,
}

impl EimReductionMethod {
    pub fn new(settings: EimSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &EimSettings {
        &self.settings
    }

    pub fn set_n_max(&mut self, n_max: usize) {
        self.settings.n_max = n_max;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.settings.tolerance = tolerance;
    }

    pub fn set_training_set(&mut self, training_set: ParameterSpaceSubset) {
        self.training_set = training_set;
    }

    pub fn set_testing_set(&mut self, testing_set: ParameterSpaceSubset) {
        self.testing_set = testing_set;
    }

    fn sample(
        approximation: &EimApproximation,
        n: usize,
        distribution: Distribution,
    ) -> eyre::Result<ParameterSpaceSubset> {
        let range = approximation
            .mu_range()
            .ok_or_else(|| eyre!("Approximation {} has no parameter range", approximation.name()))?;
        Ok(ParameterSpaceSubset::generate(&range, n, distribution))
    }

    pub fn initialize_training_set(
        &mut self,
        approximation: &EimApproximation,
        n: usize,
        distribution: Distribution,
    ) -> eyre::Result<()> {
        self.training_set = Self::sample(approximation, n, distribution)?;
        Ok(())
    }

    pub fn initialize_testing_set(
        &mut self,
        approximation: &EimApproximation,
        n: usize,
        distribution: Distribution,
    ) -> eyre::Result<()> {
        self.testing_set = Self::sample(approximation, n, distribution)?;
        Ok(())
    }

    pub fn training_set(&self) -> &ParameterSpaceSubset {
        &self.training_set
    }

    pub fn testing_set(&self) -> &ParameterSpaceSubset {
        &self.testing_set
    }

    fn snapshots(
        &self,
        approximation: &EimApproximation,
        set: &ParameterSpaceSubset,
    ) -> eyre::Result<Vec<Snapshot>> {
        let times = approximation.kind().snapshot_times();
        let mut snapshots = Vec::with_capacity(set.len() * times.len());
        for mu in set {
            for &t in &times {
                approximation.set_parameter_and_time(mu, t);
                snapshots.push(Snapshot {
                    mu: mu.clone(),
                    t,
                    values: approximation.evaluate_snapshot()?,
                });
            }
        }
        Ok(snapshots)
    }

    /// Trains the approximation, or loads it if a trained approximation was persisted.
    pub fn offline(&self, approximation: &mut EimApproximation) -> eyre::Result<()> {
        if approximation.is_persisted() {
            return approximation.load();
        }
        if self.training_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }

        info!(
            "EIM offline phase of {} with {} training parameters",
            approximation.name(),
            self.training_set.len()
        );
        let snapshots = self.snapshots(approximation, &self.training_set)?;
        approximation.reset();
        match self.settings.basis_generation {
            BasisGeneration::Greedy => self.greedy(approximation, &snapshots)?,
            BasisGeneration::Pod => self.pod(approximation, &snapshots)?,
        }
        info!(
            "EIM offline phase of {} selected {} basis functions",
            approximation.name(),
            approximation.len()
        );

        if let Some(folder) = approximation.folder() {
            self.training_set
                .save(folder, "training_set", approximation.context().communicator())?;
        }
        approximation.save()
    }

    fn greedy(
        &self,
        approximation: &mut EimApproximation,
        snapshots: &[Snapshot],
    ) -> eyre::Result<()> {
        let mut residuals: Vec<DVector<f64>> = snapshots.iter().map(|s| s.values.clone()).collect();

        for n in 1..=self.settings.n_max {
            // The first basis function comes from the first training snapshot
            let candidates = if n == 1 { &residuals[..1] } else { &residuals[..] };
            let selection = candidates
                .iter()
                .enumerate()
                .filter_map(|(j, r)| {
                    arg_max_abs(r, approximation.locations()).map(|(x, value)| (j, x, value))
                })
                .max_by_key(|&(j, _, value)| (OrderedFloat(value), std::cmp::Reverse(j)));
            let Some((j, location, max_residual)) = selection else {
                break;
            };

            info!(
                "EIM iteration {}: maximum residual {:.3e} at mu = {}, t = {}",
                n, max_residual, snapshots[j].mu, snapshots[j].t
            );
            if max_residual == 0.0 {
                warn!("Residual of {} vanished after {} iterations", approximation.name(), n - 1);
                break;
            }
            if n > 1 && max_residual <= self.settings.tolerance {
                info!("Tolerance {:.3e} reached", self.settings.tolerance);
                break;
            }

            let basis_function = &residuals[j] / residuals[j][location];
            for residual in &mut residuals {
                let value = residual[location];
                residual.axpy(-value, &basis_function, 1.0);
            }
            approximation.enrich(basis_function, location);
            approximation.record_selected_snapshot(&snapshots[j].mu, snapshots[j].t);
        }
        Ok(())
    }

    fn pod(
        &self,
        approximation: &mut EimApproximation,
        snapshots: &[Snapshot],
    ) -> eyre::Result<()> {
        let mut pod = ProperOrthogonalDecomposition::new(None);
        for snapshot in snapshots {
            pod.store_snapshot(snapshot.values.clone());
        }
        let result = pod.apply(self.settings.n_max, self.settings.tolerance);

        for (n, mode) in result.modes.into_iter().enumerate() {
            let residual = if approximation.is_empty() {
                mode
            } else {
                let interpolant = approximation.interpolate_snapshot(&mode, approximation.len())?;
                mode - interpolant
            };
            let Some((location, max_residual)) =
                arg_max_abs(&residual, approximation.locations())
            else {
                break;
            };
            info!("EIM-POD iteration {}: maximum residual {:.3e}", n + 1, max_residual);
            if max_residual == 0.0 {
                warn!(
                    "Mode {} of {} is interpolated exactly, stopping",
                    n + 1,
                    approximation.name()
                );
                break;
            }
            let basis_function = &residual / residual[location];
            approximation.enrich(basis_function, location);
        }
        Ok(())
    }

    /// Maximum (absolute and relative) interpolation errors over the testing set, for every
    /// $N \le N_{max}$, evaluated through the online path.
    pub fn error_analysis(
        &self,
        approximation: &EimApproximation,
        n_max: Option<usize>,
    ) -> eyre::Result<ErrorAnalysisTable> {
        if self.testing_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }
        let n_max = n_max.unwrap_or(approximation.len()).min(approximation.len());
        let snapshots = self.snapshots(approximation, &self.testing_set)?;
        let n_values = (1..=n_max).collect_vec();
        let mut table = ErrorAnalysisTable::new(n_values.clone(), snapshots.len());
        table.add_column("error");
        table.add_column("relative_error");

        for (sample, snapshot) in snapshots.iter().enumerate() {
            approximation.set_parameter_and_time(&snapshot.mu, snapshot.t);
            let reference = snapshot.values.amax();
            for &n in &n_values {
                let theta = approximation.compute_interpolated_theta(Some(n))?;
                let interpolant = approximation.expand(&DVector::from_vec(theta));
                let error = (&snapshot.values - interpolant).amax();
                let relative = if reference > 0.0 { error / reference } else { error };
                table.set("error", n, sample, error);
                table.set("relative_error", n, sample, relative);
            }
        }

        info!("Error analysis of {}:\n{}", approximation.name(), table);
        if let Some(folder) = approximation.folder() {
            table.save(folder, "error_analysis", approximation.context().communicator())?;
        }
        Ok(table)
    }
}
