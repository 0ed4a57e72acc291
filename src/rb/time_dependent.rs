//! Nested POD compression of time-dependent truth problems.
use crate::context::ReductionContext;
use crate::error::RbError;
use crate::io::{ErrorAnalysisTable, Folder};
use crate::online_size::OnlineSize;
use crate::parameters::{Distribution, ParameterSpaceSubset};
use crate::pod::{inner_product, norm, ProperOrthogonalDecomposition};
use crate::problem::TruthProblem;
use crate::rb::reduction::{mask_component, ComponentSetting};
use crate::rb::BasisFunctionsMatrix;
use eyre::{eyre, WrapErr};
use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A truth problem whose solve produces one snapshot per time of a fixed grid.
pub trait TimeDependentProblem: TruthProblem {
    /// Times of the snapshots returned by [`solve_trajectory`](Self::solve_trajectory).
    fn trajectory_times(&self) -> Vec<f64>;

    /// Solves at the current parameter over the whole time grid.
    fn solve_trajectory(&self) -> eyre::Result<Vec<DVector<f64>>>;
}

/// Integrates samples of a function over `times` with the trapezoidal rule.
///
/// # Panics
///
/// Panics if the number of times and values differ.
pub fn trapezoid(times: &[f64], values: &[f64]) -> f64 {
    assert_eq!(times.len(), values.len(), "Every time needs exactly one value");
    if times.len() == 1 {
        return values[0];
    }
    times
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, v)| 0.5 * (t[1] - t[0]) * (v[0] + v[1]))
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedPodSettings {
    /// Number of modes kept per trajectory.
    pub n1: usize,
    /// Discarded energy fraction per trajectory.
    pub tolerance1: f64,
    pub n_max: ComponentSetting<usize>,
    pub tolerance: ComponentSetting<f64>,
}

impl Default for NestedPodSettings {
    fn default() -> Self {
        Self {
            n1: 5,
            tolerance1: 0.0,
            n_max: ComponentSetting::Uniform(10),
            tolerance: ComponentSetting::Uniform(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NestedPodOutcome {
    pub basis: BasisFunctionsMatrix,
    /// Energy fraction retained by the global POD, per component.
    pub retained_energy: Vec<(String, f64)>,
}

/// Two-level POD: every trajectory is compressed on its own, then the modes of all trajectories,
/// weighted by the square roots of their eigenvalues, are compressed together.
pub struct NestedPodReduction<P> {
    truth: Rc<P>,
    settings: NestedPodSettings,
    training_set: ParameterSpaceSubset,
    testing_set: ParameterSpaceSubset,
    /// Output folder and the context whose communicator writes to it.
    folder: Option<(Folder, Rc<ReductionContext>)>,
}

impl<P: TimeDependentProblem> NestedPodReduction<P> {
    pub fn new(truth: &Rc<P>, settings: NestedPodSettings) -> Self {
        Self {
            truth: Rc::clone(truth),
            settings,
            training_set: ParameterSpaceSubset::default(),
            testing_set: ParameterSpaceSubset::default(),
            folder: None,
        }
    }

    pub fn with_folder(mut self, folder: Folder, context: &Rc<ReductionContext>) -> Self {
        self.folder = Some((folder.join(self.truth.name()), Rc::clone(context)));
        self
    }

    pub fn settings(&self) -> &NestedPodSettings {
        &self.settings
    }

    fn sample(&self, n: usize, distribution: Distribution) -> eyre::Result<ParameterSpaceSubset> {
        let range = self
            .truth
            .mu_range()
            .ok_or_else(|| eyre!("Problem {} has no parameter range", self.truth.name()))?;
        Ok(ParameterSpaceSubset::generate(&range, n, distribution))
    }

    pub fn initialize_training_set(
        &mut self,
        n: usize,
        distribution: Distribution,
    ) -> eyre::Result<()> {
        self.training_set = self.sample(n, distribution)?;
        Ok(())
    }

    pub fn initialize_testing_set(
        &mut self,
        n: usize,
        distribution: Distribution,
    ) -> eyre::Result<()> {
        self.testing_set = self.sample(n, distribution)?;
        Ok(())
    }

    pub fn set_training_set(&mut self, training_set: ParameterSpaceSubset) {
        self.training_set = training_set;
    }

    pub fn set_testing_set(&mut self, testing_set: ParameterSpaceSubset) {
        self.testing_set = testing_set;
    }

    fn trajectory(&self) -> eyre::Result<Vec<DVector<f64>>> {
        let truth = &self.truth;
        let trajectory = truth.solve_trajectory().wrap_err_with(|| {
            format!("Trajectory of {} at mu = {} failed", truth.name(), truth.mu())
        })?;
        assert_eq!(
            trajectory.len(),
            truth.trajectory_times().len(),
            "A trajectory must contain one snapshot per time"
        );
        Ok(trajectory)
    }

    pub fn offline(&self) -> eyre::Result<NestedPodOutcome> {
        if self.training_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }
        let truth = &self.truth;
        let space = truth.space();
        let components = truth.components();

        let mut global: Vec<ProperOrthogonalDecomposition> = components
            .iter()
            .map(|c| ProperOrthogonalDecomposition::new(truth.inner_product(c)))
            .collect();
        for (i, mu) in self.training_set.iter().enumerate() {
            info!("Trajectory {}/{} at mu = {}", i + 1, self.training_set.len(), mu);
            truth.set_mu(mu);
            let trajectory = self.trajectory()?;
            for (pod, component) in global.iter_mut().zip(&components) {
                let mut first = ProperOrthogonalDecomposition::new(truth.inner_product(component));
                for snapshot in &trajectory {
                    first.store_snapshot(mask_component(space, component, snapshot));
                }
                let result = first.apply(self.settings.n1, self.settings.tolerance1);
                debug!("Trajectory {} of component {}: {} modes", i + 1, component, result.len());
                for (mode, eigenvalue) in result.modes.into_iter().zip(&result.eigenvalues) {
                    pod.store_weighted_snapshot(mode, eigenvalue.sqrt());
                }
            }
        }

        let n_max = self.settings.n_max.resolve(&components);
        let tolerance = self.settings.tolerance.resolve(&components);
        let mut basis = BasisFunctionsMatrix::new(space.dim(), &components);
        let mut retained_energy = Vec::with_capacity(components.len());
        for ((pod, (component, n_max)), (_, tolerance)) in global.iter().zip(n_max).zip(tolerance) {
            let result = pod.apply(n_max, tolerance);
            let energy = result
                .len()
                .checked_sub(1)
                .map_or(0.0, |n| result.retained_energy[n]);
            info!(
                "Component {}: {} basis functions, retained energy {:.6}",
                component,
                result.len(),
                energy
            );
            if let Some((folder, context)) = &self.folder {
                result.save(folder, &format!("eigenvalues_{component}"), context.communicator())?;
            }
            for mode in result.modes {
                basis.enrich(&component, mode);
            }
            retained_energy.push((component, energy));
        }
        if let Some((folder, context)) = &self.folder {
            folder.save(context.communicator(), "basis_functions", &basis)?;
        }
        Ok(NestedPodOutcome { basis, retained_energy })
    }

    /// Time-integrated projection errors of testing trajectories onto the first `n` basis
    /// functions of every component, for `n` in `1..=n_max`.
    ///
    /// The error of a trajectory is $\sqrt{\int_0^T \|u(t) - P_n u(t)\|^2 dt}$.
    pub fn error_analysis(
        &self,
        basis: &BasisFunctionsMatrix,
        n_max: Option<usize>,
    ) -> eyre::Result<ErrorAnalysisTable> {
        if self.testing_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }
        let truth = &self.truth;
        let space = truth.space();
        let components = truth.components();
        let times = truth.trajectory_times();
        let trained = basis.online_size();
        let n_max = n_max.unwrap_or_else(|| trained.iter().map(|(_, n)| n).max().unwrap_or(0));

        let n_values: Vec<usize> = (1..=n_max).collect();
        let mut table = ErrorAnalysisTable::new(n_values.clone(), self.testing_set.len());
        for component in &components {
            table.add_column(&format!("error_{component}"));
            table.add_column(&format!("relative_error_{component}"));
        }

        let inner_products: Vec<_> = components.iter().map(|c| truth.inner_product(c)).collect();
        for (sample, mu) in self.testing_set.iter().enumerate() {
            truth.set_mu(mu);
            let trajectory = self.trajectory()?;
            for &n in &n_values {
                let size = OnlineSize::uniform(&components, n).min(&trained);
                for (component, x) in components.iter().zip(&inner_products) {
                    let modes = &basis.component(component)[..size.get(component).unwrap_or(0)];
                    let (errors, references): (Vec<f64>, Vec<f64>) = trajectory
                        .iter()
                        .map(|snapshot| {
                            let u = mask_component(space, component, snapshot);
                            let mut projection = DVector::zeros(u.len());
                            for mode in modes {
                                projection.axpy(inner_product(x.as_ref(), mode, &u), mode, 1.0);
                            }
                            (
                                norm(x.as_ref(), &(&u - projection)).powi(2),
                                norm(x.as_ref(), &u).powi(2),
                            )
                        })
                        .unzip();
                    let error = trapezoid(&times, &errors).max(0.0).sqrt();
                    let reference = trapezoid(&times, &references).max(0.0).sqrt();
                    let relative = if reference > 0.0 { error / reference } else { error };
                    table.set(&format!("error_{component}"), n, sample, error);
                    table.set(&format!("relative_error_{component}"), n, sample, relative);
                }
            }
        }

        info!("Projection error analysis of {}:\n{}", truth.name(), table);
        Ok(table)
    }
}
