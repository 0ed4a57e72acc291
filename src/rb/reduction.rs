use crate::error::RbError;
use crate::io::{ErrorAnalysisTable, Folder};
use crate::online_size::OnlineSize;
use crate::parameters::{Distribution, ParameterSpaceSubset};
use crate::pod::{norm, PodResult, ProperOrthogonalDecomposition};
use crate::problem::{DifferentialProblem, ParametrizedProblem, ReducedProblemRef, SolveOptions};
use crate::rb::{BasisFunctionsMatrix, GalerkinReducedProblem};
use crate::space::FunctionSpace;
use eyre::{eyre, WrapErr};
use log::info;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A setting that is either shared by all components or given per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentSetting<T> {
    Uniform(T),
    PerComponent(BTreeMap<String, T>),
}

impl<T: Copy> ComponentSetting<T> {
    /// The value for every component.
    ///
    /// # Panics
    ///
    /// Panics if per-component values do not name exactly the given components.
    pub fn resolve<S: AsRef<str>>(&self, components: &[S]) -> Vec<(String, T)> {
        match self {
            Self::Uniform(value) => components
                .iter()
                .map(|c| (c.as_ref().to_string(), *value))
                .collect(),
            Self::PerComponent(values) => {
                let mut names: Vec<&str> = components.iter().map(AsRef::as_ref).collect();
                names.sort_unstable();
                let keys: Vec<&str> = values.keys().map(String::as_str).collect();
                assert_eq!(
                    keys, names,
                    "Per-component settings must name exactly the components of the problem"
                );
                components
                    .iter()
                    .map(|c| (c.as_ref().to_string(), values[c.as_ref()]))
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodGalerkinSettings {
    pub n_max: ComponentSetting<usize>,
    /// Largest fraction of the POD energy that may be discarded.
    pub tolerance: ComponentSetting<f64>,
}

impl Default for PodGalerkinSettings {
    fn default() -> Self {
        Self {
            n_max: ComponentSetting::Uniform(10),
            tolerance: ComponentSetting::Uniform(0.0),
        }
    }
}

/// Vector with the entries of all other components set to zero.
pub(crate) fn mask_component(
    space: &FunctionSpace,
    component: &str,
    vector: &DVector<f64>,
) -> DVector<f64> {
    let mut masked = DVector::zeros(vector.len());
    for dof in space.component_dofs(component) {
        masked[dof] = vector[dof];
    }
    masked
}

/// Offline driver of the POD-Galerkin method.
pub struct PodGalerkinReduction<P> {
    truth: Rc<P>,
    settings: PodGalerkinSettings,
    training_set: ParameterSpaceSubset,
    testing_set: ParameterSpaceSubset,
    folder: Option<Folder>,
}

impl<P: DifferentialProblem + 'static> PodGalerkinReduction<P> {
    pub fn new(truth: &Rc<P>) -> Self {
        Self {
            truth: Rc::clone(truth),
            settings: PodGalerkinSettings::default(),
            training_set: ParameterSpaceSubset::default(),
            testing_set: ParameterSpaceSubset::default(),
            folder: None,
        }
    }

    pub fn with_settings(mut self, settings: PodGalerkinSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Persists (and on restart, reloads) the trained basis in the given folder.
    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folder = Some(folder.join(self.truth.name()));
        self
    }

    pub fn settings(&self) -> &PodGalerkinSettings {
        &self.settings
    }

    pub fn set_n_max(&mut self, n_max: usize) {
        self.settings.n_max = ComponentSetting::Uniform(n_max);
    }

    pub fn set_n_max_per_component(&mut self, n_max: BTreeMap<String, usize>) {
        let setting = ComponentSetting::PerComponent(n_max);
        setting.resolve(&self.truth.components());
        self.settings.n_max = setting;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.settings.tolerance = ComponentSetting::Uniform(tolerance);
    }

    /// # Panics
    ///
    /// Panics unless the keys are exactly the components of the truth problem.
    pub fn set_tolerance_per_component(&mut self, tolerance: BTreeMap<String, f64>) {
        let setting = ComponentSetting::PerComponent(tolerance);
        setting.resolve(&self.truth.components());
        self.settings.tolerance = setting;
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

    pub fn training_set(&self) -> &ParameterSpaceSubset {
        &self.training_set
    }

    pub fn testing_set(&self) -> &ParameterSpaceSubset {
        &self.testing_set
    }

    /// Samples truth solutions, compresses them per component and projects the problem.
    ///
    /// The resulting reduced problem is registered in the reduction context of the truth problem,
    /// so that expressions referring to the truth solution use the reduced solution from now on.
    pub fn offline(&mut self) -> eyre::Result<Rc<GalerkinReducedProblem<P>>> {
        let basis = match self.load_basis()? {
            Some(basis) => {
                info!("Loaded {} basis functions of {}", basis.len(), self.truth.name());
                basis
            }
            None => self.compute_basis()?,
        };

        let reduced = Rc::new(GalerkinReducedProblem::new(&self.truth, basis)?);
        let registered: ReducedProblemRef = reduced.clone();
        self.truth.context().mark_trained(self.truth.id(), &registered);
        info!("Offline phase of {} completed", self.truth.name());
        Ok(reduced)
    }

    fn load_basis(&self) -> eyre::Result<Option<BasisFunctionsMatrix>> {
        match &self.folder {
            Some(folder) if folder.contains("basis_functions") => {
                Ok(Some(folder.load("basis_functions")?))
            }
            _ => Ok(None),
        }
    }

    fn compute_basis(&self) -> eyre::Result<BasisFunctionsMatrix> {
        if self.training_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }
        let truth = &self.truth;
        let space = truth.space();
        let components = truth.components();
        let communicator = truth.context().communicator();

        let mut pods: Vec<ProperOrthogonalDecomposition> = components
            .iter()
            .map(|c| ProperOrthogonalDecomposition::new(truth.inner_product(c)))
            .collect();
        for (i, mu) in self.training_set.iter().enumerate() {
            info!("Truth solve {}/{} at mu = {}", i + 1, self.training_set.len(), mu);
            truth.set_mu(mu);
            let snapshot = truth
                .solve()
                .wrap_err_with(|| format!("Truth solve of {} at mu = {mu} failed", truth.name()))?;
            for (pod, component) in pods.iter_mut().zip(&components) {
                pod.store_snapshot(mask_component(space, component, &snapshot));
            }
        }

        if let Some(folder) = &self.folder {
            folder.create(communicator)?;
            self.training_set.save(folder, "training_set", communicator)?;
        }

        let n_max = self.settings.n_max.resolve(&components);
        let tolerance = self.settings.tolerance.resolve(&components);
        let mut basis = BasisFunctionsMatrix::new(space.dim(), &components);
        for ((pod, (component, n_max)), (_, tolerance)) in pods.iter().zip(n_max).zip(tolerance) {
            let result: PodResult = pod.apply(n_max, tolerance);
            info!("Component {}: {} basis functions", component, result.len());
            if let Some(folder) = &self.folder {
                result.save(folder, &format!("eigenvalues_{component}"), communicator)?;
            }
            for mode in result.modes {
                basis.enrich(&component, mode);
            }
        }

        if let Some(folder) = &self.folder {
            folder.save(communicator, "basis_functions", &basis)?;
        }
        Ok(basis)
    }

    /// Errors between truth and reduced solutions over the testing set, per online size
    /// `1..=n_max` (uniform over all components, capped by the trained size of each component).
    pub fn error_analysis(
        &self,
        reduced: &GalerkinReducedProblem<P>,
        n_max: Option<usize>,
    ) -> eyre::Result<ErrorAnalysisTable> {
        if self.testing_set.is_empty() {
            return Err(RbError::EmptyParameterSet.into());
        }
        let truth = &self.truth;
        let space = truth.space();
        let components = truth.components();
        let trained = reduced.max_online_size();
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
            let truth_solution = truth.solve()?;
            for &n in &n_values {
                let size = OnlineSize::uniform(&components, n).min(&trained);
                reduced.set_mu(mu);
                let coefficients = reduced.solve_with(&size, &SolveOptions::default())?;
                let error = &truth_solution - reduced.reconstruct(&coefficients, &size);
                for (component, x) in components.iter().zip(&inner_products) {
                    let absolute = norm(x.as_ref(), &mask_component(space, component, &error));
                    let reference =
                        norm(x.as_ref(), &mask_component(space, component, &truth_solution));
                    let relative = if reference > 0.0 { absolute / reference } else { absolute };
                    table.set(&format!("error_{component}"), n, sample, absolute);
                    table.set(&format!("relative_error_{component}"), n, sample, relative);
                }
            }
        }

        info!("Error analysis of {}:\n{}", truth.name(), table);
        if let Some(folder) = &self.folder {
            table.save(folder, "error_analysis", truth.context().communicator())?;
        }
        Ok(table)
    }
}
