use crate::affine::Tensor;
use crate::context::ReductionContext;
use crate::eim::{InterpolationMatrix, ParametrizedFactory};
use crate::expression::Classification;
use crate::io::Folder;
use crate::parameters::Parameter;
use crate::problem::{ParametrizedProblem, ProblemState};
use crate::reduced_mesh::ReducedMesh;
use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// How the basis of an approximation is generated offline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisGeneration {
    /// Select the worst-approximated snapshot in each iteration.
    Greedy,
    /// Compress all snapshots by POD and select locations from the modes.
    Pod,
}

impl Default for BasisGeneration {
    fn default() -> Self {
        Self::Greedy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApproximationKind {
    Stationary,
    /// Snapshots are taken at every time of the grid, for every training parameter.
    TimeDependent { time_grid: Vec<f64> },
}

impl ApproximationKind {
    /// Times at which snapshots are taken.
    pub fn snapshot_times(&self) -> Vec<f64> {
        match self {
            Self::Stationary => vec![0.0],
            Self::TimeDependent { time_grid } => time_grid.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedApproximation {
    basis: Vec<DVector<f64>>,
    locations: Vec<usize>,
    interpolation_matrix: InterpolationMatrix,
    #[serde(default)]
    selected_snapshots: Vec<(Parameter, f64)>,
}

/// An empirical interpolation of the snapshots of a [`ParametrizedFactory`].
pub struct EimApproximation {
    state: ProblemState,
    context: Rc<ReductionContext>,
    factory: Box<dyn ParametrizedFactory>,
    kind: ApproximationKind,
    basis: Vec<DVector<f64>>,
    locations: Vec<usize>,
    interpolation_matrix: InterpolationMatrix,
    reduced_mesh: ReducedMesh,
    /// Parameter and time of the training snapshot behind each greedily selected basis function.
    selected_snapshots: Vec<(Parameter, f64)>,
    folder: Option<Folder>,
}

impl EimApproximation {
    pub fn new(
        context: &Rc<ReductionContext>,
        factory: Box<dyn ParametrizedFactory>,
        kind: ApproximationKind,
    ) -> Self {
        let reduced_mesh = ReducedMesh::new(factory.space());
        Self {
            state: ProblemState::new(factory.name().to_string()),
            context: Rc::clone(context),
            factory,
            kind,
            basis: Vec::new(),
            locations: Vec::new(),
            interpolation_matrix: InterpolationMatrix::new(),
            reduced_mesh,
            selected_snapshots: Vec::new(),
            folder: None,
        }
    }

    /// Persists the trained approximation in a subfolder named after the approximation.
    pub fn with_folder(mut self, folder: &Folder) -> Self {
        self.folder = Some(folder.join(self.factory.name()));
        self
    }

    pub fn context(&self) -> &Rc<ReductionContext> {
        &self.context
    }

    pub fn factory(&self) -> &dyn ParametrizedFactory {
        &*self.factory
    }

    pub fn kind(&self) -> &ApproximationKind {
        &self.kind
    }

    pub fn classification(&self) -> Classification {
        self.factory.classification()
    }

    pub fn folder(&self) -> Option<&Folder> {
        self.folder.as_ref()
    }

    /// Number of trained basis functions.
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    pub fn basis(&self) -> &[DVector<f64>] {
        &self.basis
    }

    pub fn locations(&self) -> &[usize] {
        &self.locations
    }

    /// The training parameters and times whose snapshots were selected by the greedy algorithm,
    /// in selection order. Empty for POD-generated bases.
    pub fn selected_snapshots(&self) -> &[(Parameter, f64)] {
        &self.selected_snapshots
    }

    pub(crate) fn record_selected_snapshot(&mut self, mu: &Parameter, t: f64) {
        self.selected_snapshots.push((mu.clone(), t));
    }

    pub fn interpolation_matrix(&self) -> &InterpolationMatrix {
        &self.interpolation_matrix
    }

    pub fn reduced_mesh(&self) -> &ReducedMesh {
        &self.reduced_mesh
    }

    /// Evaluates the full snapshot at the current parameter and time.
    pub fn evaluate_snapshot(&self) -> eyre::Result<DVector<f64>> {
        self.factory.evaluate(&self.mu(), self.time())
    }

    /// The basis functions as tensors of the approximated object, in selection order.
    pub fn basis_tensors(&self) -> eyre::Result<Vec<Tensor>> {
        self.basis.iter().map(|xi| self.factory.to_tensor(xi)).collect()
    }

    /// Adds a basis function and its interpolation location.
    ///
    /// # Panics
    ///
    /// Panics if the location was selected before.
    pub fn enrich(&mut self, basis_function: DVector<f64>, location: usize) {
        assert!(
            !self.locations.contains(&location),
            "Location {location} was already selected"
        );
        let row: Vec<f64> = self.basis.iter().map(|xi| xi[location]).collect();
        let column: Vec<f64> = self
            .locations
            .iter()
            .chain(std::iter::once(&location))
            .map(|&x| basis_function[x])
            .collect();
        self.interpolation_matrix.enrich(&row, &column);
        self.basis.push(basis_function);
        self.locations.push(location);
        self.reduced_mesh
            .append(&self.factory.location_dofs(location), &self.context);
    }

    /// Interpolation coefficients for a full snapshot, using the first `n` basis functions.
    pub fn interpolation_coefficients(
        &self,
        snapshot: &DVector<f64>,
        n: usize,
    ) -> eyre::Result<DVector<f64>> {
        let rhs = DVector::from_iterator(n, self.locations[..n].iter().map(|&x| snapshot[x]));
        Ok(self.interpolation_matrix.solve(&rhs)?)
    }

    /// $\sum_{i \le n} c_i \xi_i$.
    pub fn expand(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.factory.snapshot_dim());
        for (c, xi) in coefficients.iter().zip(&self.basis) {
            result.axpy(*c, xi, 1.0);
        }
        result
    }

    /// The interpolant of a full snapshot with the first `n` basis functions.
    pub fn interpolate_snapshot(
        &self,
        snapshot: &DVector<f64>,
        n: usize,
    ) -> eyre::Result<DVector<f64>> {
        let coefficients = self.interpolation_coefficients(snapshot, n)?;
        Ok(self.expand(&coefficients))
    }

    /// Online coefficients at the current parameter and time, using the first `n` basis functions
    /// (all if `None`).
    ///
    /// The coefficients are evaluated on the reduced mesh only. The result always has one entry per
    /// trained basis function; entries beyond `n` are zero.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of trained basis functions.
    pub fn compute_interpolated_theta(&self, n: Option<usize>) -> eyre::Result<Vec<f64>> {
        let trained = self.len();
        let n = n.unwrap_or(trained);
        assert!(
            n <= trained,
            "Requested {n} basis functions of {}, but only {trained} were trained",
            self.name()
        );
        let mut theta = vec![0.0; trained];
        if n == 0 {
            return Ok(theta);
        }
        let level = self.reduced_mesh.level(n);
        let values = self
            .factory
            .evaluate_at_locations(&self.mu(), self.time(), &level, &self.locations[..n])?;
        let coefficients = self.interpolation_matrix.solve(&values)?;
        theta[..n].copy_from_slice(coefficients.as_slice());
        debug!(
            "Interpolated {} coefficients of {} on {} cells",
            n,
            self.name(),
            level.cells().len()
        );
        Ok(theta)
    }

    /// Removes all basis functions, locations and reduced mesh levels.
    pub fn reset(&mut self) {
        self.basis.clear();
        self.locations.clear();
        self.interpolation_matrix = InterpolationMatrix::new();
        self.selected_snapshots.clear();
        self.reduced_mesh.reset(&self.context);
    }

    /// Whether a trained approximation is persisted in the folder.
    pub fn is_persisted(&self) -> bool {
        self.folder
            .as_ref()
            .map_or(false, |folder| folder.contains("approximation"))
    }

    pub fn save(&self) -> eyre::Result<()> {
        if let Some(folder) = &self.folder {
            let persisted = PersistedApproximation {
                basis: self.basis.clone(),
                locations: self.locations.clone(),
                interpolation_matrix: self.interpolation_matrix.clone(),
                selected_snapshots: self.selected_snapshots.clone(),
            };
            folder.save(self.context.communicator(), "approximation", &persisted)?;
        }
        Ok(())
    }

    /// Loads a persisted approximation and rebuilds its reduced mesh.
    ///
    /// Fails with [`RbError::MissingArtifact`](crate::error::RbError::MissingArtifact) if nothing
    /// was persisted.
    pub fn load(&mut self) -> eyre::Result<()> {
        let folder = self
            .folder
            .clone()
            .ok_or_else(|| {
                eyre::eyre!("Approximation {} has no folder to load from", self.name())
            })?;
        let persisted: PersistedApproximation = folder.load("approximation")?;
        self.reset();
        for location in &persisted.locations {
            self.reduced_mesh
                .append(&self.factory.location_dofs(*location), &self.context);
        }
        self.basis = persisted.basis;
        self.locations = persisted.locations;
        self.interpolation_matrix = persisted.interpolation_matrix;
        self.selected_snapshots = persisted.selected_snapshots;
        info!("Loaded {} basis functions of {}", self.len(), self.name());
        Ok(())
    }

    pub(crate) fn set_parameter_and_time(&self, mu: &Parameter, t: f64) {
        self.state.set_mu(mu);
        self.state.set_time(t);
    }
}

impl ParametrizedProblem for EimApproximation {
    fn state(&self) -> &ProblemState {
        &self.state
    }
}
