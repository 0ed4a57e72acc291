//! Parametrized problems, their shared state and the solve protocol.
use crate::affine::AffineDecomposition;
use crate::context::ReductionContext;
use crate::online_size::OnlineSize;
use crate::parameters::{Parameter, ParameterRange};
use crate::rb::BasisFunctionsMatrix;
use crate::space::FunctionSpace;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod elliptic;

pub use elliptic::{EllipticProblem, EllipticProblemBuilder, SolutionHandle, LHS_TERM, RHS_TERM};

static NEXT_PROBLEM_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique identity of a problem.
///
/// Decorators share the identity of the problem they decorate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProblemId(usize);

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    Idle,
    Solving,
    Solved,
}

/// State shared by all parametrized problems: identity, current parameter and time,
/// solve status and the latest (possibly in-progress) solution.
#[derive(Debug)]
pub struct ProblemState {
    id: ProblemId,
    name: String,
    mu: RefCell<Parameter>,
    mu_range: RefCell<Option<ParameterRange>>,
    time: Cell<f64>,
    status: Cell<SolveStatus>,
    solution: RefCell<DVector<f64>>,
    solved_at: RefCell<Option<(Parameter, f64)>>,
    solve_count: Cell<usize>,
}

impl ProblemState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProblemId(NEXT_PROBLEM_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            mu: RefCell::new(Parameter::default()),
            mu_range: RefCell::new(None),
            time: Cell::new(0.0),
            status: Cell::new(SolveStatus::Idle),
            solution: RefCell::new(DVector::zeros(0)),
            solved_at: RefCell::new(None),
            solve_count: Cell::new(0),
        }
    }

    pub fn id(&self) -> ProblemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mu(&self) -> Parameter {
        self.mu.borrow().clone()
    }

    /// # Panics
    ///
    /// Panics if a parameter range is set and `mu` has the wrong number of entries.
    pub fn set_mu(&self, mu: &Parameter) {
        if let Some(range) = &*self.mu_range.borrow() {
            assert_eq!(
                mu.dim(),
                range.dim(),
                "Problem {} expects {} parameters",
                self.name,
                range.dim()
            );
        }
        *self.mu.borrow_mut() = mu.clone();
    }

    pub fn mu_range(&self) -> Option<ParameterRange> {
        self.mu_range.borrow().clone()
    }

    /// Sets the parameter range, and resets the current parameter to its lower corner.
    pub fn set_mu_range(&self, range: ParameterRange) {
        *self.mu.borrow_mut() = range.min_parameter();
        *self.mu_range.borrow_mut() = Some(range);
    }

    pub fn time(&self) -> f64 {
        self.time.get()
    }

    pub fn set_time(&self, t: f64) {
        self.time.set(t);
    }

    pub fn status(&self) -> SolveStatus {
        self.status.get()
    }

    /// The latest solution, which is the in-progress iterate while a solve is running.
    pub fn solution(&self) -> DVector<f64> {
        self.solution.borrow().clone()
    }

    /// Stores an intermediate solution, e.g. the current iterate of a nonlinear solver.
    pub fn store_solution(&self, solution: &DVector<f64>) {
        self.solution.borrow_mut().clone_from(solution);
    }

    /// Number of completed solves.
    pub fn solve_count(&self) -> usize {
        self.solve_count.get()
    }

    /// Whether the stored solution corresponds to a completed solve at the given parameter and
    /// time.
    pub fn is_solved_at(&self, mu: &Parameter, t: f64) -> bool {
        self.status.get() == SolveStatus::Solved
            && self
                .solved_at
                .borrow()
                .as_ref()
                .map_or(false, |(solved_mu, solved_t)| solved_mu == mu && *solved_t == t)
    }

    /// Forgets a completed solve, e.g. after a change of the online size or of the solve
    /// options that the stored solution was computed with.
    pub fn invalidate(&self) {
        if self.status.get() == SolveStatus::Solved {
            self.status.set(SolveStatus::Idle);
            *self.solved_at.borrow_mut() = None;
        }
    }

    /// Marks the start of a solve.
    ///
    /// # Panics
    ///
    /// Panics if the problem is already being solved. Nested computations that need the solution
    /// of a problem that is being solved must use its in-progress solution instead.
    pub fn begin_solve(&self) -> SolveGuard<'_> {
        assert_ne!(
            self.status.get(),
            SolveStatus::Solving,
            "Recursive solve of problem {}",
            self.name
        );
        self.status.set(SolveStatus::Solving);
        SolveGuard {
            state: self,
            finished: false,
        }
    }
}

/// Keeps a problem in the [`SolveStatus::Solving`] state while alive.
///
/// Dropping the guard without calling [`finish`](Self::finish), e.g. when a solve fails,
/// returns the problem to [`SolveStatus::Idle`].
#[derive(Debug)]
pub struct SolveGuard<'a> {
    state: &'a ProblemState,
    finished: bool,
}

impl<'a> SolveGuard<'a> {
    pub fn finish(mut self, solution: DVector<f64>) -> DVector<f64> {
        let state = self.state;
        state.store_solution(&solution);
        *state.solved_at.borrow_mut() = Some((state.mu(), state.time()));
        state.solve_count.set(state.solve_count.get() + 1);
        state.status.set(SolveStatus::Solved);
        self.finished = true;
        solution
    }
}

impl<'a> Drop for SolveGuard<'a> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.status.set(SolveStatus::Idle);
        }
    }
}

pub trait ParametrizedProblem {
    fn state(&self) -> &ProblemState;

    fn id(&self) -> ProblemId {
        self.state().id()
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn mu(&self) -> Parameter {
        self.state().mu()
    }

    fn set_mu(&self, mu: &Parameter) {
        self.state().set_mu(mu)
    }

    fn mu_range(&self) -> Option<ParameterRange> {
        self.state().mu_range()
    }

    fn set_mu_range(&self, range: ParameterRange) -> eyre::Result<()> {
        self.state().set_mu_range(range);
        Ok(())
    }

    fn time(&self) -> f64 {
        self.state().time()
    }

    fn set_time(&self, t: f64) {
        self.state().set_time(t)
    }
}

/// A full-order problem.
pub trait TruthProblem: ParametrizedProblem {
    fn space(&self) -> &Rc<FunctionSpace>;

    /// Solves the problem at the current parameter and returns the solution.
    fn solve(&self) -> eyre::Result<DVector<f64>>;

    fn components(&self) -> Vec<String> {
        self.space().component_names()
    }

    /// Inner product used to compress snapshots of the given component.
    ///
    /// `None` means the Euclidean inner product of the coefficient vectors.
    fn inner_product(&self, _component: &str) -> Option<CsrMatrix<f64>> {
        None
    }
}

/// A full-order problem defined by an affine decomposition, whose solver can be driven by
/// another decomposition of the same terms (e.g. a DEIM approximation of it).
pub trait DifferentialProblem: TruthProblem + AffineDecomposition {
    fn context(&self) -> &Rc<ReductionContext>;

    fn solve_with(&self, operators: &dyn AffineDecomposition) -> eyre::Result<DVector<f64>>;

    /// Fixed-point settings of problems whose operators depend on their own solution.
    fn picard_settings(&self) -> Option<PicardSettings> {
        None
    }

    /// The time grid of time-dependent problems.
    fn time_grid(&self) -> Option<Vec<f64>> {
        None
    }
}

/// A trained reduced-order problem.
pub trait ReducedProblem: ParametrizedProblem {
    fn truth_problem(&self) -> Rc<dyn TruthProblem>;

    fn basis_functions(&self) -> &BasisFunctionsMatrix;

    /// The reduced dimension used by [`solve`](Self::solve).
    fn online_size(&self) -> OnlineSize;

    /// Solves the reduced problem at the current parameter and returns the reduced coefficients.
    fn solve(&self) -> eyre::Result<DVector<f64>>;
}

pub type ProblemRef = Rc<dyn TruthProblem>;
pub type ReducedProblemRef = Rc<dyn ReducedProblem>;

/// Settings of the fixed-point (Picard) iteration for problems that refer to their own solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PicardSettings {
    pub max_iterations: usize,
    /// Tolerance for the relative change between two iterates.
    pub tolerance: f64,
}

impl Default for PicardSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-10,
        }
    }
}

/// Number of DEIM basis functions to use online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeimSize {
    /// The same number for every approximation.
    Uniform(usize),
    /// A number per term and per index within the term.
    PerTerm(BTreeMap<String, BTreeMap<usize, usize>>),
}

/// Options of a single solve, as passed down from reduced problems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    pub deim: Option<DeimSize>,
}

impl SolveOptions {
    pub fn with_deim(deim: DeimSize) -> Self {
        Self { deim: Some(deim) }
    }
}
