//! Shared state of a reduction: caches, the registry of trained reduced problems and the
//! communicator.
//!
//! All offline and online objects of one reduction hold a reference to the same
//! [`ReductionContext`]. Nothing in here is global: independent reductions use independent
//! contexts.
use crate::collective::{Communicator, SerialCommunicator};
use crate::evaluator::{CacheStatistics, ExpressionCache};
use crate::problem::{ProblemId, ReducedProblem, ReducedProblemRef};
use crate::reduced_mesh::{MeshId, ReducedMeshCache, ReducedMeshLevel};
use crate::space::{FunctionSpace, SpaceId};
use log::debug;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

pub struct ReductionContext {
    communicator: Rc<dyn Communicator>,
    expressions: RefCell<ExpressionCache>,
    reduced_meshes: RefCell<ReducedMeshCache>,
    full_levels: RefCell<FxHashMap<SpaceId, Rc<ReducedMeshLevel>>>,
    trained: RefCell<FxHashMap<ProblemId, Weak<dyn ReducedProblem>>>,
    /// Incremented whenever a problem is marked as trained.
    generation: Cell<usize>,
}

impl fmt::Debug for ReductionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReductionContext")
            .field("rank", &self.communicator.rank())
            .field("expressions", &self.expression_cache_statistics())
            .field("reduced_mesh_levels", &self.reduced_meshes.borrow().len())
            .field("trained", &self.trained.borrow().len())
            .finish()
    }
}

impl ReductionContext {
    /// A context for a single process.
    pub fn new() -> Rc<Self> {
        Self::with_communicator(Rc::new(SerialCommunicator))
    }

    pub fn with_communicator(communicator: Rc<dyn Communicator>) -> Rc<Self> {
        Rc::new(Self {
            communicator,
            expressions: RefCell::new(ExpressionCache::default()),
            reduced_meshes: RefCell::new(ReducedMeshCache::default()),
            full_levels: RefCell::new(FxHashMap::default()),
            trained: RefCell::new(FxHashMap::default()),
            generation: Cell::new(0),
        })
    }

    pub fn communicator(&self) -> &dyn Communicator {
        &*self.communicator
    }

    /// The trivial reduced mesh level of `space`, on which truth quantities are computed.
    pub fn full_level(&self, space: &Rc<FunctionSpace>) -> Rc<ReducedMeshLevel> {
        let mut levels = self.full_levels.borrow_mut();
        let level = levels
            .entry(space.id())
            .or_insert_with(|| Rc::new(ReducedMeshLevel::full(space)));
        Rc::clone(level)
    }

    pub(crate) fn expression_cache(&self) -> &RefCell<ExpressionCache> {
        &self.expressions
    }

    pub(crate) fn reduced_mesh_cache(&self) -> &RefCell<ReducedMeshCache> {
        &self.reduced_meshes
    }

    pub fn expression_cache_statistics(&self) -> CacheStatistics {
        self.expressions.borrow().statistics()
    }

    /// Whether cached expression evaluations refer to the given reduced mesh level.
    pub fn is_mesh_in_use(&self, mesh: MeshId) -> bool {
        self.expressions.borrow().uses_mesh(mesh)
    }

    /// Registers the reduced problem that replaces the truth problem `truth` in expressions.
    ///
    /// From now on, solution leaves referring to `truth` are computed from the reduced solution.
    pub fn mark_trained(&self, truth: ProblemId, reduced: &ReducedProblemRef) {
        debug!("Marking problem {} as trained", truth);
        self.trained.borrow_mut().insert(truth, Rc::downgrade(reduced));
        self.generation.set(self.generation.get() + 1);
    }

    /// Number of problems marked as trained so far.
    ///
    /// Substituted expressions are cached per generation.
    pub fn training_generation(&self) -> usize {
        self.generation.get()
    }

    pub fn reduced_problem(&self, truth: ProblemId) -> Option<ReducedProblemRef> {
        self.trained.borrow().get(&truth).and_then(Weak::upgrade)
    }

    pub fn is_trained(&self, truth: ProblemId) -> bool {
        self.reduced_problem(truth).is_some()
    }

    /// Discards all cached expression evaluations and reduced mesh levels.
    ///
    /// The registry of trained problems is kept.
    pub fn clear(&self) {
        self.expressions.borrow_mut().clear();
        self.reduced_meshes.borrow_mut().clear();
        self.full_levels.borrow_mut().clear();
    }
}
