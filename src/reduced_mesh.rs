//! Reduced meshes: the smallest sets of cells on which selected degrees of freedom can be evaluated
//! exactly.
//!
//! A [`ReducedMesh`] is an append-only sequence of [`ReducedMeshLevel`]s, one for each number of
//! selected locations. Levels are immutable once built and are shared, through
//! [`ReducedMeshCache`], between all users that select the same degrees of freedom.
use crate::collective::{reduce_partitions, Communicator, DofMapping};
use crate::context::ReductionContext;
use crate::mesh::TriangleMesh2d;
use crate::rb::BasisFunctionsMatrix;
use crate::space::{FunctionSpace, SpaceId};
use log::debug;
use nalgebra::DVector;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_MESH_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(usize);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Restriction of full-mesh fields of some space to the degrees of freedom of a reduced mesh.
#[derive(Debug, Clone)]
pub struct AuxiliaryInterpolator {
    reduced_to_full: Rc<[usize]>,
}

impl AuxiliaryInterpolator {
    pub fn apply(&self, full: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.reduced_to_full.len(),
            self.reduced_to_full.iter().map(|&dof| full[dof]),
        )
    }

    /// The full degree of freedom corresponding to each reduced degree of freedom.
    pub fn full_dofs(&self) -> &[usize] {
        &self.reduced_to_full
    }
}

/// A sub-mesh of a full mesh, together with the maps between the two.
pub struct ReducedMeshLevel {
    id: MeshId,
    full_space: Rc<FunctionSpace>,
    dofs: Vec<usize>,
    cells: Vec<usize>,
    vertices: Vec<usize>,
    full_to_reduced_vertex: FxHashMap<usize, usize>,
    space: Rc<FunctionSpace>,
    is_full: bool,
    auxiliary_spaces: RefCell<FxHashMap<SpaceId, Rc<FunctionSpace>>>,
}

impl fmt::Debug for ReducedMeshLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducedMeshLevel")
            .field("id", &self.id)
            .field("num_dofs", &self.dofs.len())
            .field("num_cells", &self.cells.len())
            .field("is_full", &self.is_full)
            .finish()
    }
}

impl ReducedMeshLevel {
    /// The trivial reduction that keeps every cell of the mesh of `space`.
    pub fn full(space: &Rc<FunctionSpace>) -> Self {
        let num_vertices = space.num_vertices();
        Self {
            id: MeshId::next(),
            full_space: Rc::clone(space),
            dofs: (0..space.dim()).collect(),
            cells: (0..space.mesh().connectivity().len()).collect(),
            vertices: (0..num_vertices).collect(),
            full_to_reduced_vertex: (0..num_vertices).map(|v| (v, v)).collect(),
            space: Rc::clone(space),
            is_full: true,
            auxiliary_spaces: RefCell::new(FxHashMap::default()),
        }
    }

    fn from_cells(full_space: &Rc<FunctionSpace>, dofs: Vec<usize>, cells: Vec<usize>) -> Self {
        let (mesh, vertices) = crate::mesh::keep_cells_with_vertex_map(full_space.mesh(), &cells);
        let full_to_reduced_vertex = vertices
            .iter()
            .enumerate()
            .map(|(reduced, &full)| (full, reduced))
            .collect();
        let space = full_space.with_mesh(Rc::new(mesh));
        Self {
            id: MeshId::next(),
            full_space: Rc::clone(full_space),
            dofs,
            cells,
            vertices,
            full_to_reduced_vertex,
            space,
            is_full: false,
            auxiliary_spaces: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn is_full(&self) -> bool {
        self.is_full
    }

    pub fn full_space(&self) -> &Rc<FunctionSpace> {
        &self.full_space
    }

    /// The space with the layout of the full space on the reduced mesh.
    pub fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    pub fn mesh(&self) -> &Rc<TriangleMesh2d> {
        self.space.mesh()
    }

    /// The selected full degrees of freedom, sorted.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// Indices of the kept cells in the full mesh, sorted.
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    pub fn full_vertex(&self, reduced_vertex: usize) -> usize {
        self.vertices[reduced_vertex]
    }

    pub fn reduced_vertex(&self, full_vertex: usize) -> Option<usize> {
        self.full_to_reduced_vertex.get(&full_vertex).copied()
    }

    /// Index on the reduced mesh of a full degree of freedom of a space with the layout of `space`.
    pub fn reduced_dof_in(&self, space: &FunctionSpace, full_dof: usize) -> Option<usize> {
        let reduced_vertex = self.reduced_vertex(space.dof_vertex(full_dof))?;
        Some(space.dof(reduced_vertex, space.dof_scalar_index(full_dof)))
    }

    /// Index on the reduced mesh of a full degree of freedom of the full space.
    pub fn reduced_dof(&self, full_dof: usize) -> Option<usize> {
        self.reduced_dof_in(&self.full_space, full_dof)
    }

    /// A space with the layout of `other` on this reduced mesh.
    ///
    /// # Panics
    ///
    /// Panics if `other` is not defined on the full mesh of this reduction.
    pub fn auxiliary_space(&self, other: &Rc<FunctionSpace>) -> Rc<FunctionSpace> {
        assert!(
            Rc::ptr_eq(other.mesh(), self.full_space.mesh()),
            "Auxiliary spaces must be defined on the full mesh of the reduction"
        );
        if self.is_full {
            return Rc::clone(other);
        }
        let mut spaces = self.auxiliary_spaces.borrow_mut();
        let space = spaces
            .entry(other.id())
            .or_insert_with(|| other.with_mesh(Rc::clone(self.mesh())));
        Rc::clone(space)
    }

    /// Restriction from the full space `other` to [`auxiliary_space`](Self::auxiliary_space).
    pub fn auxiliary_interpolator(&self, other: &FunctionSpace) -> AuxiliaryInterpolator {
        let num_scalars = other.values_per_vertex();
        let reduced_to_full = self
            .vertices
            .iter()
            .flat_map(|&v| (0..num_scalars).map(move |s| other.dof(v, s)))
            .collect();
        AuxiliaryInterpolator { reduced_to_full }
    }

    /// The rows of a basis of the full space `truth_space` restricted to this reduced mesh.
    pub fn auxiliary_basis_functions_matrix(
        &self,
        truth_space: &FunctionSpace,
        basis: &BasisFunctionsMatrix,
    ) -> BasisFunctionsMatrix {
        basis.restrict_rows(self.auxiliary_interpolator(truth_space).full_dofs())
    }
}

/// Finds, for each requested DOF, the cells whose closure contains it.
///
/// The cells are scanned in parallel partitions whose partial maps are merged afterwards.
fn find_dof_cells(
    full_space: &FunctionSpace,
    dofs: &[usize],
    communicator: &dyn Communicator,
) -> DofMapping {
    let mut wanted: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for &dof in dofs {
        wanted.entry(full_space.dof_vertex(dof)).or_default().push(dof);
    }

    let connectivity = full_space.mesh().connectivity();
    let num_threads = rayon::current_num_threads();
    let chunk_size = ((connectivity.len() + num_threads - 1) / num_threads).max(1);
    let partitions: Vec<DofMapping> = connectivity
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(partition, cells)| {
            let mut local = DofMapping::new();
            for (i, conn) in cells.iter().enumerate() {
                let cell = partition * chunk_size + i;
                for vertex in conn.iter() {
                    for &dof in wanted.get(vertex).into_iter().flatten() {
                        local.insert(dof, cell);
                    }
                }
            }
            local
        })
        .collect();

    communicator.all_reduce_dof_mapping(reduce_partitions(partitions))
}

/// Shares identical reduced mesh levels between all reductions of a context.
#[derive(Debug, Default)]
pub struct ReducedMeshCache {
    levels: FxHashMap<(SpaceId, Vec<usize>), Rc<ReducedMeshLevel>>,
}

impl ReducedMeshCache {
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    fn get_or_build(
        &mut self,
        full_space: &Rc<FunctionSpace>,
        sorted_dofs: Vec<usize>,
        build: impl FnOnce(Vec<usize>) -> ReducedMeshLevel,
    ) -> Rc<ReducedMeshLevel> {
        let key = (full_space.id(), sorted_dofs);
        if let Some(level) = self.levels.get(&key) {
            return Rc::clone(level);
        }
        let level = Rc::new(build(key.1.clone()));
        self.levels.insert(key, Rc::clone(&level));
        level
    }
}

/// An incrementally growing reduced mesh.
#[derive(Debug)]
pub struct ReducedMesh {
    full_space: Rc<FunctionSpace>,
    selected: Vec<usize>,
    levels: Vec<Rc<ReducedMeshLevel>>,
}

impl ReducedMesh {
    pub fn new(full_space: &Rc<FunctionSpace>) -> Self {
        Self {
            full_space: Rc::clone(full_space),
            selected: Vec::new(),
            levels: Vec::new(),
        }
    }

    pub fn full_space(&self) -> &Rc<FunctionSpace> {
        &self.full_space
    }

    /// Number of levels, i.e. the number of appended locations.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Selected full degrees of freedom in the order in which they were appended.
    pub fn selected_dofs(&self) -> &[usize] {
        &self.selected
    }

    /// Adds a level containing everything in the previous level plus the given degrees of freedom.
    pub fn append(&mut self, dofs: &[usize], context: &ReductionContext) {
        for &dof in dofs {
            assert!(dof < self.full_space.dim(), "DOF {dof} is out of bounds");
            if !self.selected.contains(&dof) {
                self.selected.push(dof);
            }
        }
        let mut sorted_dofs = self.selected.clone();
        sorted_dofs.sort_unstable();

        let previous_cells: Vec<usize> = self
            .levels
            .last()
            .map(|level| level.cells.clone())
            .unwrap_or_default();
        let full_space = Rc::clone(&self.full_space);
        let level = context
            .reduced_mesh_cache()
            .borrow_mut()
            .get_or_build(&self.full_space, sorted_dofs, |sorted_dofs| {
                let new_dofs: Vec<usize> = dofs.to_vec();
                let mapping = find_dof_cells(&full_space, &new_dofs, context.communicator());
                for dof in &new_dofs {
                    assert!(
                        mapping.cells_of(*dof).is_some(),
                        "DOF {dof} does not belong to any cell of the mesh"
                    );
                }
                let cells: BTreeSet<usize> = previous_cells
                    .into_iter()
                    .chain(mapping.all_cells())
                    .collect();
                debug!(
                    "Built reduced mesh level with {} DOFs and {} cells",
                    sorted_dofs.len(),
                    cells.len()
                );
                ReducedMeshLevel::from_cells(&full_space, sorted_dofs, cells.into_iter().collect())
            });
        self.levels.push(level);
    }

    /// The level for `n` selected locations.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or larger than the number of levels.
    pub fn level(&self, n: usize) -> Rc<ReducedMeshLevel> {
        assert!(
            n >= 1 && n <= self.levels.len(),
            "Reduced mesh has {} levels, but level {n} was requested",
            self.levels.len()
        );
        Rc::clone(&self.levels[n - 1])
    }

    pub fn levels(&self) -> &[Rc<ReducedMeshLevel>] {
        &self.levels
    }

    /// Removes all levels so that the mesh can be rebuilt from scratch.
    ///
    /// # Panics
    ///
    /// Panics if any level is still referenced by the expression cache of the context. Call
    /// [`ReductionContext::clear`] first to discard cached evaluations.
    pub fn reset(&mut self, context: &ReductionContext) {
        for level in &self.levels {
            assert!(
                !context.is_mesh_in_use(level.id()),
                "Cannot reinitialize a reduced mesh whose levels are in use by cached expressions"
            );
        }
        self.selected.clear();
        self.levels.clear();
    }
}
