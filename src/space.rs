//! Vector-valued linear Lagrange function spaces on triangle meshes.
//!
//! Degrees of freedom are interleaved per vertex: the `s`-th scalar value attached to vertex `v`
//! has the global index `v * values_per_vertex + s`. A space consists of named components,
//! each of which occupies a contiguous block of scalar values at every vertex.
use crate::geometry::TriangleCell;
use crate::linear_solver::{solve_spd, CgSettings};
use crate::mesh::{vertex_cells, TriangleMesh2d};
use crate::quadrature::TriangleQuadrature;
use eyre::eyre;
use nalgebra::{DVector, Point2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ordered_float::OrderedFloat;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SPACE_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique identity of a function space instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// Number of scalar values per vertex.
    pub dim: usize,
}

impl Component {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::vector(name, 1)
    }

    pub fn vector(name: impl Into<String>, dim: usize) -> Self {
        assert!(dim > 0, "Components must have at least one scalar value");
        Self { name: name.into(), dim }
    }
}

/// A place at which fields and expressions can be evaluated.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Location {
    Vertex(usize),
    Cell { cell: usize, barycentric: [f64; 3] },
}

struct CellLocator {
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
}

impl CellLocator {
    fn new(mesh: &TriangleMesh2d) -> Self {
        let geometries = mesh
            .cell_iter()
            .map(TriangleCell::from)
            .enumerate()
            .map(|(i, cell)| {
                let bounds = cell.bounding_box();
                let (min, max) = (bounds.min(), bounds.max());
                // Slightly enlarged boxes, so that points on cell boundaries are never missed
                let pad = 1e-10 * (1.0 + cell.diameter());
                let rect =
                    Rectangle::from_corners([min.x - pad, min.y - pad], [max.x + pad, max.y + pad]);
                GeomWithData::new(rect, i)
            })
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
        }
    }

    /// Returns the cell containing the point, or the closest cell if the point is outside the mesh.
    fn locate(&self, mesh: &TriangleMesh2d, point: &Point2<f64>) -> Option<(usize, TriangleCell)> {
        let query = [point.x, point.y];
        let triangle = |i: usize| mesh.get_cell(i).map(|t| (i, TriangleCell::from(t)));
        let containing = self
            .tree
            .locate_all_at_point(&query)
            .filter_map(|geom| triangle(geom.data))
            .find(|(_, t)| t.contains_point(point, 1e-12));
        containing.or_else(|| {
            self.tree
                .nearest_neighbor_iter(&query)
                .take(8)
                .filter_map(|geom| triangle(geom.data))
                .min_by_key(|(_, t)| {
                    let lambda = t.barycentric_coordinates(point);
                    OrderedFloat(-lambda.iter().copied().fold(f64::INFINITY, f64::min))
                })
        })
    }
}

/// A linear Lagrange function space, possibly with several (vector-valued) components.
pub struct FunctionSpace {
    id: SpaceId,
    mesh: Rc<TriangleMesh2d>,
    components: Vec<Component>,
    values_per_vertex: usize,
    vertex_cells: Vec<Vec<usize>>,
    locator: OnceCell<CellLocator>,
    mass: OnceCell<CsrMatrix<f64>>,
}

impl fmt::Debug for FunctionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpace")
            .field("id", &self.id)
            .field("components", &self.components)
            .field("num_vertices", &self.mesh.vertices().len())
            .field("num_cells", &self.mesh.connectivity().len())
            .finish()
    }
}

impl FunctionSpace {
    pub fn new(mesh: Rc<TriangleMesh2d>, components: Vec<Component>) -> Rc<Self> {
        assert!(!components.is_empty(), "A function space needs at least one component");
        let values_per_vertex = components.iter().map(|c| c.dim).sum();
        let vertex_cells = vertex_cells(&mesh);
        Rc::new(Self {
            id: SpaceId(NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed)),
            mesh,
            components,
            values_per_vertex,
            vertex_cells,
            locator: OnceCell::new(),
            mass: OnceCell::new(),
        })
    }

    /// A scalar space with a single component named `u`.
    pub fn scalar(mesh: Rc<TriangleMesh2d>) -> Rc<Self> {
        Self::new(mesh, vec![Component::scalar("u")])
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn mesh(&self) -> &Rc<TriangleMesh2d> {
        &self.mesh
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }

    pub fn values_per_vertex(&self) -> usize {
        self.values_per_vertex
    }

    pub fn num_vertices(&self) -> usize {
        self.mesh.vertices().len()
    }

    /// Total number of degrees of freedom.
    pub fn dim(&self) -> usize {
        self.num_vertices() * self.values_per_vertex
    }

    pub fn dof(&self, vertex: usize, scalar_index: usize) -> usize {
        debug_assert!(scalar_index < self.values_per_vertex);
        vertex * self.values_per_vertex + scalar_index
    }

    pub fn dof_vertex(&self, dof: usize) -> usize {
        dof / self.values_per_vertex
    }

    pub fn dof_scalar_index(&self, dof: usize) -> usize {
        dof % self.values_per_vertex
    }

    /// The range of per-vertex scalar indices occupied by the named component.
    pub fn component_range(&self, name: &str) -> Option<Range<usize>> {
        let mut offset = 0;
        for component in &self.components {
            if component.name == name {
                return Some(offset..offset + component.dim);
            }
            offset += component.dim;
        }
        None
    }

    /// All global degrees of freedom of the named component, in increasing order.
    ///
    /// # Panics
    ///
    /// Panics if the space has no such component.
    pub fn component_dofs(&self, name: &str) -> Vec<usize> {
        let range = self
            .component_range(name)
            .unwrap_or_else(|| panic!("Function space has no component named {name}"));
        (0..self.num_vertices())
            .flat_map(|v| range.clone().map(move |s| self.dof(v, s)))
            .collect()
    }

    /// Creates the space consisting only of the named component, on the same mesh.
    pub fn collapse(&self, name: &str) -> Rc<Self> {
        let component = self
            .components
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("Function space has no component named {name}"))
            .clone();
        Self::new(Rc::clone(&self.mesh), vec![component])
    }

    /// Creates a space with the same component layout on a different mesh.
    pub fn with_mesh(&self, mesh: Rc<TriangleMesh2d>) -> Rc<Self> {
        Self::new(mesh, self.components.clone())
    }

    pub fn has_same_layout(&self, other: &FunctionSpace) -> bool {
        self.components == other.components
    }

    /// For each vertex, the indices of the cells it belongs to.
    pub fn vertex_cells(&self) -> &[Vec<usize>] {
        &self.vertex_cells
    }

    pub fn cell(&self, index: usize) -> TriangleCell {
        let triangle = self
            .mesh
            .get_cell(index)
            .expect("Mesh connectivity must reference in-bounds vertices");
        TriangleCell::from(triangle)
    }

    /// Physical coordinates of a location.
    pub fn point_at(&self, location: &Location) -> Point2<f64> {
        match *location {
            Location::Vertex(v) => self.mesh.vertices()[v],
            Location::Cell { cell, barycentric } => self.cell(cell).map_barycentric(&barycentric),
        }
    }

    /// Evaluates one scalar value of a discrete field at the given location.
    pub fn evaluate(&self, values: &DVector<f64>, location: &Location, scalar_index: usize) -> f64 {
        match *location {
            Location::Vertex(v) => values[self.dof(v, scalar_index)],
            Location::Cell { cell, barycentric } => {
                let conn = &self.mesh.connectivity()[cell];
                (0..3)
                    .map(|i| barycentric[i] * values[self.dof(conn[i], scalar_index)])
                    .sum()
            }
        }
    }

    /// Finds the cell containing `point`.
    ///
    /// If the point lies outside the mesh, the closest cell is returned instead and the
    /// barycentric coordinates correspond to an extrapolation.
    pub fn locate(&self, point: &Point2<f64>) -> Option<Location> {
        let locator = self.locator.get_or_init(|| CellLocator::new(&self.mesh));
        locator
            .locate(&self.mesh, point)
            .map(|(cell, triangle)| Location::Cell {
                cell,
                barycentric: triangle.barycentric_coordinates(point),
            })
    }

    /// Evaluates all scalar values of a discrete field at an arbitrary point.
    pub fn evaluate_at_point(
        &self,
        values: &DVector<f64>,
        point: &Point2<f64>,
    ) -> eyre::Result<DVector<f64>> {
        let location = self
            .locate(point)
            .ok_or_else(|| eyre!("Cannot evaluate field on an empty mesh"))?;
        Ok(DVector::from_fn(self.values_per_vertex, |s, _| {
            self.evaluate(values, &location, s)
        }))
    }

    /// Nodal interpolation of a function given by its values at each point.
    pub fn interpolate<F>(&self, mut f: F) -> DVector<f64>
    where
        F: FnMut(&Point2<f64>, &mut [f64]),
    {
        let mut values = DVector::zeros(self.dim());
        let mut buffer = vec![0.0; self.values_per_vertex];
        for (v, x) in self.mesh.vertices().iter().enumerate() {
            buffer.fill(0.0);
            f(x, &mut buffer);
            for (s, value) in buffer.iter().enumerate() {
                values[self.dof(v, s)] = *value;
            }
        }
        values
    }

    /// The (block-diagonal) mass matrix of the space.
    pub fn mass_matrix(&self) -> &CsrMatrix<f64> {
        self.mass.get_or_init(|| {
            let n = self.dim();
            let mut coo = CooMatrix::new(n, n);
            for (index, conn) in self.mesh.connectivity().iter().enumerate() {
                let area = self.cell(index).area();
                for a in 0..3 {
                    for b in 0..3 {
                        let m_ab = if a == b { area / 6.0 } else { area / 12.0 };
                        for s in 0..self.values_per_vertex {
                            coo.push(self.dof(conn[a], s), self.dof(conn[b], s), m_ab);
                        }
                    }
                }
            }
            CsrMatrix::from(&coo)
        })
    }

    /// $L^2$ projection of a (possibly discontinuous) function onto the space.
    ///
    /// The function is evaluated at the quadrature points of each cell, and writes all scalar
    /// values of the field into the provided buffer.
    pub fn project<F>(
        &self,
        quadrature: &TriangleQuadrature,
        mut f: F,
    ) -> eyre::Result<DVector<f64>>
    where
        F: FnMut(&Location, &Point2<f64>, &mut [f64]),
    {
        let mut rhs = DVector::zeros(self.dim());
        let mut buffer = vec![0.0; self.values_per_vertex];
        for (index, conn) in self.mesh.connectivity().iter().enumerate() {
            let triangle = self.cell(index);
            let area = triangle.area();
            for (weight, barycentric) in quadrature.iter() {
                let location = Location::Cell {
                    cell: index,
                    barycentric: *barycentric,
                };
                let x = triangle.map_barycentric(barycentric);
                buffer.fill(0.0);
                f(&location, &x, &mut buffer);
                for a in 0..3 {
                    for (s, value) in buffer.iter().enumerate() {
                        rhs[self.dof(conn[a], s)] += area * weight * value * barycentric[a];
                    }
                }
            }
        }
        Ok(solve_spd(self.mass_matrix(), &rhs, &CgSettings::default())?)
    }
}

/// A discrete field in a function space.
#[derive(Debug, Clone)]
pub struct Function {
    space: Rc<FunctionSpace>,
    values: DVector<f64>,
}

impl Function {
    pub fn new(space: Rc<FunctionSpace>, values: DVector<f64>) -> Self {
        assert_eq!(values.len(), space.dim(), "Values must match the dimension of the space");
        Self { space, values }
    }

    pub fn zeros(space: Rc<FunctionSpace>) -> Self {
        let values = DVector::zeros(space.dim());
        Self { space, values }
    }

    pub fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn into_values(self) -> DVector<f64> {
        self.values
    }

    pub fn evaluate_at_point(&self, point: &Point2<f64>) -> eyre::Result<DVector<f64>> {
        self.space.evaluate_at_point(&self.values, point)
    }

    /// Extracts the named component as a field in the collapsed space.
    pub fn component(&self, name: &str) -> Function {
        let collapsed = self.space.collapse(name);
        let range = self
            .space
            .component_range(name)
            .expect("Collapsing succeeded, so the component exists");
        let values = DVector::from_fn(collapsed.dim(), |i, _| {
            let v = collapsed.dof_vertex(i);
            let s = collapsed.dof_scalar_index(i);
            self.values[self.space.dof(v, range.start + s)]
        });
        Function::new(collapsed, values)
    }
}
