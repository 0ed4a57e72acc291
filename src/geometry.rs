//! Linear triangle cells and the cell-wise geometric quantities that may appear in parametrized
//! expressions.
//!
//! Cells wrap the `fenris` linear triangle element. Points inside a cell are described by their
//! barycentric coordinates, which are the values of the element's basis functions.
use fenris::element::{FiniteElement, FixedNodesReferenceFiniteElement, Tri3d2Element};
use fenris::geometry::{AxisAlignedBoundingBox2d, BoundedGeometry};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

pub type Triangle2d = fenris::geometry::Triangle2d<f64>;

/// Vertices of the reference triangle of [`Tri3d2Element`].
const REFERENCE_VERTICES: [[f64; 2]; 3] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]];

/// A linear triangle cell together with its affine map from the reference element.
#[derive(Debug, Clone)]
pub struct TriangleCell {
    triangle: Triangle2d,
    element: Tri3d2Element<f64>,
    /// Inverse of the (constant) reference Jacobian. Zero for degenerate cells.
    inverse_jacobian: Matrix2<f64>,
}

impl From<Triangle2d> for TriangleCell {
    fn from(triangle: Triangle2d) -> Self {
        let element = Tri3d2Element::from(triangle);
        let jacobian = element.reference_jacobian(&Point2::origin());
        Self {
            triangle,
            element,
            inverse_jacobian: jacobian.try_inverse().unwrap_or_else(Matrix2::zeros),
        }
    }
}

fn reference_point(barycentric: &[f64; 3]) -> Point2<f64> {
    let mut xi = Point2::origin();
    for (lambda, vertex) in barycentric.iter().zip(&REFERENCE_VERTICES) {
        xi.x += lambda * vertex[0];
        xi.y += lambda * vertex[1];
    }
    xi
}

impl TriangleCell {
    pub fn triangle(&self) -> &Triangle2d {
        &self.triangle
    }

    pub fn element(&self) -> &Tri3d2Element<f64> {
        &self.element
    }

    /// Signed area, positive for counter-clockwise orientation.
    pub fn signed_area(&self) -> f64 {
        self.triangle.signed_area()
    }

    pub fn area(&self) -> f64 {
        self.triangle.area()
    }

    /// Length of the longest edge.
    pub fn diameter(&self) -> f64 {
        self.element.diameter()
    }

    /// Radius of the circumscribed circle.
    pub fn circumradius(&self) -> f64 {
        let area = self.area();
        if area == 0.0 {
            return f64::INFINITY;
        }
        let [a, b, c] = self.triangle.sides();
        a.norm() * b.norm() * c.norm() / (4.0 * area)
    }

    /// Physical gradients of the barycentric coordinate functions, i.e. of the element's basis
    /// functions.
    pub fn barycentric_gradients(&self) -> [Vector2<f64>; 3] {
        let reference = self.element.gradients(&Point2::origin());
        let physical = self.inverse_jacobian.transpose() * reference;
        [
            physical.column(0).into_owned(),
            physical.column(1).into_owned(),
            physical.column(2).into_owned(),
        ]
    }

    pub fn barycentric_coordinates(&self, point: &Point2<f64>) -> [f64; 3] {
        let origin = self.triangle.0[0];
        let xi = Point2::new(REFERENCE_VERTICES[0][0], REFERENCE_VERTICES[0][1])
            + self.inverse_jacobian * (point.coords - origin.coords);
        let basis = self.element.evaluate_basis(&xi);
        [basis[0], basis[1], basis[2]]
    }

    pub fn map_barycentric(&self, barycentric: &[f64; 3]) -> Point2<f64> {
        self.element.map_reference_coords(&reference_point(barycentric))
    }

    pub fn contains_point(&self, point: &Point2<f64>, tolerance: f64) -> bool {
        self.barycentric_coordinates(point)
            .iter()
            .all(|&lambda| lambda >= -tolerance)
    }

    pub fn bounding_box(&self) -> AxisAlignedBoundingBox2d<f64> {
        self.triangle.bounding_box()
    }
}

/// Geometric quantities that are constant on each cell of a mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometricKind {
    CellDiameter,
    CellVolume,
    Circumradius,
}

impl GeometricKind {
    pub fn evaluate(&self, cell: &TriangleCell) -> f64 {
        match self {
            Self::CellDiameter => cell.diameter(),
            Self::CellVolume => cell.area(),
            Self::Circumradius => cell.circumradius(),
        }
    }
}
