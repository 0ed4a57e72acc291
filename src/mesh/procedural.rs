//! Uniform triangle meshes of rectangles.
use crate::mesh::TriangleMesh2d;
use fenris::mesh::procedural::create_rectangular_uniform_quad_mesh_2d;
use nalgebra::{Point2, Vector2};

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> TriangleMesh2d {
    fenris::mesh::procedural::create_unit_square_uniform_tri_mesh_2d(cells_per_dim)
}

/// Generates a uniform triangle mesh of the axis-aligned rectangle `[min, max]`.
///
/// The rectangle is divided into `cells_x` by `cells_y` quadrilaterals, each of which is split
/// into two triangles. Vertices are numbered row by row, starting from the corner
/// `(min.x, max.y)`.
pub fn create_rectangular_uniform_tri_mesh_2d(
    min: &Point2<f64>,
    max: &Point2<f64>,
    cells_x: usize,
    cells_y: usize,
) -> TriangleMesh2d {
    // Unit cells covering [0, cells_x] x [0, cells_y], mapped onto the rectangle afterwards
    let top_left = Vector2::new(0.0, cells_y as f64);
    let mut mesh = create_rectangular_uniform_quad_mesh_2d(1.0, cells_x, cells_y, 1, &top_left)
        .split_into_triangles();
    let lerp = |a: f64, b: f64, s: f64| (1.0 - s) * a + s * b;
    mesh.transform_vertices(|p| {
        let s = Vector2::new(p.x / cells_x as f64, p.y / cells_y as f64);
        *p = Point2::new(lerp(min.x, max.x, s.x), lerp(min.y, max.y, s.y));
    });
    mesh
}
