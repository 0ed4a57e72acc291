//! Triangle meshes, as provided by `fenris`, and the cell/vertex relations that reduced meshes
//! are built from.
use fenris::connectivity::Connectivity;

pub mod procedural;

pub type TriangleMesh2d = fenris::mesh::TriangleMesh2d<f64>;

/// For each vertex, the sorted indices of the cells it belongs to.
pub fn vertex_cells(mesh: &TriangleMesh2d) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); mesh.vertices().len()];
    for (cell_index, conn) in mesh.connectivity().iter().enumerate() {
        for &v in conn.vertex_indices() {
            adjacency[v].push(cell_index);
        }
    }
    adjacency
}

/// Same as [`Mesh::keep_cells`](fenris::mesh::Mesh::keep_cells), but also returns the original
/// index of each vertex in the new mesh.
///
/// `keep_cells` preserves the relative order of the vertices it keeps, so the map is sorted.
pub fn keep_cells_with_vertex_map(
    mesh: &TriangleMesh2d,
    cell_indices: &[usize],
) -> (TriangleMesh2d, Vec<usize>) {
    let mut kept_vertices: Vec<usize> = cell_indices
        .iter()
        .flat_map(|&cell| mesh.connectivity()[cell].vertex_indices().iter().copied())
        .collect();
    kept_vertices.sort_unstable();
    kept_vertices.dedup();
    (mesh.keep_cells(cell_indices), kept_vertices)
}
