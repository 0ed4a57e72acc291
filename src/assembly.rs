//! Assembly of linear Lagrange finite element operators.
//!
//! All bilinear forms are assembled into the same sparsity pattern: every element contributes all
//! of its local entries, also when the local values vanish. Matrices assembled for the same space
//! are therefore directly comparable entry by entry.
use crate::affine::Tensor;
use crate::quadrature::TriangleQuadrature;
use crate::space::{FunctionSpace, Location};
use fenris::assembly::global;
use nalgebra::{DVector, Point2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

/// The integrand of a form, up to its scalar coefficient $c$.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormKind {
    /// $\int_\Omega c \nabla u \cdot \nabla v \, dx$
    Stiffness,
    /// $\int_\Omega c u v \, dx$
    Mass,
    /// $\int_\Omega c v \, dx$
    Source,
}

impl FormKind {
    pub fn is_bilinear(&self) -> bool {
        matches!(self, Self::Stiffness | Self::Mass)
    }
}

/// Assembles a form with the given coefficient into a matrix or a vector.
///
/// Vector-valued spaces are treated component-wise, i.e. the form acts identically and
/// independently on each scalar value per vertex.
pub fn assemble<F>(
    space: &FunctionSpace,
    kind: FormKind,
    quadrature: &TriangleQuadrature,
    coefficient: F,
) -> Tensor
where
    F: FnMut(&Point2<f64>, &Location) -> f64,
{
    if kind.is_bilinear() {
        Tensor::Matrix(assemble_matrix(space, kind, quadrature, coefficient))
    } else {
        Tensor::Vector(assemble_vector(space, quadrature, coefficient))
    }
}

pub fn assemble_matrix<F>(
    space: &FunctionSpace,
    kind: FormKind,
    quadrature: &TriangleQuadrature,
    mut coefficient: F,
) -> CsrMatrix<f64>
where
    F: FnMut(&Point2<f64>, &Location) -> f64,
{
    assert!(kind.is_bilinear(), "Cannot assemble a matrix for a linear form");
    let n = space.dim();
    let num_scalars = space.values_per_vertex();
    let mut coo = CooMatrix::new(n, n);
    for (cell, conn) in space.mesh().connectivity().iter().enumerate() {
        let triangle = space.cell(cell);
        let area = triangle.area();
        let gradients = triangle.barycentric_gradients();

        let mut element_matrix = [[0.0; 3]; 3];
        for (weight, barycentric) in quadrature.iter() {
            let x = triangle.map_barycentric(barycentric);
            let location = Location::Cell {
                cell,
                barycentric: *barycentric,
            };
            let c = area * weight * coefficient(&x, &location);
            for a in 0..3 {
                for b in 0..3 {
                    element_matrix[a][b] += match kind {
                        FormKind::Stiffness => c * gradients[a].dot(&gradients[b]),
                        FormKind::Mass => c * barycentric[a] * barycentric[b],
                        FormKind::Source => unreachable!(),
                    };
                }
            }
        }

        for a in 0..3 {
            for b in 0..3 {
                for s in 0..num_scalars {
                    coo.push(space.dof(conn[a], s), space.dof(conn[b], s), element_matrix[a][b]);
                }
            }
        }
    }
    CsrMatrix::from(&coo)
}

pub fn assemble_vector<F>(
    space: &FunctionSpace,
    quadrature: &TriangleQuadrature,
    mut coefficient: F,
) -> DVector<f64>
where
    F: FnMut(&Point2<f64>, &Location) -> f64,
{
    let mut vector = DVector::zeros(space.dim());
    for (cell, conn) in space.mesh().connectivity().iter().enumerate() {
        let triangle = space.cell(cell);
        let area = triangle.area();
        for (weight, barycentric) in quadrature.iter() {
            let x = triangle.map_barycentric(barycentric);
            let location = Location::Cell {
                cell,
                barycentric: *barycentric,
            };
            let c = area * weight * coefficient(&x, &location);
            for a in 0..3 {
                for s in 0..space.values_per_vertex() {
                    vector[space.dof(conn[a], s)] += c * barycentric[a];
                }
            }
        }
    }
    vector
}

/// Applies homogeneous Dirichlet conditions to the given degrees of freedom of a matrix with
/// symmetric sparsity pattern.
///
/// Constraints act on individual degrees of freedom, so that components of a vector-valued space
/// can be constrained independently.
pub fn apply_homogeneous_dirichlet_bc_csr(matrix: &mut CsrMatrix<f64>, dofs: &[usize]) {
    global::apply_homogeneous_dirichlet_bc_csr(matrix, dofs, 1);
}

pub fn apply_homogeneous_dirichlet_bc_rhs(rhs: &mut DVector<f64>, dofs: &[usize]) {
    global::apply_homogeneous_dirichlet_bc_rhs(rhs, dofs, 1);
}

/// Finds the position of entry `(row, col)` in the values array of a CSR matrix.
pub fn csr_entry_index(matrix: &CsrMatrix<f64>, row: usize, col: usize) -> Option<usize> {
    let offsets = matrix.row_offsets();
    let begin = offsets[row];
    let end = offsets[row + 1];
    matrix.col_indices()[begin..end]
        .binary_search(&col)
        .ok()
        .map(|local| begin + local)
}

/// The `(row, col)` pair of the entry at position `index` of the values array of a CSR matrix.
pub fn csr_entry_row_col(matrix: &CsrMatrix<f64>, index: usize) -> (usize, usize) {
    let offsets = matrix.row_offsets();
    assert!(index < matrix.nnz(), "Entry index out of bounds");
    let row = offsets.partition_point(|&offset| offset <= index) - 1;
    (row, matrix.col_indices()[index])
}
