use crate::unit_square_space;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use rbeim::affine::Tensor;
use rbeim::assembly::{
    apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs, assemble,
    assemble_matrix, assemble_vector, csr_entry_index, csr_entry_row_col, FormKind,
};
use rbeim::quadrature::TriangleQuadrature;

#[test]
fn stiffness_matrix_annihilates_constants() {
    let space = unit_square_space(4);
    let quadrature = TriangleQuadrature::default();
    let stiffness = assemble_matrix(&space, FormKind::Stiffness, &quadrature, |_, _| 1.0);
    let dense = DMatrix::from(&stiffness);
    let ones = DVector::repeat(space.dim(), 1.0);
    assert_matrix_eq!(&dense * &ones, DVector::zeros(space.dim()), comp = abs, tol = 1e-12);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-14);
}

#[test]
fn stiffness_energy_of_linear_function() {
    let space = unit_square_space(3);
    let stiffness = assemble_matrix(
        &space,
        FormKind::Stiffness,
        &TriangleQuadrature::default(),
        |_, _| 2.0,
    );
    let u = space.interpolate(|x, values| values[0] = x.x + x.y);
    let dense = DMatrix::from(&stiffness);
    // 2 * |grad u|^2 * |Omega| = 2 * 2 * 1
    assert_scalar_eq!(u.dot(&(&dense * &u)), 4.0, comp = abs, tol = 1e-12);
}

#[test]
fn mass_matrix_agrees_with_space_mass_matrix() {
    let space = unit_square_space(3);
    let mass =
        assemble_matrix(&space, FormKind::Mass, &TriangleQuadrature::strength_2(), |_, _| 1.0);
    let expected = DMatrix::from(space.mass_matrix());
    assert_matrix_eq!(DMatrix::from(&mass), expected, comp = abs, tol = 1e-14);
}

#[test]
fn source_vector_integrates_coefficient() {
    let space = unit_square_space(5);
    let f = assemble_vector(&space, &TriangleQuadrature::default(), |x, _| x.x);
    // Sum of the load vector is the integral of x over the unit square
    assert_scalar_eq!(f.sum(), 0.5, comp = abs, tol = 1e-12);
}

#[test]
fn bilinear_forms_share_sparsity_pattern() {
    let space = unit_square_space(3);
    let quadrature = TriangleQuadrature::default();
    let Tensor::Matrix(a) = assemble(&space, FormKind::Stiffness, &quadrature, |_, _| 1.0) else {
        panic!("Stiffness form must assemble to a matrix");
    };
    let Tensor::Matrix(b) = assemble(&space, FormKind::Mass, &quadrature, |x, _| x.y) else {
        panic!("Mass form must assemble to a matrix");
    };
    assert_eq!(a.pattern(), b.pattern());
}

#[test]
fn csr_entry_lookup_is_consistent() {
    let space = unit_square_space(2);
    let matrix =
        assemble_matrix(&space, FormKind::Mass, &TriangleQuadrature::default(), |_, _| 1.0);
    for index in 0..matrix.nnz() {
        let (row, col) = csr_entry_row_col(&matrix, index);
        assert_eq!(csr_entry_index(&matrix, row, col), Some(index));
    }
    // Vertices 0 and 8 are opposite corners and share no cell
    assert_eq!(csr_entry_index(&matrix, 0, 8), None);
}

#[test]
fn dirichlet_conditions_decouple_constrained_dofs() {
    let space = unit_square_space(3);
    let mut matrix = assemble_matrix(
        &space,
        FormKind::Stiffness,
        &TriangleQuadrature::default(),
        |_, _| 1.0,
    );
    let mut rhs = DVector::repeat(space.dim(), 1.0);
    let boundary = space.mesh().find_boundary_vertices();
    apply_homogeneous_dirichlet_bc_csr(&mut matrix, &boundary);
    apply_homogeneous_dirichlet_bc_rhs(&mut rhs, &boundary);

    let dense = DMatrix::from(&matrix);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-14);
    for &dof in &boundary {
        assert_eq!(rhs[dof], 0.0);
        for other in 0..space.dim() {
            if other != dof {
                assert_eq!(dense[(dof, other)], 0.0);
            }
        }
        assert!(dense[(dof, dof)] > 0.0);
    }
}
