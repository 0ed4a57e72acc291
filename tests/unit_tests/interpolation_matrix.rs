use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use rbeim::eim::InterpolationMatrix;
use rbeim::error::RbError;

fn lower_triangular_matrix() -> InterpolationMatrix {
    let mut matrix = InterpolationMatrix::new();
    matrix.enrich(&[], &[1.0]);
    matrix.enrich(&[0.5], &[0.0, 1.0]);
    matrix.enrich(&[-0.25, 2.0], &[0.0, 0.0, 1.0]);
    matrix
}

#[test]
fn enrichment_builds_unit_lower_triangular_matrix() {
    let matrix = lower_triangular_matrix();
    assert_eq!(matrix.len(), 3);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.5, 1.0, 0.0,
        -0.25, 2.0, 1.0,
    ]);
    assert_matrix_eq!(matrix.as_matrix().clone(), expected);
}

#[test]
fn forward_substitution_solves_leading_block() {
    let matrix = lower_triangular_matrix();
    let c = DVector::from_vec(vec![2.0, -1.0, 0.5]);
    let rhs = matrix.as_matrix() * &c;
    let solution = matrix.solve(&rhs).unwrap();
    assert_matrix_eq!(solution, c, comp = abs, tol = 1e-14);

    // Only the leading 2 x 2 block is used for two right-hand side values
    let partial = matrix.solve(&DVector::from_vec(vec![2.0, 0.0])).unwrap();
    assert_matrix_eq!(partial, DVector::from_vec(vec![2.0, -1.0]), comp = abs, tol = 1e-14);

    assert_eq!(matrix.solve(&DVector::zeros(0)).unwrap().len(), 0);
}

#[test]
fn vanishing_pivot_is_reported() {
    let mut matrix = InterpolationMatrix::new();
    matrix.enrich(&[], &[1.0]);
    matrix.enrich(&[1.0], &[0.0, 0.0]);
    let result = matrix.solve(&DVector::from_vec(vec![1.0, 1.0]));
    assert!(matches!(
        result,
        Err(RbError::SingularInterpolationMatrix { size: 2, index: 1 })
    ));
}

#[test]
#[should_panic(expected = "Cannot interpolate with 4 functions")]
fn too_many_values_panics() {
    lower_triangular_matrix().solve(&DVector::zeros(4)).ok();
}
