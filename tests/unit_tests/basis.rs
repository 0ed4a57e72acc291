use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use rbeim::online_size::OnlineSize;
use rbeim::rb::BasisFunctionsMatrix;

fn two_component_basis() -> BasisFunctionsMatrix {
    let mut basis = BasisFunctionsMatrix::new(3, &["u", "p"]);
    basis.enrich("u", DVector::from_vec(vec![1.0, 0.0, 0.0]));
    basis.enrich("p", DVector::from_vec(vec![0.0, 0.0, 1.0]));
    basis.enrich("u", DVector::from_vec(vec![0.0, 1.0, 0.0]));
    basis
}

#[test]
fn columns_are_ordered_by_component() {
    let basis = two_component_basis();
    assert_eq!(basis.len(), 3);
    assert_eq!(
        basis.online_size(),
        OnlineSize::from_components(&["u", "p"], &[("u", 2), ("p", 1)])
    );
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,
    ]);
    assert_matrix_eq!(basis.full_matrix(), expected);
}

#[test]
fn slicing_by_online_size() {
    let basis = two_component_basis();
    let n = OnlineSize::from_components(&["u", "p"], &[("u", 1), ("p", 1)]);
    assert_eq!(basis.column_indices(&n), vec![0, 2]);
    assert_eq!(basis.columns(&n).len(), 2);
    let expected = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    assert_matrix_eq!(basis.matrix(&n), expected);
}

#[test]
fn restricted_rows_keep_component_structure() {
    let basis = two_component_basis();
    let restricted = basis.restrict_rows(&[2, 1]);
    assert_eq!(restricted.dim(), 2);
    assert_eq!(restricted.component("u")[1], DVector::from_vec(vec![0.0, 1.0]));
    assert_eq!(restricted.component("p")[0], DVector::from_vec(vec![1.0, 0.0]));
    let mut cleared = restricted;
    cleared.clear();
    assert!(cleared.is_empty());
    assert_eq!(cleared.component_names(), vec!["u", "p"]);
}

#[test]
#[should_panic(expected = "only 1 are available")]
fn requesting_too_many_functions_panics() {
    let basis = two_component_basis();
    basis.matrix(&OnlineSize::uniform(&["u", "p"], 2));
}
