use crate::unit_square_space;
use matrixcompare::assert_matrix_eq;
use rbeim::context::ReductionContext;
use rbeim::evaluator::expression_on_reduced_mesh;
use rbeim::expression::{Expr, ParametrizedExpression};
use rbeim::parameters::Parameter;
use rbeim::reduced_mesh::ReducedMesh;
use rbeim::space::{Component, FunctionSpace};
use std::rc::Rc;

#[test]
fn levels_grow_by_the_cells_around_selected_dofs() {
    let context = ReductionContext::new();
    let space = unit_square_space(3);
    let vertex_cells = space.vertex_cells().to_vec();
    let mut mesh = ReducedMesh::new(&space);
    mesh.append(&[5], &context);
    mesh.append(&[15], &context);
    assert_eq!(mesh.len(), 2);
    assert_eq!(mesh.selected_dofs(), &[5, 15]);

    let first = mesh.level(1);
    let mut expected = vertex_cells[5].clone();
    expected.sort_unstable();
    assert_eq!(first.cells(), expected.as_slice());
    assert_eq!(first.dofs(), &[5]);
    assert!(first.reduced_dof(5).is_some());
    assert_eq!(first.reduced_dof(15), None);
    assert!(!first.is_full());

    let second = mesh.level(2);
    expected.extend(&vertex_cells[15]);
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(second.cells(), expected.as_slice());
    assert_eq!(second.mesh().connectivity().len(), expected.len());
    for &dof in &[5, 15] {
        let reduced = second.reduced_dof(dof).unwrap();
        assert_eq!(second.full_vertex(reduced), dof);
    }
}

#[test]
fn levels_with_the_same_dofs_are_shared() {
    let context = ReductionContext::new();
    let space = unit_square_space(3);
    let mut a = ReducedMesh::new(&space);
    a.append(&[5], &context);
    a.append(&[15], &context);
    let mut b = ReducedMesh::new(&space);
    b.append(&[15], &context);
    b.append(&[5, 15], &context);
    assert!(Rc::ptr_eq(&a.level(2), &b.level(2)));
    assert!(!Rc::ptr_eq(&a.level(1), &b.level(1)));

    let other_context = ReductionContext::new();
    let mut c = ReducedMesh::new(&space);
    c.append(&[5], &other_context);
    assert!(!Rc::ptr_eq(&a.level(1), &c.level(1)));
}

#[test]
fn auxiliary_interpolator_restricts_other_layouts() {
    let context = ReductionContext::new();
    let space = unit_square_space(4);
    let vector_space = FunctionSpace::new(Rc::clone(space.mesh()), vec![Component::vector("u", 2)]);
    let mut mesh = ReducedMesh::new(&space);
    mesh.append(&[7, 12], &context);
    let level = mesh.level(1);

    let auxiliary = level.auxiliary_space(&vector_space);
    assert!(Rc::ptr_eq(&auxiliary, &level.auxiliary_space(&vector_space)));
    assert_eq!(auxiliary.values_per_vertex(), 2);
    let field = |x: &nalgebra::Point2<f64>, values: &mut [f64]| {
        values[0] = x.x;
        values[1] = 2.0 * x.y;
    };
    let restricted = level
        .auxiliary_interpolator(&vector_space)
        .apply(&vector_space.interpolate(field));
    assert_matrix_eq!(restricted, auxiliary.interpolate(field), comp = abs, tol = 1e-14);
}

#[test]
fn full_level_is_unique_per_space() {
    let context = ReductionContext::new();
    let space = unit_square_space(2);
    let level = context.full_level(&space);
    assert!(level.is_full());
    assert_eq!(level.cells().len(), 8);
    assert!(Rc::ptr_eq(&level, &context.full_level(&space)));
    assert!(Rc::ptr_eq(level.auxiliary_space(&space).mesh(), space.mesh()));
}

#[test]
fn reset_is_allowed_after_clearing_cached_expressions() {
    let context = ReductionContext::new();
    let space = unit_square_space(3);
    let mut mesh = ReducedMesh::new(&space);
    mesh.append(&[5], &context);
    let expression = ParametrizedExpression::scalar(Expr::x() + Expr::y());
    expression_on_reduced_mesh(&context, &expression, &mesh.level(1), &Parameter::default(), 0.0)
        .unwrap();
    assert!(context.is_mesh_in_use(mesh.level(1).id()));

    context.clear();
    mesh.reset(&context);
    assert!(mesh.is_empty());
    mesh.append(&[6], &context);
    assert_eq!(mesh.selected_dofs(), &[6]);
}

#[test]
#[should_panic(expected = "in use by cached expressions")]
fn reset_of_mesh_in_use_panics() {
    let context = ReductionContext::new();
    let space = unit_square_space(3);
    let mut mesh = ReducedMesh::new(&space);
    mesh.append(&[5], &context);
    let expression = ParametrizedExpression::scalar(Expr::x());
    expression_on_reduced_mesh(&context, &expression, &mesh.level(1), &Parameter::default(), 0.0)
        .unwrap();
    mesh.reset(&context);
}

#[test]
#[should_panic(expected = "level 0 was requested")]
fn level_zero_does_not_exist() {
    let space = unit_square_space(2);
    ReducedMesh::new(&space).level(0);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn out_of_bounds_dofs_are_rejected() {
    let context = ReductionContext::new();
    let space = unit_square_space(2);
    ReducedMesh::new(&space).append(&[9], &context);
}
