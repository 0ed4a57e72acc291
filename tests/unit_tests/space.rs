use crate::unit_square_space;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, Point2};
use rbeim::quadrature::TriangleQuadrature;
use rbeim::space::{Component, FunctionSpace, Location};
use std::rc::Rc;

#[test]
fn vector_space_interleaves_dofs() {
    let scalar = unit_square_space(2);
    let space = FunctionSpace::new(
        Rc::clone(scalar.mesh()),
        vec![Component::vector("u", 2), Component::scalar("p")],
    );
    assert_eq!(space.values_per_vertex(), 3);
    assert_eq!(space.dim(), 27);
    assert_eq!(space.dof(4, 2), 14);
    assert_eq!(space.dof_vertex(14), 4);
    assert_eq!(space.dof_scalar_index(14), 2);
    assert_eq!(space.component_range("u"), Some(0..2));
    assert_eq!(space.component_range("p"), Some(2..3));
    assert_eq!(space.component_dofs("p"), (0..9).map(|v| 3 * v + 2).collect::<Vec<_>>());
    assert_eq!(space.component_names(), vec!["u".to_string(), "p".to_string()]);

    let collapsed = space.collapse("u");
    assert_eq!(collapsed.values_per_vertex(), 2);
    assert!(Rc::ptr_eq(collapsed.mesh(), space.mesh()));
}

#[test]
fn linear_functions_are_reproduced_at_arbitrary_points() {
    let space = unit_square_space(5);
    let u = space.interpolate(|x, values| values[0] = 2.0 * x.x - 3.0 * x.y + 0.5);
    for point in [Point2::new(0.13, 0.77), Point2::new(0.5, 0.5), Point2::new(0.99, 0.01)] {
        let value = space.evaluate_at_point(&u, &point).unwrap();
        assert_scalar_eq!(value[0], 2.0 * point.x - 3.0 * point.y + 0.5, comp = abs, tol = 1e-12);
    }
}

#[test]
fn point_location_returns_valid_barycentric_coordinates() {
    let space = unit_square_space(4);
    let point = Point2::new(0.3, 0.6);
    match space.locate(&point) {
        Some(Location::Cell { cell, barycentric }) => {
            assert!(barycentric.iter().all(|&l| l >= -1e-12));
            let mapped = space.cell(cell).map_barycentric(&barycentric);
            assert_scalar_eq!(mapped.x, point.x, comp = abs, tol = 1e-12);
            assert_scalar_eq!(mapped.y, point.y, comp = abs, tol = 1e-12);
        }
        other => panic!("Expected a cell location, got {other:?}"),
    }
}

#[test]
fn mass_matrix_integrates_constants() {
    let space = unit_square_space(6);
    let ones = DVector::repeat(space.dim(), 1.0);
    let mass = space.mass_matrix();
    let dense = nalgebra::DMatrix::from(mass);
    assert_scalar_eq!((ones.transpose() * &dense * &ones)[(0, 0)], 1.0, comp = abs, tol = 1e-12);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-15);
}

#[test]
fn projection_reproduces_linear_functions() {
    let space = unit_square_space(4);
    let projected = space
        .project(&TriangleQuadrature::strength_2(), |_, x, values| values[0] = x.x + 2.0 * x.y)
        .unwrap();
    let interpolated = space.interpolate(|x, values| values[0] = x.x + 2.0 * x.y);
    assert_matrix_eq!(projected, interpolated, comp = abs, tol = 1e-9);
}

#[test]
fn function_component_extracts_values() {
    let scalar = unit_square_space(1);
    let space = FunctionSpace::new(
        Rc::clone(scalar.mesh()),
        vec![Component::scalar("u"), Component::scalar("p")],
    );
    let values = DVector::from_fn(space.dim(), |i, _| i as f64);
    let function = rbeim::space::Function::new(Rc::clone(&space), values);
    let p = function.component("p");
    assert_eq!(p.values().as_slice(), &[1.0, 3.0, 5.0, 7.0]);
    assert_eq!(p.space().values_per_vertex(), 1);
}
