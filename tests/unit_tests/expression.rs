use crate::unit_square_space;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, Point2};
use rbeim::expression::{
    EvaluationPoint, Expr, ExpressionKind, ParametrizedExpression, Placeholder, Replacement,
    Terminal,
};
use rbeim::geometry::GeometricKind;
use rbeim::space::Location;
use rustc_hash::FxHashMap;

fn point(x: f64, y: f64, mu: &[f64], t: f64) -> EvaluationPoint<'_> {
    EvaluationPoint {
        x: Point2::new(x, y),
        location: Location::Vertex(0),
        mu,
        t,
    }
}

#[test]
fn arithmetic_expressions_evaluate_pointwise() {
    let dx = Expr::x() - Expr::parameter(0);
    let dy = Expr::y() - Expr::parameter(1);
    let f = 1.0 / (dx.powi(2) + dy.powi(2) + 0.01).sqrt();
    let mu = [-0.5, -0.25];
    let value = f.evaluate(&point(0.5, 0.75, &mu, 0.0));
    assert_scalar_eq!(value, 1.0 / (1.0f64 + 1.0 + 0.01).sqrt(), comp = abs, tol = 1e-14);

    let g = (Expr::time() * 2.0).sin().abs().max(0.1) + (-Expr::constant(3.0)).exp();
    let value = g.evaluate(&point(0.0, 0.0, &[], 0.25));
    assert_scalar_eq!(value, 0.5f64.sin() + (-3.0f64).exp(), comp = abs, tol = 1e-14);
}

#[test]
fn classification_tracks_parameters_time_and_solutions() {
    let affine = ParametrizedExpression::scalar(Expr::x() * 2.0);
    assert!(!affine.classification().parametrized);
    assert!(!affine.classification().time_dependent);

    let parametrized = ParametrizedExpression::scalar(Expr::x() * Expr::parameter(0));
    assert!(parametrized.classification().parametrized);

    let unsteady = ParametrizedExpression::scalar(Expr::time() + 1.0);
    assert!(unsteady.classification().time_dependent);
    assert!(!unsteady.classification().parametrized);
}

#[test]
fn parametrized_expressions_keep_identity_when_cloned() {
    let a = ParametrizedExpression::pointwise(vec![Expr::x(), Expr::y()]);
    let b = a.clone();
    let c = ParametrizedExpression::pointwise(vec![Expr::x(), Expr::y()]);
    assert_eq!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
    assert_eq!(a.kind(), ExpressionKind::Pointwise);
    assert_eq!(a.num_components(), 2);
}

#[test]
fn terminals_are_listed_once() {
    let space = unit_square_space(2);
    let h = Expr::geometric(GeometricKind::CellDiameter, space.mesh());
    let expression = &h * &h + Expr::x() * h.clone();
    let terminals = expression.unique_terminals();
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], Terminal::Geometric(_)));
    assert!(!expression.is_terminal());
    assert!(h.is_terminal());
}

#[test]
fn geometric_leaves_take_the_maximum_over_incident_cells_at_vertices() {
    let space = unit_square_space(1);
    let h = Expr::geometric(GeometricKind::CellVolume, space.mesh());
    let at_vertex = EvaluationPoint {
        x: Point2::origin(),
        location: Location::Vertex(0),
        mu: &[],
        t: 0.0,
    };
    assert_scalar_eq!(h.evaluate(&at_vertex), 0.5, comp = abs, tol = 1e-14);
    let diameter = Expr::geometric(GeometricKind::CellDiameter, space.mesh());
    assert_scalar_eq!(diameter.evaluate(&at_vertex), 2.0f64.sqrt(), comp = abs, tol = 1e-14);
}

#[test]
fn replacing_geometric_leaves_rebinds_them_to_another_mesh() {
    let coarse = unit_square_space(1);
    let fine = unit_square_space(2);
    let h = Expr::geometric(GeometricKind::CellVolume, coarse.mesh());
    let expression = h.clone() * 4.0;
    let Terminal::Geometric(quantity) = &expression.unique_terminals()[0] else {
        panic!("Expected a geometric leaf");
    };
    let mut replacements = FxHashMap::default();
    replacements.insert(
        expression.unique_terminals()[0].key(),
        Replacement::Geometric(quantity.rebind(fine.mesh())),
    );
    let replaced = expression.replace(&replacements);
    let at_cell = EvaluationPoint {
        x: Point2::origin(),
        location: Location::Cell {
            cell: 0,
            barycentric: [1.0 / 3.0; 3],
        },
        mu: &[],
        t: 0.0,
    };
    assert_scalar_eq!(expression.evaluate(&at_cell), 2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(replaced.evaluate(&at_cell), 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn fields_are_evaluated_from_their_current_values() {
    let space = unit_square_space(1);
    let field = Placeholder::new(space.clone());
    let expression = Expr::field(&field, 0) * 2.0;
    let at_cell = EvaluationPoint {
        x: Point2::origin(),
        location: Location::Cell {
            cell: 0,
            barycentric: [0.5, 0.5, 0.0],
        },
        mu: &[],
        t: 0.0,
    };
    assert_eq!(expression.evaluate(&at_cell), 0.0);
    field.assign(DVector::from_vec(vec![1.0, 3.0, 0.0, 0.0]));
    assert_scalar_eq!(expression.evaluate(&at_cell), 4.0, comp = abs, tol = 1e-14);
}

#[test]
#[should_panic(expected = "refers to parameter 1")]
fn missing_parameter_panics() {
    let expression = Expr::parameter(1);
    expression.evaluate(&point(0.0, 0.0, &[1.0], 0.0));
}
