use nalgebra::Point2;
use rbeim::context::ReductionContext;
use rbeim::eim::{ApproximationKind, EimApproximation, ParametrizedExpressionFactory};
use rbeim::expression::{Expr, ParametrizedExpression};
use rbeim::io::Folder;
use rbeim::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use rbeim::parameters::ParameterRange;
use rbeim::problem::ParametrizedProblem;
use rbeim::space::FunctionSpace;
use std::path::PathBuf;
use std::rc::Rc;

mod deim;
mod nonlinear;
mod persistence;

fn data_output_path() -> PathBuf {
    PathBuf::from("data/integration_tests/")
}

/// An empty output folder for a single test.
fn fresh_folder(test_name: &str) -> Folder {
    let path = data_output_path().join(test_name);
    let _ = std::fs::remove_dir_all(&path);
    Folder::new(path)
}

fn rectangle_space(min: [f64; 2], max: [f64; 2], cells_per_dim: usize) -> Rc<FunctionSpace> {
    let mesh = create_rectangular_uniform_tri_mesh_2d(
        &Point2::from(min),
        &Point2::from(max),
        cells_per_dim,
        cells_per_dim,
    );
    FunctionSpace::scalar(Rc::new(mesh))
}

fn unit_square_space(cells_per_dim: usize) -> Rc<FunctionSpace> {
    rectangle_space([0.0, 0.0], [1.0, 1.0], cells_per_dim)
}

/// $1 / \sqrt{(x - \mu_0)^2 + (y - \mu_1)^2 + 0.01}$, whose peak lies outside of the domain.
fn near_singular_expression() -> ParametrizedExpression {
    let dx = Expr::x() - Expr::parameter(0);
    let dy = Expr::y() - Expr::parameter(1);
    ParametrizedExpression::scalar(1.0 / (dx.powi(2) + dy.powi(2) + 0.01).sqrt())
}

/// Untrained EIM approximation of [`near_singular_expression`] on $[0.1, 0.9]^2$ with
/// $\mu \in [-1, -0.01]^2$.
fn near_singular_approximation(
    context: &Rc<ReductionContext>,
    cells_per_dim: usize,
) -> EimApproximation {
    let space = rectangle_space([0.1, 0.1], [0.9, 0.9], cells_per_dim);
    let factory =
        ParametrizedExpressionFactory::new("f", context, near_singular_expression(), &space);
    let approximation =
        EimApproximation::new(context, Box::new(factory), ApproximationKind::Stationary);
    approximation
        .set_mu_range(ParameterRange::new(vec![(-1.0, -0.01), (-1.0, -0.01)]))
        .unwrap();
    approximation
}
