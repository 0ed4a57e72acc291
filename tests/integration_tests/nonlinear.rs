use super::unit_square_space;
use rbeim::affine::{AffineDecomposition, Tensor};
use rbeim::context::ReductionContext;
use rbeim::deim_problem::DeimDecoratedProblem;
use rbeim::eim::EimSettings;
use rbeim::form::Form;
use rbeim::online_size::OnlineSize;
use rbeim::parameters::{Distribution, Parameter, ParameterRange};
use rbeim::problem::elliptic::{LHS_TERM, RHS_TERM};
use rbeim::problem::{
    EllipticProblem, ParametrizedProblem, PicardSettings, SolveOptions, TruthProblem,
};
use rbeim::rb::PodGalerkinReduction;
use std::rc::Rc;

/// $-\nabla \cdot ((1 + u^2) \nabla u) = \mu_0$ with $u = 0$ on the boundary of the unit square.
fn nonlinear_diffusion(context: &Rc<ReductionContext>) -> Rc<EllipticProblem> {
    let space = unit_square_space(6);
    let problem = EllipticProblem::builder("nonlinear", context, &space)
        .rhs_form(Form::source("load", &space, 1.0), |mu| mu[0])
        .homogeneous_dirichlet_on_boundary()
        .picard(PicardSettings::default())
        .build_cyclic(|builder, handle| {
            let u = handle.solution(0);
            builder.lhs_form(Form::stiffness("diffusion", &space, 1.0 + u.clone() * u), |_| 1.0)
        });
    problem
        .set_mu_range(ParameterRange::new(vec![(1.0, 5.0)]))
        .unwrap();
    problem
}

fn assembled(
    problem: &dyn AffineDecomposition,
    context: &ReductionContext,
    term: &str,
    mu: &Parameter,
) -> Tensor {
    let operators = problem.assemble_operator(term).unwrap();
    assert_eq!(operators.len(), 1);
    operators[0].assemble(context, mu, 0.0).unwrap()
}

#[test]
fn picard_iteration_solves_nonlinear_problem() {
    let context = ReductionContext::new();
    let problem = nonlinear_diffusion(&context);
    let mu = Parameter::from([4.0]);
    problem.set_mu(&mu);
    let u = problem.solve().unwrap();
    assert_eq!(problem.state().solve_count(), 1);
    assert!(problem.state().is_solved_at(&mu, 0.0));
    assert!(u.amax() > 0.0);

    // The stiffness matrix at the converged solution reuses the stored solution
    let Tensor::Matrix(stiffness) = assembled(&*problem, &context, LHS_TERM, &mu) else {
        panic!("Expected a matrix");
    };
    let Tensor::Vector(load) = assembled(&*problem, &context, RHS_TERM, &mu) else {
        panic!("Expected a vector");
    };
    assert_eq!(problem.state().solve_count(), 1);

    let residual = &stiffness * &u - &load * mu[0];
    let dirichlet = problem.dirichlet_dofs();
    let interior_residual = residual
        .iter()
        .enumerate()
        .filter(|(dof, _)| !dirichlet.contains(dof))
        .map(|(_, r)| r * r)
        .sum::<f64>()
        .sqrt();
    assert!(interior_residual < 1e-6 * (&load * mu[0]).norm());
}

#[test]
fn nonlinearity_is_visible_in_solution() {
    let context = ReductionContext::new();
    let problem = nonlinear_diffusion(&context);
    problem.set_mu(&Parameter::from([1.0]));
    let small = problem.solve().unwrap();
    problem.set_mu(&Parameter::from([4.0]));
    let large = problem.solve().unwrap();
    // A linear problem would scale exactly with the load
    let deviation = (&large - &small * 4.0).norm() / large.norm();
    assert!(deviation > 1e-3);
}

#[test]
fn reduced_nonlinear_problem_matches_truth() {
    let context = ReductionContext::new();
    let truth = nonlinear_diffusion(&context);
    let problem = DeimDecoratedProblem::new(&truth);
    problem
        .set_mu_range(ParameterRange::new(vec![(1.0, 5.0)]))
        .unwrap();
    assert_eq!(problem.deim_counts(LHS_TERM), Some((1, 0)));
    assert_eq!(problem.deim_counts(RHS_TERM), Some((0, 1)));
    problem
        .train_deim(
            &EimSettings {
                n_max: 8,
                tolerance: 1e-12,
                ..EimSettings::default()
            },
            10,
            Distribution::Equispaced,
        )
        .unwrap();

    let mut reduction = PodGalerkinReduction::new(&problem);
    reduction.set_n_max(5);
    reduction
        .initialize_training_set(10, Distribution::Equispaced)
        .unwrap();
    let reduced = reduction.offline().unwrap();
    assert!(context.is_trained(truth.id()));

    let mu = Parameter::from([2.7]);
    problem.set_mu(&mu);
    let reference = problem.inner().solve().unwrap();

    let n = reduced.max_online_size();
    reduced.set_mu(&mu);
    let coefficients = reduced.solve_with(&n, &SolveOptions::default()).unwrap();
    let reconstructed = reduced.reconstruct(&coefficients, &n);
    let error = (&reconstructed - &reference).norm() / reference.norm();
    assert!(error < 1e-3, "Reduced error {error:e} too large");

    let one = OnlineSize::uniform(&["u"], 1);
    let coarse = reduced.solve_with(&one, &SolveOptions::default()).unwrap();
    assert_eq!(coarse.len(), 1);
}
