use super::unit_square_space;
use nalgebra::DVector;
use rbeim::affine::AffineDecomposition;
use rbeim::context::ReductionContext;
use rbeim::deim_problem::DeimDecoratedProblem;
use rbeim::eim::EimSettings;
use rbeim::expression::{Classification, Expr};
use rbeim::form::Form;
use rbeim::parameters::{Distribution, Parameter, ParameterRange, ParameterSpaceSubset};
use rbeim::problem::elliptic::{LHS_TERM, RHS_TERM};
use rbeim::problem::{DeimSize, EllipticProblem, ParametrizedProblem, SolveOptions, TruthProblem};
use rbeim::rb::PodGalerkinReduction;
use std::collections::BTreeMap;
use std::rc::Rc;

/// $-\nabla \cdot (e^{\mu_0 x} \nabla u) + u = \cos(\mu_1 y)$ with $u = 0$ on the boundary of the
/// unit square.
fn non_affine_problem(context: &Rc<ReductionContext>) -> Rc<DeimDecoratedProblem<EllipticProblem>> {
    let space = unit_square_space(8);
    let diffusion = (Expr::parameter(0) * Expr::x()).exp();
    let load = (Expr::parameter(1) * Expr::y()).cos();
    let problem = EllipticProblem::builder("non_affine", context, &space)
        .lhs_form(Form::stiffness("diffusion", &space, diffusion), |_| 1.0)
        .lhs_form(Form::mass("reaction", &space, 1.0), |_| 1.0)
        .rhs_form(Form::source("load", &space, load), |_| 1.0)
        .homogeneous_dirichlet_on_boundary()
        .build();
    let decorated = DeimDecoratedProblem::new(&problem);
    decorated
        .set_mu_range(ParameterRange::new(vec![(0.5, 2.0), (0.5, 2.0)]))
        .unwrap();
    decorated
}

fn trained_problem(context: &Rc<ReductionContext>) -> Rc<DeimDecoratedProblem<EllipticProblem>> {
    let problem = non_affine_problem(context);
    let settings = EimSettings {
        n_max: 10,
        tolerance: 1e-10,
        ..EimSettings::default()
    };
    problem
        .train_deim(&settings, 50, Distribution::Uniform { seed: 7 })
        .unwrap();
    problem
}

/// Smallest number of basis functions over all approximations.
fn common_deim_size(problem: &DeimDecoratedProblem<EllipticProblem>) -> usize {
    [(LHS_TERM, 0), (RHS_TERM, 0)]
        .iter()
        .map(|&(term, index)| problem.approximation(term, index).unwrap().len())
        .min()
        .unwrap()
}

fn relative_error(approximation: &DVector<f64>, reference: &DVector<f64>) -> f64 {
    (approximation - reference).norm() / reference.norm()
}

#[test]
fn parametrized_forms_are_classified_and_approximated() {
    let context = ReductionContext::new();
    let problem = non_affine_problem(&context);
    assert_eq!(problem.deim_counts(LHS_TERM), Some((1, 1)));
    assert_eq!(problem.deim_counts(RHS_TERM), Some((1, 0)));
    assert_eq!(problem.deim_counts("g"), None);
    assert_eq!(
        problem.classification(LHS_TERM, 0),
        Some(Classification {
            parametrized: true,
            time_dependent: false
        })
    );
    assert_eq!(problem.classification(LHS_TERM, 1), Some(Classification::default()));
    assert!(problem.approximation(LHS_TERM, 1).is_none());
    assert_eq!(
        problem.approximation_names(),
        vec!["non_affine_a_0".to_string(), "non_affine_f_0".to_string()]
    );
}

#[test]
fn deim_solution_approximates_truth_solution() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    let n = common_deim_size(&problem);
    assert!(n >= 3, "Expected at least three DEIM basis functions, got {n}");

    // The decorated affine expansion has one operator per DEIM basis function
    assert_eq!(
        problem.assemble_operator(LHS_TERM).unwrap().len(),
        problem.approximation(LHS_TERM, 0).unwrap().len() + 1
    );

    let mu = Parameter::from([1.3, 1.7]);
    problem.set_mu(&mu);
    let truth = problem.inner().solve().unwrap();
    let full = problem
        .solve_with_options(&SolveOptions::with_deim(DeimSize::Uniform(n)))
        .unwrap();
    let coarse = problem
        .solve_with_options(&SolveOptions::with_deim(DeimSize::Uniform(1)))
        .unwrap();

    let full_error = relative_error(&full, &truth);
    let coarse_error = relative_error(&coarse, &truth);
    assert!(full_error < 1e-4, "DEIM error {full_error:e} too large");
    assert!(coarse_error > full_error);
}

#[test]
fn solve_options_are_applied_only_when_they_change() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    problem.set_mu(&Parameter::from([1.0, 1.0]));
    let options = SolveOptions::with_deim(DeimSize::Uniform(2));
    problem.solve_with_options(&options).unwrap();
    problem.solve_with_options(&options).unwrap();
    assert_eq!(problem.deim_option_updates(), 1);
    problem.solve_with_options(&SolveOptions::default()).unwrap();
    assert_eq!(problem.deim_option_updates(), 2);

    let thetas = problem.compute_theta(RHS_TERM).unwrap();
    assert_eq!(thetas.len(), problem.approximation(RHS_TERM, 0).unwrap().len());
}

/// Maximum relative deviation of the DEIM load vector with `n` basis functions from the exact
/// load vector at the current parameter.
fn load_deim_error(
    problem: &DeimDecoratedProblem<EllipticProblem>,
    context: &ReductionContext,
    n: usize,
) -> f64 {
    let mu = problem.mu();
    problem
        .update_solve_options(&SolveOptions::with_deim(DeimSize::Uniform(n)))
        .unwrap();
    let thetas = problem.compute_theta(RHS_TERM).unwrap();
    let operators = problem.assemble_operator(RHS_TERM).unwrap();
    let mut approximated = DVector::zeros(problem.space().dim());
    for (theta, operator) in thetas.iter().zip(&operators) {
        let tensor = operator.assemble(context, &mu, 0.0).unwrap();
        approximated.axpy(*theta, tensor.as_vector().unwrap(), 1.0);
    }
    let exact = problem.inner().assemble_operator(RHS_TERM).unwrap()[0]
        .assemble(context, &mu, 0.0)
        .unwrap();
    let exact = exact.as_vector().unwrap();
    (approximated - exact).amax() / exact.amax()
}

#[test]
fn larger_deim_sizes_keep_covered_training_snapshots_exact() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    let selected = problem
        .approximation(RHS_TERM, 0)
        .unwrap()
        .selected_snapshots()
        .to_vec();
    let n_max = selected.len();
    assert!(n_max >= 3);
    for (j, (mu, _)) in selected.iter().enumerate() {
        problem.set_mu(mu);
        let errors: Vec<f64> = (1..=n_max)
            .map(|n| load_deim_error(&problem, &context, n))
            .collect();
        for n in j + 1..=n_max {
            assert!(
                errors[n - 1] < 1e-10,
                "Load at training parameter {j} is not reproduced with N_DEIM = {n}: {:e}",
                errors[n - 1]
            );
        }
    }
}

#[test]
fn per_term_sizes_must_cover_every_approximation() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    problem.set_mu(&Parameter::from([1.0, 1.0]));
    let partial = DeimSize::PerTerm(BTreeMap::from([(
        LHS_TERM.to_string(),
        BTreeMap::from([(0, 2)]),
    )]));
    let error = problem
        .update_solve_options(&SolveOptions::with_deim(partial.clone()))
        .unwrap_err();
    assert!(error.to_string().contains(&format!("term {RHS_TERM}")), "{error}");
    assert_eq!(problem.deim_option_updates(), 0);
    assert!(problem
        .solve_with_options(&SolveOptions::with_deim(partial))
        .is_err());

    let complete = DeimSize::PerTerm(BTreeMap::from([
        (LHS_TERM.to_string(), BTreeMap::from([(0, 2)])),
        (RHS_TERM.to_string(), BTreeMap::from([(0, 3)])),
    ]));
    problem
        .solve_with_options(&SolveOptions::with_deim(complete))
        .unwrap();
    assert_eq!(problem.deim_option_updates(), 1);
    let thetas = problem.compute_theta(RHS_TERM).unwrap();
    assert!(thetas[3..].iter().all(|&theta| theta == 0.0));
}

#[test]
#[should_panic(expected = "N_DEIM = 1000 exceeds")]
fn oversized_deim_size_panics() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    let _ = problem.solve_with_options(&SolveOptions::with_deim(DeimSize::Uniform(1000)));
}

#[test]
fn pod_galerkin_of_deim_problem_converges() {
    let context = ReductionContext::new();
    let problem = trained_problem(&context);
    let mut reduction = PodGalerkinReduction::new(&problem);
    reduction.set_n_max(8);
    reduction
        .initialize_training_set(20, Distribution::Uniform { seed: 11 })
        .unwrap();
    reduction
        .initialize_testing_set(5, Distribution::Uniform { seed: 12 })
        .unwrap();
    let reduced = reduction.offline().unwrap();
    assert!(reduced.max_online_size() >= 4);

    let table = reduction.error_analysis(&reduced, Some(4)).unwrap();
    assert!(table.mean("relative_error_u", 4) < table.mean("relative_error_u", 1));
    assert!(table.max("relative_error_u", 4) < 1e-2);
}

#[test]
fn training_set_is_persisted_with_each_approximation() {
    let folder = super::fresh_folder("deim/training_set_is_persisted_with_each_approximation");
    let context = ReductionContext::new();
    let problem = {
        let space = unit_square_space(4);
        let inner = EllipticProblem::builder("persisted", &context, &space)
            .lhs_form(
                Form::stiffness("diffusion", &space, 1.0 + Expr::parameter(0) * Expr::x()),
                |_| 1.0,
            )
            .rhs_form(Form::source("load", &space, 1.0), |_| 1.0)
            .homogeneous_dirichlet_on_boundary()
            .build();
        DeimDecoratedProblem::new(&inner)
    };
    problem.set_folder(folder.clone());
    problem
        .set_mu_range(ParameterRange::new(vec![(0.0, 1.0)]))
        .unwrap();
    problem
        .train_deim(
            &EimSettings {
                n_max: 2,
                ..EimSettings::default()
            },
            5,
            Distribution::Equispaced,
        )
        .unwrap();
    let training_set =
        ParameterSpaceSubset::load(&folder.join("persisted_a_0"), "training_set").unwrap();
    assert_eq!(training_set.len(), 5);
    assert!(problem.approximation(LHS_TERM, 0).unwrap().is_persisted());
    assert!(problem.approximation(RHS_TERM, 0).is_none());
}
