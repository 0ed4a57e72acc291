use super::{fresh_folder, near_singular_approximation, unit_square_space};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use rbeim::context::ReductionContext;
use rbeim::eim::{EimReductionMethod, EimSettings};
use rbeim::error::RbError;
use rbeim::form::Form;
use rbeim::parameters::{Distribution, Parameter, ParameterRange, ParameterSpaceSubset};
use rbeim::problem::{EllipticProblem, ParametrizedProblem, ReducedProblem};
use rbeim::rb::PodGalerkinReduction;

#[test]
fn trained_approximation_is_reloaded_from_folder() {
    let folder = fresh_folder("persistence/trained_approximation_is_reloaded_from_folder");
    let context = ReductionContext::new();
    let mut approximation = near_singular_approximation(&context, 10).with_folder(&folder);
    assert!(!approximation.is_persisted());
    let mut method = EimReductionMethod::new(EimSettings {
        n_max: 8,
        ..EimSettings::default()
    });
    method
        .initialize_training_set(&approximation, 16, Distribution::Equispaced)
        .unwrap();
    method.offline(&mut approximation).unwrap();
    assert!(approximation.is_persisted());

    let approximation_folder = folder.join("f");
    let training_set = ParameterSpaceSubset::load(&approximation_folder, "training_set").unwrap();
    assert_eq!(&training_set, method.training_set());

    let mu = Parameter::from([-0.4, -0.7]);
    approximation.set_mu(&mu);
    let theta = approximation.compute_interpolated_theta(None).unwrap();

    // A restart in a fresh context loads instead of training, even without a training set
    let fresh_context = ReductionContext::new();
    let mut reloaded = near_singular_approximation(&fresh_context, 10).with_folder(&folder);
    assert!(reloaded.is_persisted());
    EimReductionMethod::default().offline(&mut reloaded).unwrap();
    assert_eq!(reloaded.locations(), approximation.locations());
    assert_eq!(reloaded.interpolation_matrix(), approximation.interpolation_matrix());
    assert_eq!(reloaded.reduced_mesh().len(), approximation.len());

    reloaded.set_mu(&mu);
    let reloaded_theta = reloaded.compute_interpolated_theta(None).unwrap();
    assert_matrix_eq!(
        DVector::from_vec(reloaded_theta),
        DVector::from_vec(theta),
        comp = abs,
        tol = 1e-12
    );
}

#[test]
fn loading_without_artifacts_fails_with_missing_artifact() {
    let folder = fresh_folder("persistence/loading_without_artifacts_fails_with_missing_artifact");
    let context = ReductionContext::new();
    let mut approximation = near_singular_approximation(&context, 4).with_folder(&folder);
    let error = approximation.load().unwrap_err();
    match error.downcast_ref::<RbError>() {
        Some(RbError::MissingArtifact { path }) => assert!(path.ends_with("f/approximation.json")),
        other => panic!("Expected a missing artifact error, got {other:?}"),
    }
    assert!(approximation.is_empty());
}

#[test]
fn pod_galerkin_basis_is_reloaded_from_folder() {
    let folder = fresh_folder("persistence/pod_galerkin_basis_is_reloaded_from_folder");
    let context = ReductionContext::new();
    let space = unit_square_space(4);
    let problem = EllipticProblem::builder("poisson", &context, &space)
        .lhs_form(Form::stiffness("laplace", &space, 1.0), |mu| mu[0])
        .rhs_form(Form::source("load", &space, 1.0), |_| 1.0)
        .homogeneous_dirichlet_on_boundary()
        .build();
    problem
        .set_mu_range(ParameterRange::new(vec![(1.0, 2.0)]))
        .unwrap();

    let mut reduction = PodGalerkinReduction::new(&problem).with_folder(folder.clone());
    reduction
        .initialize_training_set(3, Distribution::Equispaced)
        .unwrap();
    let trained = reduction.offline().unwrap();
    assert_eq!(problem.state().solve_count(), 3);

    let mut restarted = PodGalerkinReduction::new(&problem).with_folder(folder);
    let reloaded = restarted.offline().unwrap();
    assert_eq!(problem.state().solve_count(), 3);
    assert_eq!(reloaded.basis_functions(), trained.basis_functions());
}
