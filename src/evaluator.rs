//! Evaluation of parametrized expressions on (reduced) meshes.
//!
//! Before an expression can be evaluated on a reduced mesh level, its leaves are substituted:
//!
//! - solution leaves of truth problems become fields on an auxiliary space on the level mesh,
//!   refreshed from the truth solution;
//! - solution leaves of problems that have been trained become fields refreshed from the reduced
//!   solution, expanded with the basis functions restricted to the level mesh;
//! - geometric leaves are rebound to the level mesh.
//!
//! The substituted expression is cached per expression and mesh level, so that repeated
//! evaluations only refresh field values.
use crate::context::ReductionContext;
use crate::expression::{
    EvaluationPoint, Expr, ExpressionId, ExpressionKind, ParametrizedExpression, Placeholder,
    Replacement, SolutionRef, Terminal,
};
use crate::form::Form;
use crate::parameters::Parameter;
use crate::problem::{ProblemId, ReducedProblem, SolveStatus, TruthProblem};
use crate::quadrature::TriangleQuadrature;
use crate::rb::BasisFunctionsMatrix;
use crate::reduced_mesh::{AuxiliaryInterpolator, MeshId, ReducedMeshLevel};
use crate::space::{Function, FunctionSpace, Location};
use eyre::eyre;
use log::{debug, trace};
use nalgebra::DVector;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::rc::{Rc, Weak};

/// Leaves of a cached expression that must be refreshed before each evaluation.
struct TruthField {
    solution: SolutionRef,
    field: Rc<Placeholder>,
    interpolator: AuxiliaryInterpolator,
}

struct ReducedField {
    truth: ProblemId,
    problem: Weak<dyn ReducedProblem>,
    field: Rc<Placeholder>,
    basis: BasisFunctionsMatrix,
    /// Used while the truth problem itself is being solved.
    interpolator: AuxiliaryInterpolator,
}

/// An expression with all leaves substituted for a particular mesh level.
pub(crate) struct CachedExpression {
    components: Vec<Expr>,
    truth_fields: Vec<TruthField>,
    reduced_fields: Vec<ReducedField>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

#[derive(Default)]
pub(crate) struct ExpressionCache {
    entries: FxHashMap<(ExpressionId, MeshId, usize), Rc<CachedExpression>>,
    meshes: FxHashSet<MeshId>,
    hits: usize,
    misses: usize,
}

impl ExpressionCache {
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn uses_mesh(&self, mesh: MeshId) -> bool {
        self.meshes.contains(&mesh)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.meshes.clear();
    }
}

/// The value of an expression on a mesh level.
#[derive(Debug, Clone)]
pub enum EvaluatedExpression {
    /// Pointwise (or function) expressions, to be evaluated where needed.
    Unprojected(Vec<Expr>),
    /// Operator expressions, projected onto the space of the mesh level.
    Projected(Function),
}

impl EvaluatedExpression {
    /// Nodal values at the degrees of freedom `dofs` of `space`, a space with one scalar value
    /// per expression component.
    pub fn values_at(
        &self,
        space: &FunctionSpace,
        mu: &Parameter,
        t: f64,
        dofs: &[usize],
    ) -> DVector<f64> {
        match self {
            Self::Unprojected(components) => {
                assert_eq!(
                    components.len(),
                    space.values_per_vertex(),
                    "Number of expression components must match the layout of the space"
                );
                DVector::from_iterator(
                    dofs.len(),
                    dofs.iter().map(|&dof| {
                        let vertex = space.dof_vertex(dof);
                        let location = Location::Vertex(vertex);
                        components[space.dof_scalar_index(dof)].evaluate(&EvaluationPoint {
                            x: space.point_at(&location),
                            location,
                            mu: mu.as_slice(),
                            t,
                        })
                    }),
                )
            }
            Self::Projected(function) => {
                DVector::from_iterator(dofs.len(), dofs.iter().map(|&dof| function.values()[dof]))
            }
        }
    }

    /// Nodal values at all degrees of freedom of `space`.
    pub fn to_function(&self, space: &Rc<FunctionSpace>, mu: &Parameter, t: f64) -> Function {
        match self {
            Self::Projected(function) => function.clone(),
            Self::Unprojected(_) => {
                let dofs: Vec<usize> = (0..space.dim()).collect();
                Function::new(Rc::clone(space), self.values_at(space, mu, t, &dofs))
            }
        }
    }
}

/// Evaluates `expression` on the mesh of `level` at the given parameter and time.
///
/// Truth problems referenced by the expression are solved first (unless they already hold a
/// solution at `mu` and `t`), followed by reduced problems replacing trained truth problems.
/// A problem that is currently being solved contributes its in-progress solution.
///
/// # Panics
///
/// Panics if an operator expression has a leaf as one of its components. Such expressions
/// must be declared as functions instead.
pub fn expression_on_reduced_mesh(
    context: &ReductionContext,
    expression: &ParametrizedExpression,
    level: &ReducedMeshLevel,
    mu: &Parameter,
    t: f64,
) -> eyre::Result<EvaluatedExpression> {
    if expression.kind() == ExpressionKind::Operator {
        assert!(
            !expression.components().iter().any(Expr::is_terminal),
            "Invalid expression in expression_on_reduced_mesh: \
             operator expressions must be composite"
        );
    }

    let cached = cached_expression(context, expression.id(), expression.components(), level);
    refresh(&cached, mu, t)?;

    match expression.kind() {
        ExpressionKind::Pointwise | ExpressionKind::Function => {
            Ok(EvaluatedExpression::Unprojected(cached.components.clone()))
        }
        ExpressionKind::Operator => {
            let space = level.space();
            if cached.components.len() != space.values_per_vertex() {
                return Err(eyre!(
                    "Operator expression with {} components cannot be projected onto a space \
                     with {} values per vertex",
                    cached.components.len(),
                    space.values_per_vertex()
                ));
            }
            let values = space.project(&TriangleQuadrature::default(), |location, x, buffer| {
                let point = EvaluationPoint {
                    x: *x,
                    location: *location,
                    mu: mu.as_slice(),
                    t,
                };
                for (value, component) in buffer.iter_mut().zip(&cached.components) {
                    *value = component.evaluate(&point);
                }
            })?;
            Ok(EvaluatedExpression::Projected(Function::new(Rc::clone(space), values)))
        }
    }
}

/// The coefficient of `form`, substituted for the mesh of `level` and refreshed at `mu` and `t`.
pub fn form_on_reduced_mesh(
    context: &ReductionContext,
    form: &Form,
    level: &ReducedMeshLevel,
    mu: &Parameter,
    t: f64,
) -> eyre::Result<Expr> {
    let coefficient = form.coefficient();
    let cached = cached_expression(context, coefficient.id(), coefficient.components(), level);
    refresh(&cached, mu, t)?;
    Ok(cached.components[0].clone())
}

fn cached_expression(
    context: &ReductionContext,
    id: ExpressionId,
    components: &[Expr],
    level: &ReducedMeshLevel,
) -> Rc<CachedExpression> {
    let key = (id, level.id(), context.training_generation());
    {
        let mut cache = context.expression_cache().borrow_mut();
        if let Some(cached) = cache.entries.get(&key).cloned() {
            cache.hits += 1;
            return cached;
        }
        cache.misses += 1;
    }

    let cached = Rc::new(substitute(context, components, level));
    let mut cache = context.expression_cache().borrow_mut();
    cache.entries.insert(key, Rc::clone(&cached));
    cache.meshes.insert(level.id());
    cached
}

fn substitute(
    context: &ReductionContext,
    components: &[Expr],
    level: &ReducedMeshLevel,
) -> CachedExpression {
    let mut replacements = FxHashMap::default();
    let mut truth_fields = Vec::new();
    let mut reduced_fields = Vec::new();
    let mut seen = FxHashSet::default();

    for terminal in components.iter().flat_map(Expr::unique_terminals) {
        let key = terminal.key();
        if !seen.insert(key) {
            continue;
        }
        match terminal {
            Terminal::Geometric(quantity) => {
                replacements.insert(key, Replacement::Geometric(quantity.rebind(level.mesh())));
            }
            Terminal::Solution(solution) => {
                let truth = solution.problem();
                let truth_space = truth.space();
                let field = Placeholder::new(level.auxiliary_space(truth_space));
                replacements.insert(key, Replacement::Field(Rc::clone(&field)));
                if let Some(reduced) = context.reduced_problem(solution.id()) {
                    trace!("Solution of {} is replaced by its reduced solution", truth.name());
                    reduced_fields.push(ReducedField {
                        truth: solution.id(),
                        basis: level.auxiliary_basis_functions_matrix(
                            truth_space,
                            reduced.basis_functions(),
                        ),
                        problem: Rc::downgrade(&reduced),
                        interpolator: level.auxiliary_interpolator(truth_space),
                        field,
                    });
                } else {
                    truth_fields.push(TruthField {
                        interpolator: level.auxiliary_interpolator(truth_space),
                        solution,
                        field,
                    });
                }
            }
        }
    }

    debug!(
        "Substituted expression on mesh {:?}: {} truth fields, {} reduced fields",
        level.id(),
        truth_fields.len(),
        reduced_fields.len()
    );
    CachedExpression {
        components: components.iter().map(|c| c.replace(&replacements)).collect(),
        truth_fields,
        reduced_fields,
    }
}

/// The solution stored by a problem that is being solved, or zero before the first iterate.
fn in_progress_solution(problem: &dyn TruthProblem) -> DVector<f64> {
    trace!("Using in-progress solution of {}", problem.name());
    let values = problem.state().solution();
    if values.len() == problem.space().dim() {
        values
    } else {
        DVector::zeros(problem.space().dim())
    }
}

/// Refreshes the fields of a cached expression: truth problems first, then reduced problems.
///
/// A trained problem that is itself being solved contributes its in-progress truth solution
/// instead of its reduced solution.
fn refresh(cached: &CachedExpression, mu: &Parameter, t: f64) -> eyre::Result<()> {
    for TruthField {
        solution,
        field,
        interpolator,
    } in &cached.truth_fields
    {
        let problem = solution.problem();
        let state = problem.state();
        let values = if state.status() == SolveStatus::Solving {
            in_progress_solution(&*problem)
        } else {
            problem.set_mu(mu);
            problem.set_time(t);
            if state.is_solved_at(mu, t) {
                state.solution()
            } else {
                debug!("Solving {} at mu = {}, t = {}", problem.name(), mu, t);
                problem.solve()?
            }
        };
        field.assign(interpolator.apply(&values));
    }

    for ReducedField {
        truth,
        problem,
        field,
        basis,
        interpolator,
    } in &cached.reduced_fields
    {
        let reduced = problem
            .upgrade()
            .ok_or_else(|| eyre!("Reduced problem replacing {truth} was dropped"))?;
        let truth_problem = reduced.truth_problem();
        if truth_problem.state().status() == SolveStatus::Solving {
            field.assign(interpolator.apply(&in_progress_solution(&*truth_problem)));
            continue;
        }
        let state = reduced.state();
        let n = reduced.online_size();
        let coefficients = if state.status() == SolveStatus::Solving {
            let coefficients = state.solution();
            if coefficients.len() == n.total() {
                coefficients
            } else {
                DVector::zeros(n.total())
            }
        } else {
            reduced.set_mu(mu);
            reduced.set_time(t);
            if state.is_solved_at(mu, t) {
                state.solution()
            } else {
                debug!("Solving reduced {} at mu = {}, t = {}", reduced.name(), mu, t);
                reduced.solve()?
            }
        };
        let n = reduced.online_size();
        field.assign(basis.matrix(&n) * coefficients);
    }
    Ok(())
}
