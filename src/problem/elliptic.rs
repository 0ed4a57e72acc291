//! Linear (or Picard-linearized) elliptic problems with affine left-hand and right-hand sides.
use crate::affine::{AffineDecomposition, AffineExpansionStorage, Operator, Tensor};
use crate::assembly::{apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs};
use crate::context::ReductionContext;
use crate::expression::Expr;
use crate::form::Form;
use crate::linear_solver::{solve_spd, CgSettings};
use crate::parameters::Parameter;
use crate::problem::{
    DifferentialProblem, ParametrizedProblem, PicardSettings, ProblemId, ProblemState,
    TruthProblem,
};
use crate::space::FunctionSpace;
use eyre::eyre;
use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::rc::{Rc, Weak};

/// Name of the term holding the bilinear forms.
pub const LHS_TERM: &str = "a";
/// Name of the term holding the linear forms.
pub const RHS_TERM: &str = "f";

pub type Theta = Rc<dyn Fn(&Parameter) -> f64>;

/// Handle to the solution of a problem under construction.
#[derive(Clone)]
pub struct SolutionHandle {
    problem: Weak<dyn TruthProblem>,
    id: ProblemId,
}

impl SolutionHandle {
    /// Scalar value `component` of the solution.
    pub fn solution(&self, component: usize) -> Expr {
        Expr::solution_weak(self.problem.clone(), self.id, component)
    }
}

/// Finds $u$ with $\sum_q \theta^a_q(\mu) a_q(u, v) = \sum_q \theta^f_q(\mu) f_q(v)$ for all $v$.
pub struct EllipticProblem {
    state: ProblemState,
    context: Rc<ReductionContext>,
    space: Rc<FunctionSpace>,
    lhs: Vec<(Operator, Theta)>,
    rhs: Vec<(Operator, Theta)>,
    dirichlet_dofs: Vec<usize>,
    cg_settings: CgSettings,
    picard: Option<PicardSettings>,
    mass_inner_product: bool,
}

impl fmt::Debug for EllipticProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EllipticProblem")
            .field("name", &self.state.name())
            .field("lhs", &self.lhs.iter().map(|(op, _)| op).collect::<Vec<_>>())
            .field("rhs", &self.rhs.iter().map(|(op, _)| op).collect::<Vec<_>>())
            .field("num_dirichlet_dofs", &self.dirichlet_dofs.len())
            .finish()
    }
}

pub struct EllipticProblemBuilder {
    state: ProblemState,
    context: Rc<ReductionContext>,
    space: Rc<FunctionSpace>,
    lhs: Vec<(Operator, Theta)>,
    rhs: Vec<(Operator, Theta)>,
    dirichlet_on_boundary: bool,
    cg_settings: CgSettings,
    picard: Option<PicardSettings>,
    mass_inner_product: bool,
}

impl EllipticProblemBuilder {
    pub fn new(
        name: impl Into<String>,
        context: &Rc<ReductionContext>,
        space: &Rc<FunctionSpace>,
    ) -> Self {
        Self {
            state: ProblemState::new(name),
            context: Rc::clone(context),
            space: Rc::clone(space),
            lhs: Vec::new(),
            rhs: Vec::new(),
            dirichlet_on_boundary: false,
            cg_settings: CgSettings::default(),
            picard: None,
            mass_inner_product: false,
        }
    }

    /// Adds a bilinear form with coefficient `theta(mu)`.
    pub fn lhs_form(mut self, form: Rc<Form>, theta: impl Fn(&Parameter) -> f64 + 'static) -> Self {
        assert!(form.kind().is_bilinear(), "Form {} is not bilinear", form.name());
        self.lhs.push((Operator::Form(form), Rc::new(theta)));
        self
    }

    /// Adds a linear form with coefficient `theta(mu)`.
    pub fn rhs_form(mut self, form: Rc<Form>, theta: impl Fn(&Parameter) -> f64 + 'static) -> Self {
        assert!(!form.kind().is_bilinear(), "Form {} is not linear", form.name());
        self.rhs.push((Operator::Form(form), Rc::new(theta)));
        self
    }

    /// Imposes $u = 0$ on all boundary vertices.
    pub fn homogeneous_dirichlet_on_boundary(mut self) -> Self {
        self.dirichlet_on_boundary = true;
        self
    }

    pub fn cg_settings(mut self, settings: CgSettings) -> Self {
        self.cg_settings = settings;
        self
    }

    /// Solves by fixed-point iteration, for operators that depend on the solution itself.
    pub fn picard(mut self, settings: PicardSettings) -> Self {
        self.picard = Some(settings);
        self
    }

    /// Compresses snapshots in the $L^2$ inner product instead of the Euclidean one.
    pub fn mass_inner_product(mut self) -> Self {
        self.mass_inner_product = true;
        self
    }

    pub fn build(self) -> Rc<EllipticProblem> {
        Rc::new(self.into_problem())
    }

    /// Builds a problem whose forms may refer to its own solution through the given handle.
    pub fn build_cyclic<F>(self, configure: F) -> Rc<EllipticProblem>
    where
        F: FnOnce(Self, &SolutionHandle) -> Self,
    {
        Rc::new_cyclic(|weak: &Weak<EllipticProblem>| {
            let handle = SolutionHandle {
                problem: weak.clone(),
                id: self.state.id(),
            };
            configure(self, &handle).into_problem()
        })
    }

    fn into_problem(self) -> EllipticProblem {
        assert!(!self.lhs.is_empty(), "An elliptic problem needs at least one bilinear form");
        let dirichlet_dofs = if self.dirichlet_on_boundary {
            let boundary = self.space.mesh().find_boundary_vertices();
            (0..self.space.values_per_vertex())
                .flat_map(|s| boundary.iter().map(move |&v| (v, s)))
                .map(|(v, s)| self.space.dof(v, s))
                .collect()
        } else {
            Vec::new()
        };
        EllipticProblem {
            state: self.state,
            context: self.context,
            space: self.space,
            lhs: self.lhs,
            rhs: self.rhs,
            dirichlet_dofs,
            cg_settings: self.cg_settings,
            picard: self.picard,
            mass_inner_product: self.mass_inner_product,
        }
    }
}

impl EllipticProblem {
    pub fn builder(
        name: impl Into<String>,
        context: &Rc<ReductionContext>,
        space: &Rc<FunctionSpace>,
    ) -> EllipticProblemBuilder {
        EllipticProblemBuilder::new(name, context, space)
    }

    pub fn dirichlet_dofs(&self) -> &[usize] {
        &self.dirichlet_dofs
    }

    fn term(&self, term: &str) -> eyre::Result<&[(Operator, Theta)]> {
        match term {
            LHS_TERM => Ok(&self.lhs),
            RHS_TERM => Ok(&self.rhs),
            _ => Err(eyre!("Problem {} has no term named {term}", self.name())),
        }
    }

    /// Assembles $\sum_q \theta_q A_q$ for one term of the given decomposition.
    fn combine(
        &self,
        operators: &dyn AffineDecomposition,
        term: &str,
    ) -> eyre::Result<Option<Tensor>> {
        let thetas = operators.compute_theta(term)?;
        let ops = operators.assemble_operator(term)?;
        assert_eq!(
            thetas.len(),
            ops.len(),
            "Number of coefficients of term {term} does not match its number of operators"
        );
        if ops.is_empty() {
            return Ok(None);
        }
        let mu = self.mu();
        let t = self.time();
        let tensors = ops
            .iter()
            .map(|op| op.assemble(&self.context, &mu, t))
            .collect::<eyre::Result<AffineExpansionStorage<Tensor>>>()?;
        Ok(Some(tensors.linear_combination(&thetas)))
    }

    fn solve_linearized(&self, operators: &dyn AffineDecomposition) -> eyre::Result<DVector<f64>> {
        let mut matrix = match self.combine(operators, LHS_TERM)? {
            Some(Tensor::Matrix(matrix)) => matrix,
            _ => return Err(eyre!("Term {LHS_TERM} of {} must assemble to a matrix", self.name())),
        };
        let mut rhs = match self.combine(operators, RHS_TERM)? {
            Some(Tensor::Vector(vector)) => vector,
            None => DVector::zeros(self.space.dim()),
            Some(Tensor::Matrix(_)) => {
                return Err(eyre!("Term {RHS_TERM} of {} must assemble to a vector", self.name()))
            }
        };
        apply_homogeneous_dirichlet_bc_csr(&mut matrix, &self.dirichlet_dofs);
        apply_homogeneous_dirichlet_bc_rhs(&mut rhs, &self.dirichlet_dofs);
        Ok(solve_spd(&matrix, &rhs, &self.cg_settings)?)
    }
}

impl ParametrizedProblem for EllipticProblem {
    fn state(&self) -> &ProblemState {
        &self.state
    }
}

impl TruthProblem for EllipticProblem {
    fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    fn solve(&self) -> eyre::Result<DVector<f64>> {
        self.solve_with(self)
    }

    fn inner_product(&self, _component: &str) -> Option<CsrMatrix<f64>> {
        self.mass_inner_product.then(|| self.space.mass_matrix().clone())
    }
}

impl AffineDecomposition for EllipticProblem {
    fn terms(&self) -> Vec<String> {
        vec![LHS_TERM.to_string(), RHS_TERM.to_string()]
    }

    fn assemble_operator(&self, term: &str) -> eyre::Result<Vec<Operator>> {
        Ok(self.term(term)?.iter().map(|(op, _)| op.clone()).collect())
    }

    fn compute_theta(&self, term: &str) -> eyre::Result<Vec<f64>> {
        let mu = self.mu();
        Ok(self.term(term)?.iter().map(|(_, theta)| theta(&mu)).collect())
    }
}

impl DifferentialProblem for EllipticProblem {
    fn context(&self) -> &Rc<ReductionContext> {
        &self.context
    }

    fn solve_with(&self, operators: &dyn AffineDecomposition) -> eyre::Result<DVector<f64>> {
        let guard = self.state.begin_solve();
        let solution = match self.picard {
            None => self.solve_linearized(operators)?,
            Some(settings) => {
                let mut current = DVector::zeros(self.space.dim());
                self.state.store_solution(&current);
                for iteration in 0..settings.max_iterations {
                    let next = self.solve_linearized(operators)?;
                    let change = (&next - &current).norm() / next.norm().max(f64::MIN_POSITIVE);
                    self.state.store_solution(&next);
                    current = next;
                    debug!(
                        "Picard iteration {} of {}: relative change {:.3e}",
                        iteration + 1,
                        self.name(),
                        change
                    );
                    if change <= settings.tolerance {
                        break;
                    }
                    if iteration + 1 == settings.max_iterations {
                        warn!("Picard iteration of {} did not converge", self.name());
                    }
                }
                current
            }
        };
        Ok(guard.finish(solution))
    }

    fn picard_settings(&self) -> Option<PicardSettings> {
        self.picard
    }
}
