use crate::affine::{AffineExpansionStorage, Operator, Tensor};
use crate::linear_solver::solve_dense;
use crate::online_size::OnlineSize;
use crate::parameters::Parameter;
use crate::problem::{
    DifferentialProblem, ParametrizedProblem, ProblemState, ReducedProblem, SolveOptions,
    TruthProblem,
};
use crate::rb::BasisFunctionsMatrix;
use eyre::eyre;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Galerkin projection $Z^T A_q Z$ or $Z^T f_q$ of one affine operator onto all basis functions.
#[derive(Debug, Clone, PartialEq)]
enum ProjectedOperator {
    Matrix(DMatrix<f64>),
    Vector(DVector<f64>),
}

fn project_operator(
    truth: &dyn DifferentialProblem,
    term: &str,
    operator: &Operator,
    basis: &DMatrix<f64>,
) -> eyre::Result<ProjectedOperator> {
    let tensor = match operator {
        Operator::Tensor(tensor) => tensor.clone(),
        Operator::Form(form) => {
            assert!(
                !form.classification().parametrized,
                "Form {} of term {term} depends on the parameter and must be approximated by DEIM \
                 before projection",
                form.name()
            );
            form.assemble(truth.context(), &Parameter::default(), 0.0)?
        }
    };
    Ok(match tensor {
        Tensor::Matrix(matrix) => {
            let a_z: DMatrix<f64> = &matrix * basis;
            ProjectedOperator::Matrix(basis.transpose() * a_z)
        }
        Tensor::Vector(vector) => ProjectedOperator::Vector(basis.transpose() * vector),
    })
}

/// A truth problem projected onto a reduced basis.
///
/// The reduced system is $\sum_q \theta_q(\mu) A_{N,q} c = \sum_q \theta_q(\mu) f_{N,q}$, where
/// matrix-valued operators of all terms form the left-hand side and vector-valued operators the
/// right-hand side.
pub struct GalerkinReducedProblem<P> {
    state: ProblemState,
    truth: Rc<P>,
    basis: BasisFunctionsMatrix,
    operators: BTreeMap<String, Vec<ProjectedOperator>>,
    online_size: RefCell<OnlineSize>,
    options: RefCell<SolveOptions>,
}

impl<P: DifferentialProblem + 'static> GalerkinReducedProblem<P> {
    /// Projects all affine operators of `truth` onto `basis`.
    ///
    /// # Panics
    ///
    /// Panics if an operator is a parametrized form, which must be approximated by DEIM first.
    pub fn new(truth: &Rc<P>, basis: BasisFunctionsMatrix) -> eyre::Result<Self> {
        let basis_matrix = basis.full_matrix();
        let mut operators = BTreeMap::new();
        for term in truth.terms() {
            let projected = truth
                .assemble_operator(&term)?
                .iter()
                .map(|operator| project_operator(&**truth, &term, operator, &basis_matrix))
                .collect::<eyre::Result<Vec<_>>>()?;
            debug!("Projected {} operators of term {}", projected.len(), term);
            operators.insert(term, projected);
        }

        let state = ProblemState::new(format!("reduced {}", truth.name()));
        if let Some(range) = truth.mu_range() {
            state.set_mu_range(range);
        }
        Ok(Self {
            state,
            truth: Rc::clone(truth),
            online_size: RefCell::new(basis.online_size()),
            basis,
            operators,
            options: RefCell::new(SolveOptions::default()),
        })
    }

    pub fn truth(&self) -> &Rc<P> {
        &self.truth
    }

    /// The largest online size available.
    pub fn max_online_size(&self) -> OnlineSize {
        self.basis.online_size()
    }

    pub fn set_online_size(&self, n: OnlineSize) {
        self.basis.column_indices(&n);
        if *self.online_size.borrow() != n {
            self.state.invalidate();
        }
        *self.online_size.borrow_mut() = n;
    }

    pub fn set_solve_options(&self, options: SolveOptions) {
        if *self.options.borrow() != options {
            self.state.invalidate();
        }
        *self.options.borrow_mut() = options;
    }

    /// Solves the reduced problem with `n` basis functions at the current parameter.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of trained basis functions.
    pub fn solve_with(&self, n: &OnlineSize, options: &SolveOptions) -> eyre::Result<DVector<f64>> {
        let indices = self.basis.column_indices(n);
        *self.online_size.borrow_mut() = n.clone();
        *self.options.borrow_mut() = options.clone();

        let guard = self.state.begin_solve();
        self.truth.set_mu(&self.mu());
        self.truth.set_time(self.time());
        self.truth.update_solve_options(options)?;

        let solution = match self.truth.picard_settings() {
            None => self.solve_linear(&indices)?,
            Some(settings) => {
                let mut current = DVector::zeros(indices.len());
                self.state.store_solution(&current);
                for iteration in 0..settings.max_iterations {
                    let next = self.solve_linear(&indices)?;
                    let change = (&next - &current).norm() / next.norm().max(f64::MIN_POSITIVE);
                    self.state.store_solution(&next);
                    current = next;
                    debug!(
                        "Reduced Picard iteration {}: relative change {:.3e}",
                        iteration + 1,
                        change
                    );
                    if change <= settings.tolerance {
                        break;
                    }
                    if iteration + 1 == settings.max_iterations {
                        warn!("Reduced Picard iteration of {} did not converge", self.name());
                    }
                }
                current
            }
        };
        Ok(guard.finish(solution))
    }

    fn solve_linear(&self, indices: &[usize]) -> eyre::Result<DVector<f64>> {
        let n = indices.len();
        let mut lhs: Option<DMatrix<f64>> = None;
        let mut rhs = DVector::zeros(n);
        for (term, projected) in &self.operators {
            let thetas = self.truth.compute_theta(term)?;
            assert_eq!(
                thetas.len(),
                projected.len(),
                "Number of coefficients of term {term} does not match its projected operators"
            );
            let matrices: AffineExpansionStorage<DMatrix<f64>> = projected
                .iter()
                .filter_map(|op| match op {
                    ProjectedOperator::Matrix(m) => {
                        Some(m.select_rows(indices).select_columns(indices))
                    }
                    ProjectedOperator::Vector(_) => None,
                })
                .collect();
            let vectors: AffineExpansionStorage<DVector<f64>> = projected
                .iter()
                .filter_map(|op| match op {
                    ProjectedOperator::Vector(v) => Some(v.select_rows(indices)),
                    ProjectedOperator::Matrix(_) => None,
                })
                .collect();
            let (matrix_thetas, vector_thetas): (Vec<_>, Vec<_>) = thetas
                .iter()
                .zip(projected)
                .partition(|(_, op)| matches!(op, ProjectedOperator::Matrix(_)));
            let matrix_thetas: Vec<f64> =
                matrix_thetas.into_iter().map(|(theta, _)| *theta).collect();
            let vector_thetas: Vec<f64> =
                vector_thetas.into_iter().map(|(theta, _)| *theta).collect();

            if !matrices.is_empty() {
                let combined = matrices.linear_combination(&matrix_thetas);
                match &mut lhs {
                    Some(lhs) => *lhs += combined,
                    None => lhs = Some(combined),
                }
            }
            if !vectors.is_empty() {
                rhs += vectors.linear_combination(&vector_thetas);
            }
        }
        let lhs = lhs
            .ok_or_else(|| eyre!("Problem {} has no matrix-valued operators", self.truth.name()))?;
        Ok(solve_dense(lhs, &rhs)?)
    }

    /// Expands reduced coefficients into a full-order vector.
    pub fn reconstruct(&self, coefficients: &DVector<f64>, n: &OnlineSize) -> DVector<f64> {
        self.basis.matrix(n) * coefficients
    }
}

impl<P: DifferentialProblem + 'static> ParametrizedProblem for GalerkinReducedProblem<P> {
    fn state(&self) -> &ProblemState {
        &self.state
    }
}

impl<P: DifferentialProblem + 'static> ReducedProblem for GalerkinReducedProblem<P> {
    fn truth_problem(&self) -> Rc<dyn TruthProblem> {
        Rc::clone(&self.truth) as Rc<dyn TruthProblem>
    }

    fn basis_functions(&self) -> &BasisFunctionsMatrix {
        &self.basis
    }

    fn online_size(&self) -> OnlineSize {
        self.online_size.borrow().clone()
    }

    fn solve(&self) -> eyre::Result<DVector<f64>> {
        let n = self.online_size.borrow().clone();
        let options = self.options.borrow().clone();
        self.solve_with(&n, &options)
    }
}
