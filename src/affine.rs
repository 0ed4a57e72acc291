//! Affine decompositions $A(\mu) = \sum_q \theta_q(\mu) A_q$ and their storage.
use crate::context::ReductionContext;
use crate::form::Form;
use crate::parameters::Parameter;
use crate::problem::SolveOptions;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

/// An assembled operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Matrix(CsrMatrix<f64>),
    Vector(DVector<f64>),
}

impl Tensor {
    pub fn as_matrix(&self) -> Option<&CsrMatrix<f64>> {
        match self {
            Self::Matrix(matrix) => Some(matrix),
            Self::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&DVector<f64>> {
        match self {
            Self::Vector(vector) => Some(vector),
            Self::Matrix(_) => None,
        }
    }

    /// The stored values as a flat vector: the vector itself, or the non-zero values of the matrix.
    pub fn to_flat_values(&self) -> DVector<f64> {
        match self {
            Self::Matrix(matrix) => DVector::from_column_slice(matrix.values()),
            Self::Vector(vector) => vector.clone(),
        }
    }
}

/// One term of an affine expansion: either a symbolic form or an already assembled tensor.
#[derive(Clone)]
pub enum Operator {
    Form(Rc<Form>),
    Tensor(Tensor),
}

impl Operator {
    pub fn as_form(&self) -> Option<&Rc<Form>> {
        match self {
            Self::Form(form) => Some(form),
            Self::Tensor(_) => None,
        }
    }

    /// Assembles the operator on the full mesh at the given parameter and time.
    pub fn assemble(
        &self,
        context: &ReductionContext,
        mu: &Parameter,
        t: f64,
    ) -> eyre::Result<Tensor> {
        match self {
            Self::Form(form) => form.assemble(context, mu, t),
            Self::Tensor(tensor) => Ok(tensor.clone()),
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form(form) => write!(f, "Form({})", form.name()),
            Self::Tensor(Tensor::Matrix(m)) => write!(f, "Matrix({}x{})", m.nrows(), m.ncols()),
            Self::Tensor(Tensor::Vector(v)) => write!(f, "Vector({})", v.len()),
        }
    }
}

/// Access to the affine expansion of a problem, term by term.
///
/// For every term, [`assemble_operator`](Self::assemble_operator) and
/// [`compute_theta`](Self::compute_theta) must return sequences of the same length.
pub trait AffineDecomposition {
    fn terms(&self) -> Vec<String>;

    fn assemble_operator(&self, term: &str) -> eyre::Result<Vec<Operator>>;

    /// Coefficients of the term at the current parameter.
    fn compute_theta(&self, term: &str) -> eyre::Result<Vec<f64>>;

    /// Receives the options of the next solve.
    fn update_solve_options(&self, _options: &SolveOptions) -> eyre::Result<()> {
        Ok(())
    }
}

pub trait LinearCombination: Sized {
    fn scaled(&self, alpha: f64) -> Self;

    /// `self += alpha * other`
    fn add_scaled(&mut self, alpha: f64, other: &Self);
}

impl LinearCombination for DVector<f64> {
    fn scaled(&self, alpha: f64) -> Self {
        self * alpha
    }

    fn add_scaled(&mut self, alpha: f64, other: &Self) {
        self.axpy(alpha, other, 1.0);
    }
}

impl LinearCombination for DMatrix<f64> {
    fn scaled(&self, alpha: f64) -> Self {
        self * alpha
    }

    fn add_scaled(&mut self, alpha: f64, other: &Self) {
        *self += other * alpha;
    }
}

impl LinearCombination for CsrMatrix<f64> {
    fn scaled(&self, alpha: f64) -> Self {
        self * alpha
    }

    fn add_scaled(&mut self, alpha: f64, other: &Self) {
        if self.pattern() == other.pattern() {
            for (a, b) in self.values_mut().iter_mut().zip(other.values()) {
                *a += alpha * b;
            }
        } else {
            *self = &*self + &(other * alpha);
        }
    }
}

impl LinearCombination for Tensor {
    fn scaled(&self, alpha: f64) -> Self {
        match self {
            Self::Matrix(matrix) => Self::Matrix(matrix.scaled(alpha)),
            Self::Vector(vector) => Self::Vector(vector.scaled(alpha)),
        }
    }

    fn add_scaled(&mut self, alpha: f64, other: &Self) {
        match (self, other) {
            (Self::Matrix(a), Self::Matrix(b)) => a.add_scaled(alpha, b),
            (Self::Vector(a), Self::Vector(b)) => a.add_scaled(alpha, b),
            _ => panic!("Cannot combine matrices and vectors in the same affine expansion"),
        }
    }
}

/// The operators $A_q$ of one term of an affine expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineExpansionStorage<T> {
    operators: Vec<T>,
}

impl<T> AffineExpansionStorage<T> {
    pub fn new(operators: Vec<T>) -> Self {
        Self { operators }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.operators.iter()
    }
}

impl<T: LinearCombination> AffineExpansionStorage<T> {
    /// Computes $\sum_q \theta_q A_q$.
    ///
    /// # Panics
    ///
    /// Panics if the number of coefficients does not match the number of operators, or if the
    /// expansion is empty.
    pub fn linear_combination(&self, thetas: &[f64]) -> T {
        assert_eq!(
            thetas.len(),
            self.operators.len(),
            "Number of coefficients must match the number of operators of the affine expansion"
        );
        let (first, rest) = self
            .operators
            .split_first()
            .expect("Cannot combine an empty affine expansion");
        let mut result = first.scaled(thetas[0]);
        for (theta, operator) in thetas[1..].iter().zip(rest) {
            result.add_scaled(*theta, operator);
        }
        result
    }
}

impl<T> FromIterator<T> for AffineExpansionStorage<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> Index<usize> for AffineExpansionStorage<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.operators[index]
    }
}
