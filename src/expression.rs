//! Symbolic parametrized expressions.
//!
//! An [`Expr`] is an immutable tree whose leaves are constants, parameters, time, coordinates,
//! cell-wise geometric quantities, solutions of other problems, or discrete fields. Before an
//! expression can be evaluated, its solution leaves must be replaced by discrete fields and its
//! geometric leaves must be bound to the mesh on which it is evaluated. This is the job of
//! [`crate::evaluator`].
use crate::geometry::{GeometricKind, TriangleCell};
use crate::mesh::TriangleMesh2d;
use crate::problem::{ProblemId, TruthProblem};
use crate::space::{FunctionSpace, Location};
use nalgebra::{DVector, Point2};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_EXPRESSION_ID: AtomicUsize = AtomicUsize::new(0);
static NEXT_PLACEHOLDER_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionId(usize);

impl ExpressionId {
    fn next() -> Self {
        Self(NEXT_EXPRESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Ln,
    Abs,
    Sin,
    Cos,
    Powi(i32),
}

impl UnaryOp {
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Self::Neg => -x,
            Self::Sqrt => x.sqrt(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Abs => x.abs(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Powi(n) => x.powi(n),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

impl BinaryOp {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

/// A geometric quantity bound to a particular mesh.
///
/// Values are constant per cell. At a vertex, the quantity takes the largest value among the
/// cells sharing the vertex.
#[derive(Clone)]
pub struct GeometricQuantity {
    kind: GeometricKind,
    mesh: Rc<TriangleMesh2d>,
    cell_values: Rc<[f64]>,
    vertex_values: Rc<[f64]>,
}

impl GeometricQuantity {
    pub fn new(kind: GeometricKind, mesh: Rc<TriangleMesh2d>) -> Self {
        let cell_values: Rc<[f64]> = mesh
            .cell_iter()
            .map(|cell| kind.evaluate(&TriangleCell::from(cell)))
            .collect();
        let mut vertex_values = vec![f64::NEG_INFINITY; mesh.vertices().len()];
        for (conn, &value) in mesh.connectivity().iter().zip(cell_values.iter()) {
            for &v in conn.iter() {
                vertex_values[v] = vertex_values[v].max(value);
            }
        }
        Self {
            kind,
            mesh,
            cell_values,
            vertex_values: vertex_values.into(),
        }
    }

    pub fn kind(&self) -> GeometricKind {
        self.kind
    }

    pub fn mesh(&self) -> &Rc<TriangleMesh2d> {
        &self.mesh
    }

    /// The same quantity bound to another mesh.
    pub fn rebind(&self, mesh: &Rc<TriangleMesh2d>) -> Self {
        if Rc::ptr_eq(&self.mesh, mesh) {
            self.clone()
        } else {
            Self::new(self.kind, Rc::clone(mesh))
        }
    }

    pub fn evaluate(&self, location: &Location) -> f64 {
        match *location {
            Location::Vertex(v) => self.vertex_values[v],
            Location::Cell { cell, .. } => self.cell_values[cell],
        }
    }

    fn key(&self) -> TerminalKey {
        TerminalKey::Geometric(self.kind, Rc::as_ptr(&self.mesh) as usize)
    }
}

impl fmt::Debug for GeometricQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:p}", self.kind, Rc::as_ptr(&self.mesh))
    }
}

/// Reference to one scalar value of the solution of a truth problem.
#[derive(Clone)]
pub struct SolutionRef {
    problem: Weak<dyn TruthProblem>,
    id: ProblemId,
    component: usize,
}

impl SolutionRef {
    pub fn id(&self) -> ProblemId {
        self.id
    }

    /// Index of the scalar value within the per-vertex block of the problem's space.
    pub fn component(&self) -> usize {
        self.component
    }

    /// # Panics
    ///
    /// Panics if the problem has been dropped.
    pub fn problem(&self) -> Rc<dyn TruthProblem> {
        self.problem
            .upgrade()
            .unwrap_or_else(|| {
                panic!("Problem {} was dropped while still referenced by an expression", self.id)
            })
    }
}

impl fmt::Debug for SolutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "solution({})[{}]", self.id, self.component)
    }
}

/// A discrete field whose values are refreshed in place.
pub struct Placeholder {
    id: usize,
    space: Rc<FunctionSpace>,
    values: RefCell<DVector<f64>>,
}

impl Placeholder {
    pub fn new(space: Rc<FunctionSpace>) -> Rc<Self> {
        let values = RefCell::new(DVector::zeros(space.dim()));
        Rc::new(Self {
            id: NEXT_PLACEHOLDER_ID.fetch_add(1, Ordering::Relaxed),
            space,
            values,
        })
    }

    pub fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    pub fn assign(&self, values: DVector<f64>) {
        assert_eq!(
            values.len(),
            self.space.dim(),
            "Field values must match the dimension of the space"
        );
        *self.values.borrow_mut() = values;
    }

    pub fn values(&self) -> Ref<'_, DVector<f64>> {
        self.values.borrow()
    }

    pub fn value_at(&self, location: &Location, scalar_index: usize) -> f64 {
        self.space.evaluate(&self.values.borrow(), location, scalar_index)
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.id)
    }
}

#[derive(Clone, Debug)]
pub struct FieldRef {
    field: Rc<Placeholder>,
    component: usize,
}

impl FieldRef {
    pub fn field(&self) -> &Rc<Placeholder> {
        &self.field
    }

    pub fn component(&self) -> usize {
        self.component
    }
}

#[derive(Clone)]
pub enum Expr {
    Constant(f64),
    Parameter(usize),
    Time,
    Coordinate(usize),
    Geometric(GeometricQuantity),
    Solution(SolutionRef),
    Field(FieldRef),
    Unary(UnaryOp, Rc<Expr>),
    Binary(BinaryOp, Rc<Expr>, Rc<Expr>),
}

/// Everything an expression may depend on at a single point.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationPoint<'a> {
    pub x: Point2<f64>,
    pub location: Location,
    pub mu: &'a [f64],
    pub t: f64,
}

/// Identity of a leaf that must be substituted before evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TerminalKey {
    Solution(ProblemId),
    Geometric(GeometricKind, usize),
}

#[derive(Debug, Clone)]
pub enum Terminal {
    Solution(SolutionRef),
    Geometric(GeometricQuantity),
}

impl Terminal {
    pub fn key(&self) -> TerminalKey {
        match self {
            Self::Solution(solution) => TerminalKey::Solution(solution.id),
            Self::Geometric(quantity) => quantity.key(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Replacement {
    Field(Rc<Placeholder>),
    Geometric(GeometricQuantity),
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    pub fn parameter(index: usize) -> Self {
        Self::Parameter(index)
    }

    pub fn time() -> Self {
        Self::Time
    }

    pub fn x() -> Self {
        Self::Coordinate(0)
    }

    pub fn y() -> Self {
        Self::Coordinate(1)
    }

    pub fn geometric(kind: GeometricKind, mesh: &Rc<TriangleMesh2d>) -> Self {
        Self::Geometric(GeometricQuantity::new(kind, Rc::clone(mesh)))
    }

    /// Scalar value `component` of the solution of `problem`.
    pub fn solution(problem: &Rc<dyn TruthProblem>, component: usize) -> Self {
        Self::solution_weak(Rc::downgrade(problem), problem.id(), component)
    }

    /// Same as [`solution`](Self::solution), for problems that refer to their own solution
    /// and therefore only have a weak handle during construction.
    pub fn solution_weak(problem: Weak<dyn TruthProblem>, id: ProblemId, component: usize) -> Self {
        Self::Solution(SolutionRef { problem, id, component })
    }

    pub fn field(field: &Rc<Placeholder>, component: usize) -> Self {
        Self::Field(FieldRef {
            field: Rc::clone(field),
            component,
        })
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary(op, Rc::new(self))
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Self {
        Self::Binary(op, Rc::new(self), Rc::new(other))
    }

    pub fn sqrt(self) -> Self {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn exp(self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    pub fn ln(self) -> Self {
        self.unary(UnaryOp::Ln)
    }

    pub fn abs(self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn sin(self) -> Self {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(self) -> Self {
        self.unary(UnaryOp::Cos)
    }

    pub fn powi(self, n: i32) -> Self {
        self.unary(UnaryOp::Powi(n))
    }

    pub fn powf(self, exponent: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Pow, exponent.into())
    }

    pub fn min(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Min, other.into())
    }

    pub fn max(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Max, other.into())
    }

    /// Whether the expression is a leaf.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unary(..) | Self::Binary(..))
    }

    /// Evaluates the expression.
    ///
    /// # Panics
    ///
    /// Panics if the expression still contains solution leaves, or if it refers to a parameter
    /// index that is out of bounds.
    pub fn evaluate(&self, point: &EvaluationPoint) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Parameter(i) => *point.mu.get(*i).unwrap_or_else(|| {
                panic!(
                    "Expression refers to parameter {i}, but mu has {} entries",
                    point.mu.len()
                )
            }),
            Self::Time => point.t,
            Self::Coordinate(i) => point.x[*i],
            Self::Geometric(quantity) => quantity.evaluate(&point.location),
            Self::Solution(solution) => panic!(
                "Solution leaf {:?} must be replaced by a field before evaluation",
                solution
            ),
            Self::Field(field) => field.field.value_at(&point.location, field.component),
            Self::Unary(op, a) => op.apply(a.evaluate(point)),
            Self::Binary(op, a, b) => op.apply(a.evaluate(point), b.evaluate(point)),
        }
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Self::Unary(_, a) => a.visit(f),
            Self::Binary(_, a, b) => {
                a.visit(f);
                b.visit(f);
            }
            _ => {}
        }
    }

    fn any(&self, mut predicate: impl FnMut(&Expr) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |e| found = found || predicate(e));
        found
    }

    /// Solution and geometric leaves, each listed once, in depth-first order.
    pub fn unique_terminals(&self) -> Vec<Terminal> {
        let mut seen = FxHashSet::default();
        let mut terminals = Vec::new();
        self.visit(&mut |e| {
            let terminal = match e {
                Self::Solution(solution) => Terminal::Solution(solution.clone()),
                Self::Geometric(quantity) => Terminal::Geometric(quantity.clone()),
                _ => return,
            };
            if seen.insert(terminal.key()) {
                terminals.push(terminal);
            }
        });
        terminals
    }

    /// Returns a copy of the expression in which leaves are substituted according to
    /// `replacements`.
    ///
    /// A solution leaf referring to scalar value `c` of a problem becomes scalar value `c`
    /// of the replacing field.
    pub fn replace(&self, replacements: &FxHashMap<TerminalKey, Replacement>) -> Expr {
        match self {
            Self::Solution(solution) => {
                match replacements.get(&TerminalKey::Solution(solution.id)) {
                    Some(Replacement::Field(field)) => Self::field(field, solution.component),
                    Some(Replacement::Geometric(_)) => {
                        unreachable!("Solution leaves are replaced by fields")
                    }
                    None => self.clone(),
                }
            }
            Self::Geometric(quantity) => match replacements.get(&quantity.key()) {
                Some(Replacement::Geometric(replacement)) => Self::Geometric(replacement.clone()),
                Some(Replacement::Field(_)) => {
                    unreachable!("Geometric leaves are replaced by geometric quantities")
                }
                None => self.clone(),
            },
            Self::Unary(op, a) => Self::Unary(*op, Rc::new(a.replace(replacements))),
            Self::Binary(op, a, b) => Self::Binary(
                *op,
                Rc::new(a.replace(replacements)),
                Rc::new(b.replace(replacements)),
            ),
            _ => self.clone(),
        }
    }

    /// Whether the value depends on the parameter, directly or through a solution.
    pub fn depends_on_parameters(&self) -> bool {
        self.any(|e| matches!(e, Self::Parameter(_) | Self::Solution(_) | Self::Field(_)))
    }

    pub fn depends_on_time(&self) -> bool {
        self.any(|e| matches!(e, Self::Time))
    }

    pub fn contains_solutions(&self) -> bool {
        self.any(|e| matches!(e, Self::Solution(_)))
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Parameter(i) => write!(f, "mu[{i}]"),
            Self::Time => write!(f, "t"),
            Self::Coordinate(i) => write!(f, "x[{i}]"),
            Self::Geometric(quantity) => write!(f, "{quantity:?}"),
            Self::Solution(solution) => write!(f, "{solution:?}"),
            Self::Field(field) => write!(f, "{:?}[{}]", field.field, field.component),
            Self::Unary(UnaryOp::Neg, a) => write!(f, "-({a:?})"),
            Self::Unary(UnaryOp::Powi(n), a) => write!(f, "({a:?})^{n}"),
            Self::Unary(op, a) => write!(f, "{op:?}({a:?})"),
            Self::Binary(op, a, b) => write!(f, "{op:?}({a:?}, {b:?})"),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        self.unary(UnaryOp::Neg)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                self.binary($op, rhs)
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                self.binary($op, Expr::Constant(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::Constant(self).binary($op, rhs)
            }
        }

        impl<'a> $trait<&'a Expr> for &'a Expr {
            type Output = Expr;

            fn $method(self, rhs: &'a Expr) -> Expr {
                self.clone().binary($op, rhs.clone())
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

/// Whether an expression is evaluated pointwise, stands for a discrete function, or must be
/// projected onto the finite element space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionKind {
    Pointwise,
    Function,
    Operator,
}

/// Dependencies of an expression that decide how it is treated by a reduction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub parametrized: bool,
    pub time_dependent: bool,
}

/// A (vector-valued) expression with a stable identity.
///
/// The identity is used to cache the substituted expression per reduced mesh. Clones share the
/// identity of the original.
#[derive(Debug, Clone)]
pub struct ParametrizedExpression {
    id: ExpressionId,
    kind: ExpressionKind,
    components: Vec<Expr>,
    classification: Classification,
}

impl ParametrizedExpression {
    pub fn new(kind: ExpressionKind, components: Vec<Expr>) -> Self {
        assert!(!components.is_empty(), "An expression needs at least one component");
        let classification = Classification {
            parametrized: components.iter().any(Expr::depends_on_parameters),
            time_dependent: components.iter().any(Expr::depends_on_time),
        };
        Self {
            id: ExpressionId::next(),
            kind,
            components,
            classification,
        }
    }

    pub fn pointwise(components: Vec<Expr>) -> Self {
        Self::new(ExpressionKind::Pointwise, components)
    }

    pub fn scalar(expression: Expr) -> Self {
        Self::pointwise(vec![expression])
    }

    /// Composite expression, evaluated by $L^2$ projection.
    pub fn operator(components: Vec<Expr>) -> Self {
        Self::new(ExpressionKind::Operator, components)
    }

    /// The named component of the solution of `problem`, viewed as a function.
    pub fn function(problem: &Rc<dyn TruthProblem>, component: &str) -> Self {
        let range = problem
            .space()
            .component_range(component)
            .unwrap_or_else(|| {
                panic!("Problem {} has no component named {component}", problem.name())
            });
        let components = range.map(|s| Expr::solution(problem, s)).collect();
        Self::new(ExpressionKind::Function, components)
    }

    pub fn id(&self) -> ExpressionId {
        self.id
    }

    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    pub fn components(&self) -> &[Expr] {
        &self.components
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }
}
