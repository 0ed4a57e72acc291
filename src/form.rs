use crate::affine::Tensor;
use crate::assembly::{self, FormKind};
use crate::context::ReductionContext;
use crate::evaluator;
use crate::expression::{Classification, EvaluationPoint, Expr, ParametrizedExpression};
use crate::parameters::Parameter;
use crate::quadrature::TriangleQuadrature;
use crate::reduced_mesh::ReducedMeshLevel;
use crate::space::FunctionSpace;
use std::rc::Rc;

/// A symbolic linear or bilinear form with a scalar (parametrized) coefficient.
#[derive(Debug)]
pub struct Form {
    name: String,
    kind: FormKind,
    space: Rc<FunctionSpace>,
    coefficient: ParametrizedExpression,
    quadrature: TriangleQuadrature,
}

impl Form {
    pub fn new(
        name: impl Into<String>,
        kind: FormKind,
        space: &Rc<FunctionSpace>,
        coefficient: impl Into<Expr>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            kind,
            space: Rc::clone(space),
            coefficient: ParametrizedExpression::scalar(coefficient.into()),
            quadrature: TriangleQuadrature::default(),
        })
    }

    pub fn stiffness(
        name: impl Into<String>,
        space: &Rc<FunctionSpace>,
        coefficient: impl Into<Expr>,
    ) -> Rc<Self> {
        Self::new(name, FormKind::Stiffness, space, coefficient)
    }

    pub fn mass(
        name: impl Into<String>,
        space: &Rc<FunctionSpace>,
        coefficient: impl Into<Expr>,
    ) -> Rc<Self> {
        Self::new(name, FormKind::Mass, space, coefficient)
    }

    pub fn source(
        name: impl Into<String>,
        space: &Rc<FunctionSpace>,
        coefficient: impl Into<Expr>,
    ) -> Rc<Self> {
        Self::new(name, FormKind::Source, space, coefficient)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    pub fn coefficient(&self) -> &ParametrizedExpression {
        &self.coefficient
    }

    pub fn classification(&self) -> Classification {
        self.coefficient.classification()
    }

    /// Assembles the form with unit coefficient. The result has the same structure (vector length
    /// or sparsity pattern) as every other assembly of the form on the full mesh.
    pub fn assemble_structure(&self) -> Tensor {
        assembly::assemble(&self.space, self.kind, &self.quadrature, |_, _| 1.0)
    }

    /// Assembles the form on the full mesh.
    pub fn assemble(
        &self,
        context: &ReductionContext,
        mu: &Parameter,
        t: f64,
    ) -> eyre::Result<Tensor> {
        let level = context.full_level(&self.space);
        self.assemble_on(context, &level, mu, t)
    }

    /// Assembles the form on (the space of) a reduced mesh.
    pub fn assemble_on(
        &self,
        context: &ReductionContext,
        level: &ReducedMeshLevel,
        mu: &Parameter,
        t: f64,
    ) -> eyre::Result<Tensor> {
        let coefficient = evaluator::form_on_reduced_mesh(context, self, level, mu, t)?;
        Ok(assembly::assemble(level.space(), self.kind, &self.quadrature, |x, location| {
            coefficient.evaluate(&EvaluationPoint {
                x: *x,
                location: *location,
                mu: mu.as_slice(),
                t,
            })
        }))
    }
}
