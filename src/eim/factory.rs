use crate::affine::Tensor;
use crate::assembly::{csr_entry_index, csr_entry_row_col};
use crate::context::ReductionContext;
use crate::evaluator::expression_on_reduced_mesh;
use crate::expression::{Classification, ParametrizedExpression};
use crate::form::Form;
use crate::parameters::Parameter;
use crate::reduced_mesh::ReducedMeshLevel;
use crate::space::FunctionSpace;
use eyre::eyre;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::rc::Rc;

/// A source of snapshots of a parametrized object for empirical interpolation.
///
/// Snapshots are flat vectors. A location is an index into such a vector.
pub trait ParametrizedFactory {
    fn name(&self) -> &str;

    /// The full space whose mesh is reduced for online evaluation.
    fn space(&self) -> &Rc<FunctionSpace>;

    fn classification(&self) -> Classification;

    fn snapshot_dim(&self) -> usize;

    /// Evaluates the full snapshot.
    fn evaluate(&self, mu: &Parameter, t: f64) -> eyre::Result<DVector<f64>>;

    /// Full degrees of freedom of [`space`](Self::space) that a reduced mesh must contain in
    /// order to evaluate the snapshot entry at `location` exactly.
    fn location_dofs(&self, location: usize) -> Vec<usize>;

    /// Evaluates the snapshot entries at `locations` using only the cells of `level`.
    fn evaluate_at_locations(
        &self,
        mu: &Parameter,
        t: f64,
        level: &ReducedMeshLevel,
        locations: &[usize],
    ) -> eyre::Result<DVector<f64>>;

    /// Converts a flat vector of the snapshot layout back into the approximated object.
    fn to_tensor(&self, values: &DVector<f64>) -> eyre::Result<Tensor>;
}

/// Snapshots of a parametrized expression, interpolated at the nodes of a P1 space.
pub struct ParametrizedExpressionFactory {
    name: String,
    context: Rc<ReductionContext>,
    expression: ParametrizedExpression,
    space: Rc<FunctionSpace>,
}

impl ParametrizedExpressionFactory {
    /// # Panics
    ///
    /// Panics if the number of expression components differs from the number of values per vertex
    /// of `space`.
    pub fn new(
        name: impl Into<String>,
        context: &Rc<ReductionContext>,
        expression: ParametrizedExpression,
        space: &Rc<FunctionSpace>,
    ) -> Self {
        assert_eq!(
            expression.num_components(),
            space.values_per_vertex(),
            "Expression components must match the values per vertex of the interpolation space"
        );
        Self {
            name: name.into(),
            context: Rc::clone(context),
            expression,
            space: Rc::clone(space),
        }
    }

    pub fn expression(&self) -> &ParametrizedExpression {
        &self.expression
    }
}

impl ParametrizedFactory for ParametrizedExpressionFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Rc<FunctionSpace> {
        &self.space
    }

    fn classification(&self) -> Classification {
        self.expression.classification()
    }

    fn snapshot_dim(&self) -> usize {
        self.space.dim()
    }

    fn evaluate(&self, mu: &Parameter, t: f64) -> eyre::Result<DVector<f64>> {
        let level = self.context.full_level(&self.space);
        let evaluated = expression_on_reduced_mesh(&self.context, &self.expression, &level, mu, t)?;
        Ok(evaluated.to_function(&self.space, mu, t).into_values())
    }

    fn location_dofs(&self, location: usize) -> Vec<usize> {
        vec![location]
    }

    fn evaluate_at_locations(
        &self,
        mu: &Parameter,
        t: f64,
        level: &ReducedMeshLevel,
        locations: &[usize],
    ) -> eyre::Result<DVector<f64>> {
        let evaluated = expression_on_reduced_mesh(&self.context, &self.expression, level, mu, t)?;
        let reduced_dofs = locations
            .iter()
            .map(|&dof| {
                level
                    .reduced_dof(dof)
                    .ok_or_else(|| eyre!("DOF {dof} is not part of the reduced mesh"))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(evaluated.values_at(level.space(), mu, t, &reduced_dofs))
    }

    fn to_tensor(&self, values: &DVector<f64>) -> eyre::Result<Tensor> {
        Ok(Tensor::Vector(values.clone()))
    }
}

/// Snapshots of an assembled form.
///
/// For linear forms, locations are rows of the assembled vector. For bilinear forms, locations
/// index the non-zeros of the (parameter-independent) sparsity pattern of the full matrix.
pub struct ParametrizedTensorFactory {
    name: String,
    context: Rc<ReductionContext>,
    form: Rc<Form>,
    structure: Tensor,
}

impl ParametrizedTensorFactory {
    pub fn new(name: impl Into<String>, context: &Rc<ReductionContext>, form: &Rc<Form>) -> Self {
        Self {
            name: name.into(),
            context: Rc::clone(context),
            structure: form.assemble_structure(),
            form: Rc::clone(form),
        }
    }

    pub fn form(&self) -> &Rc<Form> {
        &self.form
    }
}

impl ParametrizedFactory for ParametrizedTensorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Rc<FunctionSpace> {
        self.form.space()
    }

    fn classification(&self) -> Classification {
        self.form.classification()
    }

    fn snapshot_dim(&self) -> usize {
        match &self.structure {
            Tensor::Matrix(matrix) => matrix.nnz(),
            Tensor::Vector(vector) => vector.len(),
        }
    }

    fn evaluate(&self, mu: &Parameter, t: f64) -> eyre::Result<DVector<f64>> {
        let tensor = self.form.assemble(&self.context, mu, t)?;
        Ok(tensor.to_flat_values())
    }

    fn location_dofs(&self, location: usize) -> Vec<usize> {
        match &self.structure {
            Tensor::Matrix(matrix) => {
                let (row, col) = csr_entry_row_col(matrix, location);
                if row == col {
                    vec![row]
                } else {
                    vec![row, col]
                }
            }
            Tensor::Vector(_) => vec![location],
        }
    }

    fn evaluate_at_locations(
        &self,
        mu: &Parameter,
        t: f64,
        level: &ReducedMeshLevel,
        locations: &[usize],
    ) -> eyre::Result<DVector<f64>> {
        let tensor = self.form.assemble_on(&self.context, level, mu, t)?;
        let reduced = |dof: usize| {
            level
                .reduced_dof(dof)
                .ok_or_else(|| eyre!("DOF {dof} is not part of the reduced mesh"))
        };
        let values = match (&self.structure, &tensor) {
            (Tensor::Matrix(structure), Tensor::Matrix(matrix)) => locations
                .iter()
                .map(|&location| {
                    let (row, col) = csr_entry_row_col(structure, location);
                    let (row, col) = (reduced(row)?, reduced(col)?);
                    // Entries missing from the reduced pattern are structural zeros
                    Ok(csr_entry_index(matrix, row, col)
                        .map_or(0.0, |index| matrix.values()[index]))
                })
                .collect::<eyre::Result<Vec<_>>>()?,
            (Tensor::Vector(_), Tensor::Vector(vector)) => locations
                .iter()
                .map(|&location| Ok(vector[reduced(location)?]))
                .collect::<eyre::Result<Vec<_>>>()?,
            _ => unreachable!("Assembly of a form always yields the same kind of tensor"),
        };
        Ok(DVector::from_vec(values))
    }

    fn to_tensor(&self, values: &DVector<f64>) -> eyre::Result<Tensor> {
        match &self.structure {
            Tensor::Matrix(structure) => {
                let matrix = CsrMatrix::try_from_pattern_and_values(
                    structure.pattern().clone(),
                    values.as_slice().to_vec(),
                )
                .map_err(|err| {
                    eyre!("Basis values do not match the sparsity pattern of the form: {err}")
                })?;
                Ok(Tensor::Matrix(matrix))
            }
            Tensor::Vector(_) => Ok(Tensor::Vector(values.clone())),
        }
    }
}
