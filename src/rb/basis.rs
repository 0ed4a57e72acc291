use crate::online_size::OnlineSize;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ComponentBasis {
    name: String,
    functions: Vec<DVector<f64>>,
}

/// Full-order basis functions, grouped by named component.
///
/// Columns are ordered component by component. Slicing by an [`OnlineSize`] keeps the first
/// `n[c]` functions of every component `c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisFunctionsMatrix {
    dim: usize,
    components: Vec<ComponentBasis>,
}

impl BasisFunctionsMatrix {
    pub fn new<S: AsRef<str>>(dim: usize, components: &[S]) -> Self {
        Self {
            dim,
            components: components
                .iter()
                .map(|name| ComponentBasis {
                    name: name.as_ref().to_string(),
                    functions: Vec::new(),
                })
                .collect(),
        }
    }

    /// Dimension of the full-order space.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }

    fn component_basis(&self, component: &str) -> &ComponentBasis {
        self.components
            .iter()
            .find(|c| c.name == component)
            .unwrap_or_else(|| panic!("Basis has no component named {component}"))
    }

    pub fn enrich(&mut self, component: &str, function: DVector<f64>) {
        assert_eq!(function.len(), self.dim, "Basis function has the wrong dimension");
        let basis = self
            .components
            .iter_mut()
            .find(|c| c.name == component)
            .unwrap_or_else(|| panic!("Basis has no component named {component}"));
        basis.functions.push(function);
    }

    pub fn component(&self, component: &str) -> &[DVector<f64>] {
        &self.component_basis(component).functions
    }

    /// Total number of basis functions.
    pub fn len(&self) -> usize {
        self.components.iter().map(|c| c.functions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of available basis functions per component.
    pub fn online_size(&self) -> OnlineSize {
        OnlineSize::generate(&self.component_names(), |c| self.component(c).len())
    }

    fn assert_within(&self, n: &OnlineSize) {
        for basis in &self.components {
            let requested = n
                .get(&basis.name)
                .unwrap_or_else(|| panic!("Online size does not specify component {}", basis.name));
            assert!(
                requested <= basis.functions.len(),
                "Requested {requested} basis functions for component {}, but only {} are available",
                basis.name,
                basis.functions.len()
            );
        }
    }

    /// Indices, among all columns, of the columns selected by `n`.
    pub fn column_indices(&self, n: &OnlineSize) -> Vec<usize> {
        self.assert_within(n);
        let mut indices = Vec::with_capacity(n.total());
        let mut offset = 0;
        for basis in &self.components {
            let n_c = n.get(&basis.name).unwrap_or(0);
            indices.extend(offset..offset + n_c);
            offset += basis.functions.len();
        }
        indices
    }

    pub fn columns(&self, n: &OnlineSize) -> Vec<&DVector<f64>> {
        self.assert_within(n);
        self.components
            .iter()
            .flat_map(|basis| basis.functions.iter().take(n.get(&basis.name).unwrap_or(0)))
            .collect()
    }

    /// The dense `dim x n.total()` matrix of the selected columns.
    pub fn matrix(&self, n: &OnlineSize) -> DMatrix<f64> {
        let columns = self.columns(n);
        let mut matrix = DMatrix::zeros(self.dim, columns.len());
        for (j, column) in columns.into_iter().enumerate() {
            matrix.set_column(j, column);
        }
        matrix
    }

    /// All columns as a dense matrix.
    pub fn full_matrix(&self) -> DMatrix<f64> {
        self.matrix(&self.online_size())
    }

    /// The basis with only the given rows of every function.
    pub fn restrict_rows(&self, rows: &[usize]) -> Self {
        Self {
            dim: rows.len(),
            components: self
                .components
                .iter()
                .map(|basis| ComponentBasis {
                    name: basis.name.clone(),
                    functions: basis
                        .functions
                        .iter()
                        .map(|f| DVector::from_iterator(rows.len(), rows.iter().map(|&r| f[r])))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn clear(&mut self) {
        for basis in &mut self.components {
            basis.functions.clear();
        }
    }
}
