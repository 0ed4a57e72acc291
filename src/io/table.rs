use crate::collective::Communicator;
use crate::io::Folder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors collected during an error analysis, indexed by reduced dimension and test sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysisTable {
    n: Vec<usize>,
    num_samples: usize,
    columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Column {
    name: String,
    /// `values[i][k]` holds the value for `n[i]` and sample `k`.
    values: Vec<Vec<f64>>,
}

impl ErrorAnalysisTable {
    pub fn new(n: Vec<usize>, num_samples: usize) -> Self {
        Self {
            n,
            num_samples,
            columns: Vec::new(),
        }
    }

    pub fn add_column(&mut self, name: &str) {
        assert!(self.column(name).is_none(), "Duplicate column {name}");
        self.columns.push(Column {
            name: name.to_string(),
            values: vec![vec![0.0; self.num_samples]; self.n.len()],
        });
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn row_index(&self, n: usize) -> usize {
        self.n
            .iter()
            .position(|&n_i| n_i == n)
            .unwrap_or_else(|| panic!("Error analysis table has no row for N = {n}"))
    }

    pub fn set(&mut self, name: &str, n: usize, sample: usize, value: f64) {
        let row = self.row_index(n);
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("Error analysis table has no column {name}"));
        column.values[row][sample] = value;
    }

    pub fn get(&self, name: &str, n: usize, sample: usize) -> f64 {
        let row = self.row_index(n);
        self.column(name)
            .unwrap_or_else(|| panic!("Error analysis table has no column {name}"))
            .values[row][sample]
    }

    pub fn n_values(&self) -> &[usize] {
        &self.n
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Mean of a column over all samples for the given `n`.
    pub fn mean(&self, name: &str, n: usize) -> f64 {
        let row = self.row_index(n);
        let values = &self
            .column(name)
            .unwrap_or_else(|| panic!("Error analysis table has no column {name}"))
            .values[row];
        if values.is_empty() {
            return f64::NAN;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Maximum of a column over all samples for the given `n`.
    pub fn max(&self, name: &str, n: usize) -> f64 {
        let row = self.row_index(n);
        self.column(name)
            .unwrap_or_else(|| panic!("Error analysis table has no column {name}"))
            .values[row]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn save(
        &self,
        folder: &Folder,
        name: &str,
        communicator: &dyn Communicator,
    ) -> eyre::Result<()> {
        folder.save(communicator, name, self)
    }
}

impl fmt::Display for ErrorAnalysisTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}", "N")?;
        for column in &self.columns {
            write!(
                f,
                " {:>16} {:>16}",
                format!("mean({})", column.name),
                format!("max({})", column.name)
            )?;
        }
        writeln!(f)?;
        for &n in &self.n {
            write!(f, "{:>4}", n)?;
            for column in &self.columns {
                write!(
                    f,
                    " {:>16.6e} {:>16.6e}",
                    self.mean(&column.name, n),
                    self.max(&column.name, n)
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
