//! Error types for recoverable failures in offline and online computations.
//!
//! Violations of structural invariants (mismatched affine expansion lengths, invalid online sizes,
//! recursive solves, ...) are programming errors and panic instead.
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
#[non_exhaustive]
pub enum RbError {
    /// A persisted artifact required by the online phase does not exist.
    MissingArtifact { path: PathBuf },
    /// The interpolation matrix has a (numerically) zero diagonal entry.
    SingularInterpolationMatrix { size: usize, index: usize },
    /// The reduced linear system could not be solved.
    SingularReducedSystem { n: usize },
    /// The iterative solver for a truth system failed.
    LinearSolver(String),
    /// A training or testing set was required, but is empty.
    EmptyParameterSet,
}

impl fmt::Display for RbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArtifact { path } => {
                write!(f, "Missing persisted artifact {}", path.display())
            }
            Self::SingularInterpolationMatrix { size, index } => write!(
                f,
                "Interpolation matrix of size {size} is singular (zero pivot at index {index})"
            ),
            Self::SingularReducedSystem { n } => {
                write!(f, "Reduced system of dimension {n} is singular")
            }
            Self::LinearSolver(msg) => write!(f, "Linear solver failed: {msg}"),
            Self::EmptyParameterSet => write!(f, "Parameter set is empty"),
        }
    }
}

impl std::error::Error for RbError {}
