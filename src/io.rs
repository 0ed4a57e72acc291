//! Persistence of offline artifacts.
//!
//! Artifacts are stored as JSON files in a directory tree rooted at a [`Folder`]. Only the
//! I/O process of the communicator writes; every process may read.
use crate::collective::Communicator;
use crate::error::RbError;
use eyre::WrapErr;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub mod table;

pub use table::ErrorAnalysisTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    path: PathBuf,
}

impl Folder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> Self {
        Self {
            path: self.path.join(name),
        }
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.json"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifact_path(name).is_file()
    }

    pub fn create(&self, communicator: &dyn Communicator) -> eyre::Result<()> {
        if communicator.is_io_process() {
            fs::create_dir_all(&self.path)
                .wrap_err_with(|| format!("Failed to create folder {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn save<T: Serialize + ?Sized>(
        &self,
        communicator: &dyn Communicator,
        name: &str,
        value: &T,
    ) -> eyre::Result<()> {
        if !communicator.is_io_process() {
            return Ok(());
        }
        self.create(communicator)?;
        let path = self.artifact_path(name);
        let file = File::create(&path)
            .wrap_err_with(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)
            .wrap_err_with(|| format!("Failed to serialize {}", path.display()))?;
        debug!("Saved {}", path.display());
        Ok(())
    }

    /// Loads an artifact.
    ///
    /// Returns [`RbError::MissingArtifact`] if the artifact does not exist.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> eyre::Result<T> {
        let path = self.artifact_path(name);
        if !path.is_file() {
            return Err(RbError::MissingArtifact { path }.into());
        }
        let file =
            File::open(&path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        let value = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("Failed to deserialize {}", path.display()))?;
        debug!("Loaded {}", path.display());
        Ok(value)
    }
}
