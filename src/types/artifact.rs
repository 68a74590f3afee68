//! Model artifact record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Serialized classifier format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    /// HDF5 (Keras) weights file
    H5,
    /// TensorFlow.js layers-model topology JSON
    TfjsJson,
    Unknown,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::H5 => "h5",
            ModelFormat::TfjsJson => "tfjs-json",
            ModelFormat::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A candidate model file as examined by the validator.
///
/// Immutable once built; a new load replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub format: ModelFormat,
    pub size_bytes: u64,
    pub signature_valid: bool,
}

impl ModelArtifact {
    /// File name for display, falling back to the full path
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
