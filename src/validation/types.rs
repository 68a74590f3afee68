//! Validation report types

use crate::types::{ModelArtifact, ModelFormat};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// Reason a candidate file was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("invalid H5 signature")]
    InvalidSignature,

    #[error("file too small")]
    TooSmall { size_bytes: u64, minimum: u64 },

    #[error("not a valid model JSON")]
    NotModelJson,

    #[error("unsupported model format")]
    UnsupportedFormat,

    /// Underlying filesystem message (not found, permission denied, ...)
    #[error("{0}")]
    Io(String),
}

impl Serialize for ValidationIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result of examining one candidate path.
///
/// Validation never fails as a Rust error; every problem lands in `error`
/// so callers can show it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub path: PathBuf,
    pub format: ModelFormat,
    pub size_bytes: u64,
    /// True when the format-specific signature check matched
    pub signature_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationIssue>,
}

impl ValidationReport {
    pub(crate) fn rejected(path: PathBuf, format: ModelFormat, size_bytes: u64, issue: ValidationIssue) -> Self {
        Self {
            path,
            format,
            size_bytes,
            signature_valid: false,
            error: Some(issue),
        }
    }

    /// True when no check failed
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Error message, if any
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Data-model record for this path
    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact {
            path: self.path.clone(),
            format: self.format,
            size_bytes: self.size_bytes,
            signature_valid: self.signature_valid,
        }
    }
}
