//! Model validator implementation
//!
//! - `.h5`: first 8 bytes must start with the HDF5 magic, file ≥ 1000 bytes
//! - `.json`: TensorFlow.js layers model (`format` or `modelTopology`)
//! - anything else: unsupported

use crate::types::{ModelArtifact, ModelFormat};
use crate::validation::types::{ValidationIssue, ValidationReport};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Leading bytes of an HDF5 file (`\x89HDF`)
pub const H5_MAGIC: [u8; 4] = [0x89, b'H', b'D', b'F'];

/// Smallest plausible H5 model
pub const MIN_H5_SIZE_BYTES: u64 = 1000;

/// Number of header bytes read from an H5 candidate
const HEADER_LEN: u64 = 8;

/// Shallow model file validator
#[derive(Debug, Clone)]
pub struct ModelValidator {
    min_h5_size: u64,
}

impl Default for ModelValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelValidator {
    pub fn new() -> Self {
        Self {
            min_h5_size: MIN_H5_SIZE_BYTES,
        }
    }

    /// Validator with a custom minimum H5 size
    pub fn with_min_h5_size(min_h5_size: u64) -> Self {
        Self { min_h5_size }
    }

    /// Classify and sanity-check `path`. Never returns an error; every
    /// failure is recorded in the report.
    pub fn validate(&self, path: &Path) -> ValidationReport {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let report = match extension.as_str() {
            "h5" => self.validate_h5(path),
            "json" => self.validate_json(path),
            _ => {
                let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                ValidationReport::rejected(
                    path.to_path_buf(),
                    ModelFormat::Unknown,
                    size,
                    ValidationIssue::UnsupportedFormat,
                )
            }
        };

        match &report.error {
            None => tracing::debug!(path = %path.display(), format = %report.format, size = report.size_bytes, "model file valid"),
            Some(issue) => tracing::debug!(path = %path.display(), %issue, "model file rejected"),
        }
        report
    }

    /// Validate and return the data-model record
    pub fn inspect(&self, path: &Path) -> ModelArtifact {
        self.validate(path).to_artifact()
    }

    fn validate_h5(&self, path: &Path) -> ValidationReport {
        let size_bytes = match regular_file_size(path) {
            Ok(size) => size,
            Err(issue) => return ValidationReport::rejected(path.to_path_buf(), ModelFormat::Unknown, 0, issue),
        };

        let header = match read_header(path) {
            Ok(header) => header,
            Err(e) => {
                return ValidationReport::rejected(
                    path.to_path_buf(),
                    ModelFormat::Unknown,
                    size_bytes,
                    ValidationIssue::Io(e.to_string()),
                )
            }
        };

        if !header.starts_with(&H5_MAGIC) {
            return ValidationReport::rejected(
                path.to_path_buf(),
                ModelFormat::Unknown,
                size_bytes,
                ValidationIssue::InvalidSignature,
            );
        }

        if size_bytes < self.min_h5_size {
            return ValidationReport {
                path: path.to_path_buf(),
                format: ModelFormat::H5,
                size_bytes,
                signature_valid: true,
                error: Some(ValidationIssue::TooSmall {
                    size_bytes,
                    minimum: self.min_h5_size,
                }),
            };
        }

        ValidationReport {
            path: path.to_path_buf(),
            format: ModelFormat::H5,
            size_bytes,
            signature_valid: true,
            error: None,
        }
    }

    fn validate_json(&self, path: &Path) -> ValidationReport {
        let size_bytes = match regular_file_size(path) {
            Ok(size) => size,
            Err(issue) => return ValidationReport::rejected(path.to_path_buf(), ModelFormat::Unknown, 0, issue),
        };

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                return ValidationReport::rejected(
                    path.to_path_buf(),
                    ModelFormat::Unknown,
                    size_bytes,
                    ValidationIssue::Io(e.to_string()),
                )
            }
        };

        let is_layers_model = serde_json::from_str::<serde_json::Value>(&contents)
            .ok()
            .and_then(|value| value.as_object().cloned())
            .map(|obj| {
                obj.get("format").and_then(|f| f.as_str()) == Some("layers-model")
                    || obj.contains_key("modelTopology")
            })
            .unwrap_or(false);

        if !is_layers_model {
            return ValidationReport::rejected(
                path.to_path_buf(),
                ModelFormat::Unknown,
                size_bytes,
                ValidationIssue::NotModelJson,
            );
        }

        ValidationReport {
            path: path.to_path_buf(),
            format: ModelFormat::TfjsJson,
            size_bytes,
            signature_valid: true,
            error: None,
        }
    }
}

fn regular_file_size(path: &Path) -> Result<u64, ValidationIssue> {
    let metadata = fs::metadata(path).map_err(|e| ValidationIssue::Io(e.to_string()))?;
    if !metadata.is_file() {
        return Err(ValidationIssue::Io(format!("{} is not a regular file", path.display())));
    }
    Ok(metadata.len())
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
    Ok(header)
}
