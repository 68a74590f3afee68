//! Model file validation
//!
//! Shallow format checks that fail fast with a readable message before a
//! model path is handed to the inference server.

pub mod types;
pub mod validator;

pub use types::{ValidationIssue, ValidationReport};
pub use validator::{ModelValidator, H5_MAGIC, MIN_H5_SIZE_BYTES};
