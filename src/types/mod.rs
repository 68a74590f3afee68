//! Type definitions module
//!
//! Data model shared by the locator, validator, bridge and the operation
//! surface consumed by the presentation layer.

pub mod artifact;
pub mod cell;
pub mod prediction;

// Re-export commonly used types
pub use artifact::{ModelArtifact, ModelFormat};
pub use cell::CellType;
pub use prediction::{BoundingBox, ImageInput, PredictionResult};
