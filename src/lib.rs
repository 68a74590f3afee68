//! CellScope - blood cell classification core
//!
//! Finds and validates the trained classifier, supervises the optional
//! local inference server and serves predictions, falling back to clearly
//! flagged simulated results when no working runtime is available.
//!
//! # Architecture
//!
//! - **validation**: model file format, signature and size checks
//! - **locator**: prioritized search for `model.h5` plus interactive browse
//! - **server**: HTTP client, child process and supervisor for the model server
//! - **bridge**: session state machine, load/analyze orchestration, fallback
//! - **api**: typed request/response surface for the UI layer

pub mod errors;
pub mod types;
pub mod config;
pub mod logging;
pub mod telemetry;

pub mod validation;
pub mod locator;
pub mod server;
pub mod bridge;
pub mod api;

pub mod diagnostics;
pub mod cli;

// Re-export commonly used types
pub use errors::{BridgeError, Result};
pub use bridge::{InferenceBridge, InferenceSession, LoadOutcome, SessionStatus};
pub use types::{CellType, ImageInput, ModelArtifact, PredictionResult};
