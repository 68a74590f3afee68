//! Error types for CellScope
//!
//! Every failure that can happen between the caller, the model file on disk
//! and the out-of-process inference server is described here. The bridge
//! recovers all of them into session state; nothing is fatal to the host.

use thiserror::Error;

/// Main error type for the CellScope bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No model file discoverable on the search path
    #[error("Model file not found: {0}")]
    NotFound(String),

    /// Model file exists but failed a signature, size or shape check
    #[error("Model validation failed: {0}")]
    Validation(String),

    /// Inference server not reachable (not running, refused, timed out)
    #[error("Inference server unavailable: {0}")]
    ServerUnavailable(String),

    /// Inference server reachable but could not load the model
    #[error("Inference server rejected model: {0}")]
    ServerRejectedModel(String),

    /// A single analyze call failed on an otherwise healthy session
    #[error("Analysis failed: {0}")]
    TransientAnalysis(String),

    /// State machine transition errors
    #[error("Invalid session transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Child process spawn/kill errors
    #[error("Process error: {0}")]
    Process(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl BridgeError {
    /// Whether this error means "the server is not there" rather than
    /// "the server answered and said no".
    pub fn is_unavailable(&self) -> bool {
        match self {
            BridgeError::ServerUnavailable(_) | BridgeError::Timeout { .. } => true,
            BridgeError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
