//! Inference session state machine
//!
//! Transition function T: Status × Event → Result<Status>
//!
//! Valid transitions:
//! ```text
//! 1. Unloaded | Loaded | Fallback | Error | Loading → Loading  (on: BeginLoad)
//! 2. Loading  → Error     (on: ModelNotFound | ValidationFailed)
//! 3. Loading  → Loaded    (on: ServerAccepted)
//! 4. Loading  → Fallback  (on: ServerRejected | ServerUnavailable)
//! 5. Loaded   → Fallback  (on: AnalysisDegraded)
//! 6. *        → Error     (on: Fault)
//! ```

use crate::errors::{BridgeError, Result};
use crate::types::ModelArtifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No model requested yet
    Unloaded,
    /// Locating, validating or handing the model to the server
    Loading,
    /// Server holds the model; predictions are real
    Loaded,
    /// Model valid but no working server; predictions are simulated
    Fallback,
    /// Model missing or invalid, or a handler faulted
    Error,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    BeginLoad,
    ModelNotFound,
    ValidationFailed,
    ServerAccepted,
    ServerRejected,
    ServerUnavailable,
    /// Analyze failed and the server no longer answers probes
    AnalysisDegraded,
    /// Unexpected failure inside a bridge handler
    Fault,
}

impl SessionStatus {
    /// Attempt state transition with validation
    pub fn transition(&self, event: SessionEvent) -> Result<SessionStatus> {
        use SessionEvent::*;
        use SessionStatus::*;

        if event == Fault {
            return Ok(Error);
        }

        let next = match (self, event) {
            (_, BeginLoad) => Loading,

            (Loading, ModelNotFound) => Error,
            (Loading, ValidationFailed) => Error,
            (Loading, ServerAccepted) => Loaded,
            (Loading, ServerRejected) => Fallback,
            (Loading, ServerUnavailable) => Fallback,

            (Loaded, AnalysisDegraded) => Fallback,

            (from, event) => {
                return Err(BridgeError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                })
            }
        };

        Ok(next)
    }

    /// Get all valid events from this state
    pub fn valid_events(&self) -> Vec<SessionEvent> {
        use SessionEvent::*;
        use SessionStatus::*;

        match self {
            Loading => vec![
                BeginLoad,
                ModelNotFound,
                ValidationFailed,
                ServerAccepted,
                ServerRejected,
                ServerUnavailable,
                Fault,
            ],
            Loaded => vec![BeginLoad, AnalysisDegraded, Fault],
            Unloaded | Fallback | Error => vec![BeginLoad, Fault],
        }
    }

    /// Whether predictions in this state come from the server
    pub fn serves_real_predictions(&self) -> bool {
        matches!(self, SessionStatus::Loaded)
    }

    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionStatus::Unloaded => "No model loaded",
            SessionStatus::Loading => "Loading model",
            SessionStatus::Loaded => "Model loaded",
            SessionStatus::Fallback => "Simulated predictions",
            SessionStatus::Error => "Error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// State owned by the bridge and published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSession {
    pub status: SessionStatus,
    pub model_path: Option<PathBuf>,
    pub server_running: bool,
    pub last_error: Option<String>,
    pub artifact: Option<ModelArtifact>,
}

impl InferenceSession {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Unloaded,
            model_path: None,
            server_running: false,
            last_error: None,
            artifact: None,
        }
    }

    /// `Loaded` requires a model path whose artifact passed its signature check
    pub fn is_consistent(&self) -> bool {
        match self.status {
            SessionStatus::Loaded => {
                self.model_path.is_some()
                    && self.artifact.as_ref().map(|a| a.signature_valid).unwrap_or(false)
            }
            _ => true,
        }
    }
}

impl Default for InferenceSession {
    fn default() -> Self {
        Self::new()
    }
}
