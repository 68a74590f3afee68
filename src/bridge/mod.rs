//! Inference bridge
//!
//! Session state machine, simulated predictions and the bridge that ties
//! locator, validator and server together.

pub mod fallback;
pub mod inference;
pub mod session;

pub use fallback::{FallbackPredictor, SIMULATED_CONFIDENCE};
pub use inference::{InferenceBridge, LoadOutcome};
pub use session::{InferenceSession, SessionEvent, SessionStatus};
