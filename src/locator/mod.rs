//! Model discovery
//!
//! Searches a fixed, prioritized list of directories for the model file and
//! offers an interactive browse fallback.

pub mod picker;
pub mod search;

pub use picker::{FileFilter, ModelPicker, TerminalPicker};
pub use search::{Candidate, CandidateSource, ModelLocator, SearchRoots, MODEL_FILE_NAME};
