//! Out-of-process inference server
//!
//! HTTP client, wire format, child process lifecycle and supervision for
//! the local model server.

pub mod client;
pub mod process;
pub mod script;
pub mod supervisor;
pub mod wire;

// Re-export commonly used types
pub use client::{HttpInferenceServer, InferenceServer, ServerTimeouts};
pub use process::{LaunchSpec, ServerProcess};
pub use script::install_bundled_script;
pub use supervisor::{ServerSupervisor, SupervisorConfig};
