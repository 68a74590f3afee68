//! Diagnostics
//!
//! Runtime environment introspection and the doctor health checks.

pub mod doctor;
pub mod environment;

pub use doctor::{Doctor, HealthCheck, HealthStatus};
pub use environment::{
    collect_environment, probe_interpreter, EnvironmentInfo, EnvironmentReport, EnvironmentSource,
    ModuleStatus,
};
