//! Doctor command for system diagnostics
//!
//! Health checks for everything the bridge depends on: model file, server,
//! runtime modules, memory and the runtime directory.

use crate::config::Config;
use crate::diagnostics::environment::{collect_environment, EnvironmentReport};
use crate::locator::ModelLocator;
use crate::server::{HttpInferenceServer, InferenceServer};
use crate::validation::ModelValidator;
use colored::Colorize;
use std::path::Path;
use sysinfo::System;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: Config,
    locator: ModelLocator,
    server: HttpInferenceServer,
}

impl Doctor {
    pub fn new(config: Config) -> Self {
        let locator = ModelLocator::from_config(&config);
        let server = HttpInferenceServer::from_config(&config);
        Self {
            config,
            locator,
            server,
        }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let located = self.locator.locate();

        vec![
            self.check_model_found(located.as_deref()),
            self.check_model_valid(located.as_deref()),
            self.check_server().await,
            self.check_environment().await,
            self.check_memory(),
            self.check_runtime_dir(),
        ]
    }

    /// Check 1: model discoverable
    fn check_model_found(&self, located: Option<&Path>) -> HealthCheck {
        match located {
            Some(_) => HealthCheck::new("Model File", HealthStatus::Pass),
            None => HealthCheck::new(
                "Model File",
                HealthStatus::Warn(format!(
                    "model.h5 not found in {} locations",
                    self.locator.candidates().len()
                )),
            ),
        }
    }

    /// Check 2: model passes validation
    fn check_model_valid(&self, located: Option<&Path>) -> HealthCheck {
        let Some(path) = located else {
            return HealthCheck::new("Model Format", HealthStatus::Warn("no model to check".to_string()));
        };

        match ModelValidator::new().validate(path).message() {
            None => HealthCheck::new("Model Format", HealthStatus::Pass),
            Some(problem) => HealthCheck::new(
                "Model Format",
                HealthStatus::Fail(format!("{}: {}", path.display(), problem)),
            ),
        }
    }

    /// Check 3: inference server reachable
    async fn check_server(&self) -> HealthCheck {
        if self.server.is_alive().await {
            HealthCheck::new("Inference Server", HealthStatus::Pass)
        } else {
            HealthCheck::new(
                "Inference Server",
                HealthStatus::Warn(format!(
                    "not reachable at {} (predictions will be simulated)",
                    self.server.endpoint()
                )),
            )
        }
    }

    /// Check 4: runtime modules
    async fn check_environment(&self) -> HealthCheck {
        let report = collect_environment(
            &self.server,
            &self.config.server.python,
            self.config.server.environment_timeout(),
        )
        .await;

        match report {
            EnvironmentReport::Available { info, .. } => {
                let missing = info.missing_modules();
                if missing.is_empty() {
                    HealthCheck::new("Runtime Modules", HealthStatus::Pass)
                } else {
                    HealthCheck::new(
                        "Runtime Modules",
                        HealthStatus::Warn(format!("missing: {}", missing.join(", "))),
                    )
                }
            }
            EnvironmentReport::Unavailable { reason } => {
                HealthCheck::new("Runtime Modules", HealthStatus::Warn(reason))
            }
        }
    }

    /// Check 5: memory availability
    fn check_memory(&self) -> HealthCheck {
        let mut sys = System::new();
        sys.refresh_memory();

        let available_gb = sys.available_memory() / (1024 * 1024 * 1024);

        if available_gb < 1 {
            HealthCheck::new(
                "Memory",
                HealthStatus::Fail(format!("Less than 1GB RAM available ({} GB)", available_gb)),
            )
        } else if available_gb < 2 {
            HealthCheck::new(
                "Memory",
                HealthStatus::Warn(format!("Low memory ({} GB available)", available_gb)),
            )
        } else {
            HealthCheck::new("Memory", HealthStatus::Pass)
        }
    }

    /// Check 6: runtime directory writable
    fn check_runtime_dir(&self) -> HealthCheck {
        let dir = self.config.runtime_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            return HealthCheck::new(
                "Runtime Directory",
                HealthStatus::Fail(format!("cannot create {}: {}", dir.display(), e)),
            );
        }

        let probe = dir.join(".cellscope_write_test");
        match std::fs::write(&probe, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                HealthCheck::new("Runtime Directory", HealthStatus::Pass)
            }
            Err(_) => HealthCheck::new(
                "Runtime Directory",
                HealthStatus::Fail(format!("no write permission in {}", dir.display())),
            ),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "CellScope System Diagnostics".bold());
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(60));

        for check in checks {
            let status = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("{} {}", "WARN:".yellow(), msg),
                HealthStatus::Fail(msg) => format!("{} {}", "FAIL:".red(), msg),
            };
            println!("{:<20} {}", check.name, status);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}
