//! Inference server supervision
//!
//! Keeps at most one server process per bridge: probe first, spawn only when
//! the probe fails and auto-start is enabled, then poll for readiness within
//! a bounded startup window.

use crate::config::Config;
use crate::server::client::InferenceServer;
use crate::server::process::{LaunchSpec, ServerProcess};
use crate::server::script::install_bundled_script;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Readiness polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Supervision settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub auto_start: bool,
    pub launch: LaunchSpec,
    /// File that must exist before spawning (the server script)
    pub required_file: Option<PathBuf>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    /// Bundled script installed at `required_file` before the first spawn
    pub bundled_script: Option<PathBuf>,
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        let launch = LaunchSpec::python_server(config);
        Self {
            auto_start: config.server.auto_start,
            required_file: launch.script(),
            launch,
            startup_timeout: config.server.startup_timeout(),
            poll_interval: POLL_INTERVAL,
            bundled_script: config.paths.bundled_script.as_deref().map(Config::expand_path),
        }
    }

    /// Never spawn; only talk to a server that is already running
    pub fn attach_only() -> Self {
        Self {
            auto_start: false,
            launch: LaunchSpec::new("python3", &[]),
            required_file: None,
            startup_timeout: Duration::from_secs(1),
            poll_interval: POLL_INTERVAL,
            bundled_script: None,
        }
    }
}

/// Owns the singleton server process
pub struct ServerSupervisor {
    server: Arc<dyn InferenceServer>,
    config: SupervisorConfig,
    process: Mutex<Option<ServerProcess>>,
    spawn_count: AtomicU32,
}

impl ServerSupervisor {
    pub fn new(server: Arc<dyn InferenceServer>, config: SupervisorConfig) -> Self {
        Self {
            server,
            config,
            process: Mutex::new(None),
            spawn_count: AtomicU32::new(0),
        }
    }

    pub fn server(&self) -> &Arc<dyn InferenceServer> {
        &self.server
    }

    /// Liveness probe
    pub async fn is_running(&self) -> bool {
        self.server.is_alive().await
    }

    /// Make sure a server answers the liveness probe, spawning one if
    /// allowed. Returns `false` when no server could be reached in time.
    pub async fn ensure_running(&self) -> bool {
        if self.server.is_alive().await {
            return true;
        }
        if !self.config.auto_start {
            tracing::info!(endpoint = %self.server.endpoint(), "inference server not running, auto-start disabled");
            return false;
        }

        {
            let mut guard = self.process.lock().await;
            let needs_spawn = match guard.as_mut() {
                Some(process) => !process.is_running(),
                None => true,
            };

            if needs_spawn {
                if let (Some(bundled), Some(target)) = (&self.config.bundled_script, &self.config.required_file) {
                    install_bundled_script(bundled, target);
                }
                if let Some(required) = &self.config.required_file {
                    if !required.is_file() {
                        tracing::warn!(script = %required.display(), "server script not found, not spawning");
                        return false;
                    }
                }

                match ServerProcess::spawn(&self.config.launch) {
                    Ok(process) => {
                        self.spawn_count.fetch_add(1, Ordering::Relaxed);
                        *guard = Some(process);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "could not start inference server");
                        return false;
                    }
                }
            }
        }

        self.wait_until_ready().await
    }

    async fn wait_until_ready(&self) -> bool {
        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.server.is_alive().await {
                tracing::info!(endpoint = %self.server.endpoint(), "inference server ready");
                return true;
            }

            let exited = match self.process.lock().await.as_mut() {
                Some(process) => !process.is_running(),
                None => true,
            };
            if exited {
                tracing::warn!("inference server exited during startup");
                return false;
            }

            if Instant::now() >= deadline {
                tracing::warn!(timeout = ?self.config.startup_timeout, "inference server did not become ready");
                return false;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Terminate a spawned server. Returns `true` if a termination was
    /// issued by this call.
    pub async fn shutdown(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(process) => match process.terminate().await {
                Ok(issued) => issued,
                Err(e) => {
                    tracing::error!(error = %e, "failed to terminate inference server");
                    false
                }
            },
            None => false,
        }
    }

    /// Number of processes spawned so far
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::Relaxed)
    }

    /// Terminations issued against the current process
    pub async fn terminations(&self) -> u32 {
        self.process
            .lock()
            .await
            .as_ref()
            .map(ServerProcess::terminations)
            .unwrap_or(0)
    }
}
