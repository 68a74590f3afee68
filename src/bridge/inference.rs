//! Inference bridge
//!
//! Single writer of the [`InferenceSession`]. Loads go through
//! locate → validate → ensure server → hand over path, and every outcome is
//! reported as a tagged [`LoadOutcome`]. Analyze always resolves: real
//! predictions in `Loaded`, simulated ones everywhere else.

use crate::bridge::fallback::FallbackPredictor;
use crate::bridge::session::{InferenceSession, SessionEvent};
use crate::config::Config;
use crate::diagnostics::{collect_environment, EnvironmentReport};
use crate::errors::{BridgeError, Result};
use crate::locator::{ModelLocator, MODEL_FILE_NAME};
use crate::server::{HttpInferenceServer, InferenceServer, ServerSupervisor, SupervisorConfig};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{ImageInput, ModelArtifact, PredictionResult};
use crate::validation::ModelValidator;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Result of a load request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The server holds the model; analyses are real
    Loaded { artifact: ModelArtifact },
    /// Model is valid but analyses will be simulated
    Fallback { artifact: ModelArtifact, reason: String },
    /// Model missing or invalid
    Error { message: String },
    /// A newer load started before this one finished; its result was dropped
    Superseded { path: Option<PathBuf> },
}

impl LoadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LoadOutcome::Loaded { .. } => "loaded",
            LoadOutcome::Fallback { .. } => "fallback",
            LoadOutcome::Error { .. } => "error",
            LoadOutcome::Superseded { .. } => "superseded",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }

    /// Error or fallback reason
    pub fn message(&self) -> Option<&str> {
        match self {
            LoadOutcome::Fallback { reason, .. } => Some(reason),
            LoadOutcome::Error { message } => Some(message),
            LoadOutcome::Loaded { .. } | LoadOutcome::Superseded { .. } => None,
        }
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        match self {
            LoadOutcome::Loaded { artifact } | LoadOutcome::Fallback { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

/// Owns the session, the server supervisor and the fallback generator
pub struct InferenceBridge {
    locator: ModelLocator,
    validator: ModelValidator,
    supervisor: ServerSupervisor,
    fallback: FallbackPredictor,
    telemetry: TelemetryCollector,
    session: watch::Sender<InferenceSession>,
    /// Bumped by every load; only the latest may write the session
    generation: AtomicU64,
    python: String,
    environment_timeout: Duration,
}

impl InferenceBridge {
    pub fn new(locator: ModelLocator, supervisor: ServerSupervisor) -> Self {
        let (session, _) = watch::channel(InferenceSession::new());
        Self {
            locator,
            validator: ModelValidator::new(),
            supervisor,
            fallback: FallbackPredictor::new(),
            telemetry: TelemetryCollector::new(),
            session,
            generation: AtomicU64::new(0),
            python: "python3".to_string(),
            environment_timeout: Duration::from_secs(5),
        }
    }

    /// Bridge talking HTTP to the configured server
    pub fn from_config(config: &Config) -> Self {
        let server: Arc<dyn InferenceServer> = Arc::new(HttpInferenceServer::from_config(config));
        let supervisor = ServerSupervisor::new(server, SupervisorConfig::from_config(config));

        Self::new(ModelLocator::from_config(config), supervisor)
            .with_runtime(&config.server.python, config.server.environment_timeout())
    }

    pub fn with_validator(mut self, validator: ModelValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPredictor) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Interpreter used for environment introspection when the server is down
    pub fn with_runtime(mut self, python: &str, environment_timeout: Duration) -> Self {
        self.python = python.to_string();
        self.environment_timeout = environment_timeout;
        self
    }

    pub fn locator(&self) -> &ModelLocator {
        &self.locator
    }

    pub fn validator(&self) -> &ModelValidator {
        &self.validator
    }

    pub fn supervisor(&self) -> &ServerSupervisor {
        &self.supervisor
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Snapshot of the current session
    pub fn session(&self) -> InferenceSession {
        self.session.borrow().clone()
    }

    /// Receiver notified on every session change
    pub fn subscribe(&self) -> watch::Receiver<InferenceSession> {
        self.session.subscribe()
    }

    /// Load a model, locating one when no path is given
    pub async fn load_model(&self, requested: Option<PathBuf>) -> LoadOutcome {
        let started = Instant::now();
        let generation = self.begin_load(requested.as_deref());

        let outcome = self.run_load(generation, requested).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(outcome = outcome.label(), duration_ms, "model load finished");
        self.telemetry.record(TelemetryEvent::LoadCompleted {
            outcome: outcome.label().to_string(),
            duration_ms,
            timestamp: Instant::now(),
        });
        if let LoadOutcome::Fallback { reason, .. } = &outcome {
            self.telemetry.record(TelemetryEvent::FallbackEngaged {
                reason: reason.clone(),
                timestamp: Instant::now(),
            });
        }

        outcome
    }

    /// Load the model at `path`, replacing whatever is loaded
    pub async fn reload_model(&self, path: PathBuf) -> LoadOutcome {
        self.load_model(Some(path)).await
    }

    async fn run_load(&self, generation: u64, requested: Option<PathBuf>) -> LoadOutcome {
        let path = match requested {
            Some(path) if !path.exists() => {
                let message = BridgeError::NotFound(path.display().to_string()).to_string();
                return self.conclude(generation, SessionEvent::ModelNotFound, Some(path), None, None, LoadOutcome::Error { message });
            }
            Some(path) => path,
            None => match self.locator.locate() {
                Some(path) => path,
                None => {
                    let message = BridgeError::NotFound(format!(
                        "no {} in {} search locations",
                        MODEL_FILE_NAME,
                        self.locator.candidates().len()
                    ))
                    .to_string();
                    return self.conclude(generation, SessionEvent::ModelNotFound, None, None, None, LoadOutcome::Error { message });
                }
            },
        };

        let report = self.validator.validate(&path);
        if let Some(issue) = &report.error {
            let message = BridgeError::Validation(format!("{}: {}", path.display(), issue)).to_string();
            tracing::warn!(path = %path.display(), %issue, "model rejected by validator");
            return self.conclude(generation, SessionEvent::ValidationFailed, Some(path), None, None, LoadOutcome::Error { message });
        }
        let artifact = report.to_artifact();

        if self.is_superseded(generation) {
            return LoadOutcome::Superseded { path: Some(path) };
        }

        let spawned_before = self.supervisor.spawn_count();
        let running = self.supervisor.ensure_running().await;
        if self.supervisor.spawn_count() > spawned_before {
            self.telemetry.record(TelemetryEvent::ServerSpawned {
                timestamp: Instant::now(),
            });
        }

        if !running {
            let reason = BridgeError::ServerUnavailable(format!(
                "no inference server at {}",
                self.supervisor.server().endpoint()
            ))
            .to_string();
            return self.conclude(
                generation,
                SessionEvent::ServerUnavailable,
                Some(path),
                Some(artifact.clone()),
                Some(false),
                LoadOutcome::Fallback { artifact, reason },
            );
        }

        match self.supervisor.server().load_model(&path).await {
            Ok(()) => self.conclude(
                generation,
                SessionEvent::ServerAccepted,
                Some(path),
                Some(artifact.clone()),
                Some(true),
                LoadOutcome::Loaded { artifact },
            ),
            Err(e) if e.is_unavailable() => self.conclude(
                generation,
                SessionEvent::ServerUnavailable,
                Some(path),
                Some(artifact.clone()),
                Some(false),
                LoadOutcome::Fallback {
                    artifact,
                    reason: e.to_string(),
                },
            ),
            Err(e) => {
                tracing::warn!(error = %e, "inference server could not load model");
                self.conclude(
                    generation,
                    SessionEvent::ServerRejected,
                    Some(path),
                    Some(artifact.clone()),
                    Some(true),
                    LoadOutcome::Fallback {
                        artifact,
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Enter `Loading` and claim the next generation
    fn begin_load(&self, requested: Option<&Path>) -> u64 {
        let mut generation = 0;
        self.session.send_modify(|session| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.advance(session, SessionEvent::BeginLoad);
            session.model_path = requested.map(Path::to_path_buf);
            session.artifact = None;
            session.last_error = None;
        });
        generation
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Write the final load state unless a newer load has started
    fn conclude(
        &self,
        generation: u64,
        event: SessionEvent,
        path: Option<PathBuf>,
        artifact: Option<ModelArtifact>,
        server_running: Option<bool>,
        outcome: LoadOutcome,
    ) -> LoadOutcome {
        let last_error = outcome.message().map(str::to_string);
        let mut applied = false;

        self.session.send_if_modified(|session| {
            // Checked under the channel lock so a concurrent begin_load cannot interleave
            if self.is_superseded(generation) || !self.advance(session, event) {
                return false;
            }
            session.model_path = path.clone();
            session.artifact = artifact;
            session.last_error = last_error;
            if let Some(running) = server_running {
                session.server_running = running;
            }
            applied = true;
            true
        });

        if applied {
            outcome
        } else {
            tracing::info!(generation, "load superseded by a newer request");
            LoadOutcome::Superseded { path }
        }
    }

    fn advance(&self, session: &mut InferenceSession, event: SessionEvent) -> bool {
        match session.status.transition(event) {
            Ok(next) => {
                tracing::debug!(from = %session.status, to = %next, ?event, "session transition");
                self.telemetry.transition(session.status, next);
                session.status = next;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "session event ignored");
                false
            }
        }
    }

    /// Classify an image. Never fails; check `simulated` on the result.
    pub async fn analyze(&self, image: ImageInput) -> PredictionResult {
        let started = Instant::now();
        let status = self.session.borrow().status;

        let result = if status.serves_real_predictions() {
            match self.analyze_remote(&image).await {
                Ok(result) => result,
                Err(e) => {
                    self.handle_analysis_failure(e).await;
                    self.fallback.synthesize()
                }
            }
        } else {
            tracing::debug!(%status, image = %image.describe(), "synthesizing prediction");
            self.fallback.synthesize()
        };

        self.telemetry.record(TelemetryEvent::AnalysisCompleted {
            simulated: result.simulated,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });
        result
    }

    async fn analyze_remote(&self, image: &ImageInput) -> Result<PredictionResult> {
        let payload = image.to_payload().await?;
        let mut result = self.supervisor.server().predict(&payload).await?;
        result.simulated = false;
        Ok(result)
    }

    /// A failed analyze only degrades the session when the server is gone
    async fn handle_analysis_failure(&self, error: BridgeError) {
        let message = error.to_string();

        if self.supervisor.is_running().await {
            tracing::warn!(error = %message, "analysis failed, server still alive");
            self.session.send_modify(|session| session.last_error = Some(message));
            return;
        }

        tracing::warn!(error = %message, "analysis failed and server is gone, switching to simulated predictions");
        let reason = message.clone();
        let degraded = self.session.send_if_modified(|session| {
            if !self.advance(session, SessionEvent::AnalysisDegraded) {
                return false;
            }
            session.server_running = false;
            session.last_error = Some(message);
            true
        });

        if degraded {
            self.telemetry.record(TelemetryEvent::FallbackEngaged {
                reason,
                timestamp: Instant::now(),
            });
        }
    }

    /// Short-timeout liveness probe
    pub async fn is_server_running(&self) -> bool {
        let running = self.supervisor.is_running().await;
        self.session.send_if_modified(|session| {
            let changed = session.server_running != running;
            session.server_running = running;
            changed
        });
        running
    }

    pub async fn environment_info(&self) -> EnvironmentReport {
        collect_environment(self.supervisor.server().as_ref(), &self.python, self.environment_timeout).await
    }

    /// Put the session into `Error` after an unexpected handler failure.
    /// In-flight loads lose their right to write the session.
    pub fn record_fault(&self, message: &str) {
        tracing::error!(error = message, "bridge handler fault");
        self.session.send_modify(|session| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.advance(session, SessionEvent::Fault);
            session.last_error = Some(message.to_string());
        });
    }

    /// Terminate the spawned server, if any. Returns `true` only for the
    /// call that issued the termination.
    pub async fn shutdown(&self) -> bool {
        let issued = self.supervisor.shutdown().await;
        self.telemetry.record(TelemetryEvent::ServerShutdown {
            issued,
            timestamp: Instant::now(),
        });
        if issued {
            tracing::info!("inference server terminated");
            self.session.send_modify(|session| session.server_running = false);
        }
        issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::session::SessionStatus;
    use crate::diagnostics::EnvironmentInfo;
    use crate::locator::SearchRoots;
    use crate::types::CellType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeServer {
        alive: AtomicBool,
        reject_with: Option<String>,
        fail_predict: AtomicBool,
        load_delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeServer {
        fn alive() -> Self {
            let server = Self::default();
            server.alive.store(true, Ordering::SeqCst);
            server
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceServer for FakeServer {
        async fn is_alive(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.alive.load(Ordering::SeqCst)
        }

        async fn load_model(&self, _model_path: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.load_delay).await;
            match &self.reject_with {
                Some(message) => Err(BridgeError::ServerRejectedModel(message.clone())),
                None => Ok(()),
            }
        }

        async fn predict(&self, _image: &str) -> Result<PredictionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_predict.load(Ordering::SeqCst) {
                return Err(BridgeError::TransientAnalysis("connection reset".to_string()));
            }
            Ok(PredictionResult::real(CellType::Lymphocyte, 0.72))
        }

        async fn environment(&self) -> Result<EnvironmentInfo> {
            Err(BridgeError::ServerUnavailable("no environment endpoint".to_string()))
        }

        fn endpoint(&self) -> String {
            "fake://server".to_string()
        }
    }

    fn write_h5(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let mut bytes = vec![0u8; size];
        bytes[..8].copy_from_slice(&[0x89, b'H', b'D', b'F', 0x0d, 0x0a, 0x1a, 0x0a]);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn bridge_with(server: Arc<FakeServer>) -> InferenceBridge {
        let supervisor = ServerSupervisor::new(server, SupervisorConfig::attach_only());
        InferenceBridge::new(ModelLocator::new(SearchRoots::default()), supervisor)
    }

    #[tokio::test]
    async fn test_load_with_live_server() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let bridge = bridge_with(Arc::new(FakeServer::alive()));

        let outcome = bridge.load_model(Some(model.clone())).await;
        assert!(outcome.is_loaded());

        let session = bridge.session();
        assert_eq!(session.status, SessionStatus::Loaded);
        assert_eq!(session.model_path, Some(model));
        assert!(session.server_running);
        assert!(session.is_consistent());

        let result = bridge.analyze(ImageInput::Data("aGVsbG8=".to_string())).await;
        assert!(!result.simulated);
        assert_eq!(result.cell_type, CellType::Lymphocyte);
    }

    #[tokio::test]
    async fn test_invalid_model_never_contacts_server() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 500);
        let server = Arc::new(FakeServer::alive());
        let bridge = bridge_with(server.clone());

        let outcome = bridge.load_model(Some(model)).await;
        match outcome {
            LoadOutcome::Error { message } => assert!(message.contains("file too small")),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(bridge.session().status, SessionStatus::Error);
        assert_eq!(server.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_model_reports_not_found() {
        let bridge = bridge_with(Arc::new(FakeServer::alive()));

        let outcome = bridge.load_model(None).await;
        assert!(outcome.message().unwrap().contains("not found"));
        assert_eq!(bridge.session().status, SessionStatus::Error);

        let outcome = bridge.load_model(Some(PathBuf::from("/nonexistent/model.h5"))).await;
        assert!(outcome.message().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_dead_server_falls_back() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let bridge = bridge_with(Arc::new(FakeServer::default()));

        let outcome = bridge.load_model(Some(model)).await;
        assert!(matches!(outcome, LoadOutcome::Fallback { .. }));
        assert!(!outcome.is_loaded());

        let session = bridge.session();
        assert_eq!(session.status, SessionStatus::Fallback);
        assert!(!session.server_running);
        assert!(session.last_error.unwrap().contains("unavailable"));

        let result = bridge.analyze(ImageInput::Data("aGVsbG8=".to_string())).await;
        assert!(result.simulated);
        assert!((0.85..=0.99).contains(&result.confidence));
    }

    #[tokio::test]
    async fn test_rejected_model_keeps_message() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let server = FakeServer {
            reject_with: Some("No module named 'tensorflow'".to_string()),
            ..FakeServer::alive()
        };
        let bridge = bridge_with(Arc::new(server));

        let outcome = bridge.load_model(Some(model)).await;
        assert!(outcome.message().unwrap().contains("tensorflow"));

        let session = bridge.session();
        assert_eq!(session.status, SessionStatus::Fallback);
        assert!(session.last_error.unwrap().contains("tensorflow"));
    }

    #[tokio::test]
    async fn test_failed_analysis_with_live_server_stays_loaded() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let server = Arc::new(FakeServer::alive());
        let bridge = bridge_with(server.clone());
        bridge.load_model(Some(model)).await;

        server.fail_predict.store(true, Ordering::SeqCst);
        let result = bridge.analyze(ImageInput::Data("aGVsbG8=".to_string())).await;
        assert!(result.simulated);

        let session = bridge.session();
        assert_eq!(session.status, SessionStatus::Loaded);
        assert!(session.last_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_failed_analysis_with_dead_server_degrades() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let server = Arc::new(FakeServer::alive());
        let bridge = bridge_with(server.clone());
        bridge.load_model(Some(model)).await;

        server.fail_predict.store(true, Ordering::SeqCst);
        server.alive.store(false, Ordering::SeqCst);

        let result = bridge.analyze(ImageInput::Data("aGVsbG8=".to_string())).await;
        assert!(result.simulated);
        assert_eq!(bridge.session().status, SessionStatus::Fallback);
        assert_eq!(bridge.telemetry().get_stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_newer_load_supersedes_older() {
        let dir = TempDir::new().unwrap();
        let first = write_h5(dir.path(), "first.h5", 50_000);
        let second = write_h5(dir.path(), "second.h5", 50_000);
        let server = FakeServer {
            load_delay: Duration::from_millis(300),
            ..FakeServer::alive()
        };
        let bridge = Arc::new(bridge_with(Arc::new(server)));

        let racing = bridge.clone();
        let first_load = tokio::spawn(async move { racing.load_model(Some(first)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second_outcome = bridge.load_model(Some(second.clone())).await;

        assert!(matches!(first_load.await.unwrap(), LoadOutcome::Superseded { .. }));
        assert!(second_outcome.is_loaded());
        assert_eq!(bridge.session().model_path, Some(second));
    }

    #[tokio::test]
    async fn test_fault_moves_to_error() {
        let bridge = bridge_with(Arc::new(FakeServer::alive()));
        bridge.record_fault("handler panicked");

        let session = bridge.session();
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.last_error.as_deref(), Some("handler panicked"));
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let dir = TempDir::new().unwrap();
        let model = write_h5(dir.path(), "model.h5", 50_000);
        let bridge = bridge_with(Arc::new(FakeServer::default()));
        let mut rx = bridge.subscribe();

        bridge.load_model(Some(model)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, SessionStatus::Fallback);
    }

    #[tokio::test]
    async fn test_shutdown_without_spawn_is_noop() {
        let bridge = bridge_with(Arc::new(FakeServer::alive()));
        assert!(!bridge.shutdown().await);
        assert_eq!(bridge.telemetry().get_stats().server_terminations, 0);
    }
}
