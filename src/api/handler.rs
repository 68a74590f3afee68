//! Request dispatch
//!
//! Every request resolves to a [`Response`]. Errors become `ok: false`;
//! a panic inside a handler additionally puts the session into `Error`.

use crate::api::request::{image_input, Request, Response};
use crate::bridge::InferenceBridge;
use crate::config::Config;
use crate::errors::Result;
use crate::locator::ModelPicker;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct Api {
    bridge: Arc<InferenceBridge>,
    picker: Arc<dyn ModelPicker + Send + Sync>,
    config: Mutex<Config>,
    /// Where to persist user-chosen model paths; `None` keeps them in memory
    config_path: Option<PathBuf>,
}

impl Api {
    pub fn new(bridge: Arc<InferenceBridge>, picker: Arc<dyn ModelPicker + Send + Sync>) -> Self {
        Self {
            bridge,
            picker,
            config: Mutex::new(Config::default()),
            config_path: None,
        }
    }

    pub fn with_config(mut self, config: Config, config_path: Option<PathBuf>) -> Self {
        self.config = Mutex::new(config);
        self.config_path = config_path;
        self
    }

    pub fn bridge(&self) -> &Arc<InferenceBridge> {
        &self.bridge
    }

    /// Remembered model path in the in-memory config
    pub fn remembered_model(&self) -> Option<PathBuf> {
        self.config.lock().ok().and_then(|c| c.remembered_model())
    }

    /// Parse and dispatch a JSON request
    pub async fn dispatch_json(&self, raw: &str) -> Response {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Response::failure(format!("invalid request: {}", e)),
        }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let method = request.method();
        tracing::debug!(method, "dispatching request");

        match AssertUnwindSafe(self.handle(request)).catch_unwind().await {
            Ok(Ok(data)) => Response::success(data),
            Ok(Err(e)) => {
                tracing::warn!(method, error = %e, "request failed");
                Response::failure(e.to_string())
            }
            Err(payload) => {
                let message = format!("{} failed unexpectedly: {}", method, panic_message(payload.as_ref()));
                self.bridge.record_fault(&message);
                Response::failure(message)
            }
        }
    }

    async fn handle(&self, request: Request) -> Result<Value> {
        let data = match request {
            Request::LocateModel => serde_json::to_value(self.bridge.locator().locate_candidate())?,
            Request::BrowseForModel => serde_json::to_value(self.browse().await)?,
            Request::ValidateModel { path } => serde_json::to_value(self.bridge.validator().validate(&path))?,
            Request::LoadModel { path } => {
                let outcome = self.bridge.load_model(path.clone()).await;
                if let (Some(path), Some(_)) = (&path, outcome.artifact()) {
                    self.remember(path);
                }
                serde_json::to_value(outcome)?
            }
            Request::ReloadModel { path } => {
                let outcome = self.bridge.reload_model(path.clone()).await;
                if outcome.artifact().is_some() {
                    self.remember(&path);
                }
                serde_json::to_value(outcome)?
            }
            Request::IsServerRunning => Value::Bool(self.bridge.is_server_running().await),
            Request::Analyze { image } => serde_json::to_value(self.bridge.analyze(image_input(image)).await)?,
            Request::GetEnvironmentInfo => serde_json::to_value(self.bridge.environment_info().await)?,
            Request::SessionStatus => serde_json::to_value(self.bridge.session())?,
        };
        Ok(data)
    }

    /// Pickers block on user input, so they run off the async workers
    async fn browse(&self) -> Option<PathBuf> {
        let locator = self.bridge.locator().clone();
        let picker = self.picker.clone();

        match tokio::task::spawn_blocking(move || locator.browse(picker.as_ref())).await {
            Ok(picked) => picked,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::warn!(error = %e, "file picker cancelled");
                None
            }
        }
    }

    /// Persist a user-supplied model path so the locator finds it first next time
    fn remember(&self, path: &Path) {
        let Ok(mut config) = self.config.lock() else {
            return;
        };
        config.remember_model(path);

        if let Some(config_path) = &self.config_path {
            match config.save(config_path) {
                Ok(()) => tracing::debug!(path = %path.display(), "model path remembered"),
                Err(e) => tracing::warn!(error = %e, "could not save remembered model path"),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SessionStatus;
    use crate::locator::{FileFilter, ModelLocator, SearchRoots};
    use crate::server::{HttpInferenceServer, ServerSupervisor, ServerTimeouts, SupervisorConfig};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct PanickingPicker;

    impl ModelPicker for PanickingPicker {
        fn pick_file(&self, _title: &str, _filters: &[FileFilter]) -> Option<PathBuf> {
            panic!("dialog crashed");
        }

        fn confirm(&self, _message: &str) -> bool {
            false
        }
    }

    struct FixedPicker(PathBuf);

    impl ModelPicker for FixedPicker {
        fn pick_file(&self, _title: &str, _filters: &[FileFilter]) -> Option<PathBuf> {
            Some(self.0.clone())
        }

        fn confirm(&self, _message: &str) -> bool {
            false
        }
    }

    fn closed_port_bridge() -> Arc<InferenceBridge> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let timeouts = ServerTimeouts {
            probe: Duration::from_millis(500),
            ..ServerTimeouts::default()
        };
        let server = Arc::new(HttpInferenceServer::new(&format!("http://127.0.0.1:{}", port), timeouts));
        let supervisor = ServerSupervisor::new(server, SupervisorConfig::attach_only());
        Arc::new(InferenceBridge::new(ModelLocator::new(SearchRoots::default()), supervisor))
    }

    fn write_model(dir: &Path) -> PathBuf {
        let path = dir.join("model.h5");
        let mut bytes = vec![0u8; 50_000];
        bytes[..4].copy_from_slice(&[0x89, b'H', b'D', b'F']);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_panicking_handler_sets_error_state() {
        let bridge = closed_port_bridge();
        let api = Api::new(bridge.clone(), Arc::new(PanickingPicker));

        let response = api.dispatch(Request::BrowseForModel).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("dialog crashed"));
        assert_eq!(bridge.session().status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_browse_returns_valid_pick() {
        let dir = TempDir::new().unwrap();
        let model = write_model(dir.path());
        let api = Api::new(closed_port_bridge(), Arc::new(FixedPicker(model.clone())));

        let response = api.dispatch(Request::BrowseForModel).await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap(), json!(model.display().to_string()));
    }

    #[tokio::test]
    async fn test_load_remembers_user_path() {
        let dir = TempDir::new().unwrap();
        let model = write_model(dir.path());
        let config_path = dir.path().join("config.toml");
        let api = Api::new(closed_port_bridge(), Arc::new(PanickingPicker))
            .with_config(Config::default(), Some(config_path.clone()));

        let response = api
            .dispatch(Request::LoadModel {
                path: Some(model.clone()),
            })
            .await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["outcome"], "fallback");
        assert_eq!(api.remembered_model(), Some(model.clone()));

        let saved = Config::load_from_file(&config_path).unwrap();
        assert_eq!(saved.remembered_model(), Some(model));
    }

    #[tokio::test]
    async fn test_invalid_model_is_not_remembered() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.h5");
        std::fs::write(&model, b"not hdf5").unwrap();
        let api = Api::new(closed_port_bridge(), Arc::new(PanickingPicker));

        let response = api.dispatch(Request::LoadModel { path: Some(model) }).await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["outcome"], "error");
        assert!(api.remembered_model().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_json() {
        let api = Api::new(closed_port_bridge(), Arc::new(PanickingPicker));

        let response = api
            .dispatch_json(r#"{"method": "analyze", "params": {"image": "aGVsbG8="}}"#)
            .await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["simulated"], true);

        let response = api.dispatch_json(r#"{"method": "sessionStatus"}"#).await;
        assert!(response.ok);

        let response = api.dispatch_json("{not json").await;
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("invalid request"));
    }

    #[tokio::test]
    async fn test_server_probe_and_status() {
        let api = Api::new(closed_port_bridge(), Arc::new(PanickingPicker));

        let response = api.dispatch(Request::IsServerRunning).await;
        assert_eq!(response.data, Some(json!(false)));

        let response = api.dispatch(Request::SessionStatus).await;
        assert_eq!(response.data.unwrap()["status"], "unloaded");
    }
}
