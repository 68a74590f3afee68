//! Inference server HTTP client
//!
//! Talks to the local model server over loopback:
//! - `GET /health`
//! - `POST /load_model`
//! - `POST /predict`
//! - `GET /environment`

use crate::config::{Config, ServerConfig};
use crate::diagnostics::EnvironmentInfo;
use crate::errors::{BridgeError, Result};
use crate::server::wire::{self, LoadModelRequest, PredictRequest};
use crate::types::PredictionResult;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Operations the bridge needs from an inference server
#[async_trait]
pub trait InferenceServer: Send + Sync {
    /// Cheap liveness probe; any failure is `false`
    async fn is_alive(&self) -> bool;

    /// Ask the server to load the model at `model_path`
    async fn load_model(&self, model_path: &Path) -> Result<()>;

    /// Classify one image (data URL or base64)
    async fn predict(&self, image: &str) -> Result<PredictionResult>;

    /// Runtime introspection
    async fn environment(&self) -> Result<EnvironmentInfo>;

    /// Base URL for logs and diagnostics
    fn endpoint(&self) -> String;
}

/// Per-call timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    pub probe: Duration,
    pub load: Duration,
    pub analyze: Duration,
    pub environment: Duration,
}

impl From<&ServerConfig> for ServerTimeouts {
    fn from(server: &ServerConfig) -> Self {
        Self {
            probe: server.probe_timeout(),
            load: server.load_timeout(),
            analyze: server.analyze_timeout(),
            environment: server.environment_timeout(),
        }
    }
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// reqwest-backed server client
#[derive(Debug, Clone)]
pub struct HttpInferenceServer {
    client: Client,
    base_url: String,
    timeouts: ServerTimeouts,
}

impl HttpInferenceServer {
    pub fn new(base_url: &str, timeouts: ServerTimeouts) -> Self {
        let client = Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server_url(), ServerTimeouts::from(&config.server))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> ServerTimeouts {
        self.timeouts
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Transport failures mean the server is not there
fn unavailable(err: reqwest::Error, timeout: Duration) -> BridgeError {
    if err.is_timeout() {
        BridgeError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        BridgeError::ServerUnavailable(err.to_string())
    }
}

/// Read a body as JSON, tolerating empty or non-JSON bodies
async fn json_body(response: Response) -> Value {
    response.json::<Value>().await.unwrap_or(Value::Null)
}

#[async_trait]
impl InferenceServer for HttpInferenceServer {
    async fn is_alive(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(self.timeouts.probe)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "health probe failed");
                false
            }
        }
    }

    async fn load_model(&self, model_path: &Path) -> Result<()> {
        let request = LoadModelRequest {
            model_path: model_path.display().to_string(),
        };

        let response = self
            .client
            .post(self.url("/load_model"))
            .timeout(self.timeouts.load)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(e, self.timeouts.load))?;

        let status = response.status();
        let body = json_body(response).await;

        if !status.is_success() {
            let message = wire::error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            return Err(BridgeError::ServerRejectedModel(message));
        }

        wire::interpret_load_response(&body)
    }

    async fn predict(&self, image: &str) -> Result<PredictionResult> {
        let request = PredictRequest {
            image: image.to_string(),
        };

        let response = self
            .client
            .post(self.url("/predict"))
            .timeout(self.timeouts.analyze)
            .json(&request)
            .send()
            .await
            .map_err(|e| BridgeError::TransientAnalysis(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = json_body(response).await;

        if !status.is_success() {
            let message = wire::error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            return Err(BridgeError::TransientAnalysis(message));
        }

        wire::parse_prediction(&body)
    }

    async fn environment(&self) -> Result<EnvironmentInfo> {
        let response = self
            .client
            .get(self.url("/environment"))
            .timeout(self.timeouts.environment)
            .send()
            .await
            .map_err(|e| unavailable(e, self.timeouts.environment))?;

        if !response.status().is_success() {
            return Err(BridgeError::ServerUnavailable(format!(
                "environment endpoint returned HTTP {}",
                response.status()
            )));
        }

        Ok(response.json::<EnvironmentInfo>().await?)
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let server = HttpInferenceServer::new("http://127.0.0.1:5000/", ServerTimeouts::default());
        assert_eq!(server.base_url(), "http://127.0.0.1:5000");
        assert_eq!(server.url("/health"), "http://127.0.0.1:5000/health");
    }

    #[test]
    fn test_timeouts_from_config() {
        let mut config = Config::default();
        config.server.probe_timeout_ms = 750;
        config.server.analyze_timeout_secs = 9;

        let timeouts = ServerTimeouts::from(&config.server);
        assert_eq!(timeouts.probe, Duration::from_millis(750));
        assert_eq!(timeouts.analyze, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_probe_against_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = HttpInferenceServer::new(&format!("http://127.0.0.1:{}", port), ServerTimeouts::default());
        assert!(!server.is_alive().await);

        let err = server.load_model(Path::new("/tmp/model.h5")).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
