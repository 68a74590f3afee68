//! Shared fixtures: model files on disk and a loopback stand-in for the
//! Python inference server.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::TcpListener as StdListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const HDF5_HEADER: [u8; 8] = [0x89, b'H', b'D', b'F', 0x0d, 0x0a, 0x1a, 0x0a];

/// Write an H5 file with a valid signature padded to `size` bytes
pub fn write_h5(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = vec![0u8; size.max(HDF5_HEADER.len())];
    bytes[..HDF5_HEADER.len()].copy_from_slice(&HDF5_HEADER);
    bytes.truncate(size);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// URL of a loopback port nothing listens on
pub fn closed_port_url() -> String {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// How the stub answers each endpoint
#[derive(Debug, Clone)]
pub struct StubBehavior {
    pub load_status: u16,
    pub load_body: Value,
    pub predict_status: u16,
    pub predict_body: Value,
    pub environment_body: Value,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            load_status: 200,
            load_body: json!({"success": true, "message": "Model loaded"}),
            predict_status: 200,
            predict_body: json!({"class": "Neutrophil", "confidence": 0.93}),
            environment_body: json!({
                "python_version": "3.10.12",
                "platform": "linux",
                "modules": {
                    "tensorflow": {"installed": true, "version": "2.15.0"},
                    "numpy": {"installed": true, "version": "1.26.4"}
                }
            }),
        }
    }
}

#[derive(Clone)]
struct StubState {
    behavior: Arc<StubBehavior>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubState {
    fn hit(&self, route: impl Into<String>) {
        self.hits.lock().unwrap().push(route.into());
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health(State(state): State<StubState>) -> Json<Value> {
    state.hit("GET /health");
    Json(json!({"status": "ok"}))
}

async fn load_model(State(state): State<StubState>, Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.hit("POST /load_model");
    (status(state.behavior.load_status), Json(state.behavior.load_body.clone()))
}

async fn predict(State(state): State<StubState>, Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.hit("POST /predict");
    (status(state.behavior.predict_status), Json(state.behavior.predict_body.clone()))
}

async fn environment(State(state): State<StubState>) -> Json<Value> {
    state.hit("GET /environment");
    Json(state.behavior.environment_body.clone())
}

async fn not_found(State(state): State<StubState>, method: Method, uri: Uri) -> (StatusCode, Json<Value>) {
    state.hit(format!("{} {}", method, uri.path()));
    (StatusCode::NOT_FOUND, Json(json!({"error": "no such route"})))
}

/// Loopback axum server answering the inference server's routes
pub struct StubServer {
    pub url: String,
    hits: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(behavior: StubBehavior) -> Self {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            behavior: Arc::new(behavior),
            hits: hits.clone(),
        };
        let app = Router::new()
            .route("/health", get(health))
            .route("/load_model", post(load_model))
            .route("/predict", post(predict))
            .route("/environment", get(environment))
            .fallback(not_found)
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { url, hits, task }
    }

    /// `METHOD /path` of every request received so far
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, route: &str) -> usize {
        self.hits().iter().filter(|h| h.as_str() == route).count()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
