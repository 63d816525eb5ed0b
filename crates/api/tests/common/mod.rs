#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, Response};
use axum::Router;
use docconv_api::config::{ConversionConfig, LogFormat, ServerConfig};
use docconv_api::router::build_app_router;
use docconv_api::state::AppState;
use docconv_api::ws::{JobEvent, ObserverId, ObserverRegistry, ObserverSink, SinkError};
use docconv_core::converter::{ConversionOutcome, DocumentConverter};
use docconv_db::{JobStore, MemoryJobStore};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};
use tower::ServiceExt;

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ODT: &str = "application/vnd.oasis.opendocument.text";

const BOUNDARY: &str = "docconv-test-boundary";

/// Build a test `ServerConfig` rooted at `temp_dir`.
pub fn test_config(temp_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        ws_heartbeat_interval_secs: 30,
        database_url: None,
        log_format: LogFormat::Text,
        conversion: ConversionConfig {
            temp_dir: temp_dir.to_path_buf(),
            converter_bin: PathBuf::from("libreoffice"),
            converter_timeout_secs: 5,
            cleanup_interval_secs: 3600,
            retention_period_secs: 86_400,
        },
    }
}

// ---------------------------------------------------------------------------
// Fake converter
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Behaviour {
    Succeed,
    Fail(String),
    NoArtifact,
    LinkedArtifact(PathBuf),
}

/// Stand-in for the external converter.
#[derive(Clone)]
pub struct FakeConverter {
    behaviour: Behaviour,
    gate: Option<Arc<Notify>>,
}

impl FakeConverter {
    /// Writes `<stem>.html` into the output directory.
    pub fn succeeding() -> Self {
        Self {
            behaviour: Behaviour::Succeed,
            gate: None,
        }
    }

    pub fn failing(diagnostic: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail(diagnostic.to_string()),
            gate: None,
        }
    }

    /// Reports success but writes nothing.
    pub fn without_artifact() -> Self {
        Self {
            behaviour: Behaviour::NoArtifact,
            gate: None,
        }
    }

    /// Places the artifact as a symlink to `target` instead of writing it.
    pub fn linking_artifact_to(target: impl Into<PathBuf>) -> Self {
        Self {
            behaviour: Behaviour::LinkedArtifact(target.into()),
            gate: None,
        }
    }

    /// Hold every conversion until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, input: &Path, output_dir: &Path) -> ConversionOutcome {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.behaviour {
            Behaviour::Succeed => {
                let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
                let html = format!("<html><body>{stem}</body></html>");
                tokio::fs::write(output_dir.join(format!("{stem}.html")), html)
                    .await
                    .unwrap();
                ConversionOutcome::Success {
                    output: format!("convert {} -> {stem}.html", input.display()),
                }
            }
            Behaviour::Fail(diagnostic) => ConversionOutcome::Failure {
                diagnostic: diagnostic.clone(),
                output: diagnostic.clone(),
            },
            Behaviour::NoArtifact => ConversionOutcome::Success {
                output: String::new(),
            },
            #[cfg(unix)]
            Behaviour::LinkedArtifact(target) => {
                let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
                tokio::fs::symlink(target, output_dir.join(format!("{stem}.html")))
                    .await
                    .unwrap();
                ConversionOutcome::Success {
                    output: String::new(),
                }
            }
            #[cfg(not(unix))]
            Behaviour::LinkedArtifact(_) => unimplemented!("symlinked artifacts need unix"),
        }
    }
}

// ---------------------------------------------------------------------------
// Observer sinks
// ---------------------------------------------------------------------------

/// Forwards every frame into an unbounded channel.
pub struct ChannelSink(pub mpsc::UnboundedSender<Message>);

#[async_trait]
impl ObserverSink for ChannelSink {
    async fn send(&mut self, message: Message) -> Result<(), SinkError> {
        self.0
            .send(message)
            .map_err(|e| SinkError::from(e.to_string()))
    }
}

/// A sink whose connection is already gone.
pub struct BrokenSink;

#[async_trait]
impl ObserverSink for BrokenSink {
    async fn send(&mut self, _message: Message) -> Result<(), SinkError> {
        Err("connection reset".into())
    }
}

/// Register a channel-backed observer.
pub async fn observe(
    registry: &ObserverRegistry,
) -> (ObserverId, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = registry.register(Box::new(ChannelSink(tx))).await;
    (id, rx)
}

/// Decode a text frame into a job event.
pub fn decode(message: Message) -> JobEvent {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Wait for the next job event on `rx`.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> JobEvent {
    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("observer channel closed");
    decode(message)
}

/// Every event already delivered to `rx`.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        events.push(decode(message));
    }
    events
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub temp: TempDir,
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Wait for every spawned lifecycle run to finish.
    pub async fn settle(&self) {
        self.state.tasks.close();
        tokio::time::timeout(Duration::from_secs(10), self.state.tasks.wait())
            .await
            .expect("lifecycle runs did not finish");
        self.state.tasks.reopen();
    }

    pub fn jobs_root(&self) -> PathBuf {
        self.temp.path().join("jobs")
    }
}

/// Build the full application router with all middleware layers, backed by
/// an in-memory store and `converter`.
pub fn build_test_app(converter: FakeConverter) -> TestApp {
    build_test_app_with_store(Arc::new(MemoryJobStore::new()), converter)
}

pub fn build_test_app_with_store(store: Arc<dyn JobStore>, converter: FakeConverter) -> TestApp {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(&temp.path().join("jobs"));
    let state = AppState::new(config.clone(), store, Arc::new(converter));
    let router = build_app_router(state.clone(), &config);
    TestApp {
        router,
        state,
        temp,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

/// A multipart upload with a single field.
pub fn upload(field: &str, filename: &str, content_type: Option<&str>, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/v1/converts")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
