//! Shared test utilities for rum-telemetry integration tests.
//!
//! Provides an in-process collector recording every intake request, and an
//! event-driven wait helper replacing arbitrary sleeps.

#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Intake path served by [`MockCollector`].
pub const INTAKE_PATH: &str = "/api/v2/rum";

/// One request received by the collector.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct CollectorState {
    status: AtomicU16,
    requests: Mutex<Vec<ReceivedRequest>>,
}

/// HTTP collector answering every intake request with a configurable status.
pub struct MockCollector {
    addr: SocketAddr,
    state: Arc<CollectorState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MockCollector {
    /// Starts a collector on an ephemeral port, answering `202 Accepted`.
    pub async fn start() -> Self {
        let state = Arc::new(CollectorState {
            status: AtomicU16::new(202),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(INTAKE_PATH, post(intake))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock collector");
        let addr = listener.local_addr().expect("Failed to read local address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Mock collector failed");
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Returns the intake URL.
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.addr, INTAKE_PATH)
    }

    /// Changes the status returned for subsequent requests.
    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), self.task).await;
    }
}

async fn intake(
    State(state): State<Arc<CollectorState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.requests.lock().push(ReceivedRequest {
        query: query.unwrap_or_default(),
        headers,
        body: body.to_vec(),
    });
    StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> Result<(), String>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    if condition() {
        Ok(())
    } else {
        Err(format!("condition not met within {timeout:?}"))
    }
}
