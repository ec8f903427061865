//! Local HTTP target for load tests.
//!
//! Routes (any method):
//! - `/ok` → 200 `{"status":"ok"}`
//! - `/delay/:ms` → sleeps `ms` milliseconds, then 200 `{"status":"ok"}`
//! - `/status/:code` → responds with `code`
//! - `/token` → 200 `{"token":"abc123"}`
//! - `/echo` → 200 with the request body echoed back

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Token returned by `/token`.
pub const TOKEN: &str = "abc123";

/// A request as seen by the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct TargetState {
    hits: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<RecordedRequest>>,
}

impl TargetState {
    fn enter(&self, method: &Method, uri: &Uri, body: &Bytes) -> InFlight<'_> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedRequest {
                method: method.to_string(),
                path: uri.path().to_string(),
                body: String::from_utf8_lossy(body).into_owned(),
            });
        }
        InFlight(self)
    }
}

/// Decrements the in-flight gauge when the handler finishes or is dropped.
struct InFlight<'a>(&'a TargetState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

type Shared = State<Arc<TargetState>>;

async fn ok(State(state): Shared, method: Method, uri: Uri, body: Bytes) -> Json<Value> {
    let _guard = state.enter(&method, &uri, &body);
    Json(json!({ "status": "ok" }))
}

async fn delay(
    State(state): Shared,
    Path(ms): Path<u64>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Json<Value> {
    let _guard = state.enter(&method, &uri, &body);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "status": "ok" }))
}

async fn status(
    State(state): Shared,
    Path(code): Path<u16>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, String) {
    let _guard = state.enter(&method, &uri, &body);
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, format!("status {}", code.as_u16()))
}

async fn token(State(state): Shared, method: Method, uri: Uri, body: Bytes) -> Json<Value> {
    let _guard = state.enter(&method, &uri, &body);
    Json(json!({ "token": TOKEN }))
}

async fn echo(State(state): Shared, method: Method, uri: Uri, body: Bytes) -> Bytes {
    let _guard = state.enter(&method, &uri, &body);
    body
}

/// A running target server bound to an ephemeral local port.
///
/// The server task is aborted on drop.
pub struct TargetServer {
    addr: SocketAddr,
    state: Arc<TargetState>,
    handle: JoinHandle<()>,
}

impl TargetServer {
    pub async fn start() -> std::io::Result<Self> {
        let state = Arc::new(TargetState::default());
        let app = Router::new()
            .route("/ok", any(ok))
            .route("/delay/:ms", any(delay))
            .route("/status/:code", any(status))
            .route("/token", any(token))
            .route("/echo", any(echo))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:41234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Total requests received.
    pub fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Highest number of requests handled concurrently.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A base URL on a local port with nothing listening.
pub async fn unused_base_url() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_target_routes() {
        let server = TargetServer::start().await.unwrap();
        let client = reqwest::Client::new();

        let ok = client
            .get(format!("{}/ok", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status().as_u16(), 200);

        let teapot = client
            .post(format!("{}/status/418", server.base_url()))
            .body("brew")
            .send()
            .await
            .unwrap();
        assert_eq!(teapot.status().as_u16(), 418);

        let echo = client
            .post(format!("{}/echo", server.base_url()))
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(echo.text().await.unwrap(), "hello");

        assert_eq!(server.hits(), 3);
        assert_eq!(server.max_in_flight(), 1);

        let requests = server.requests();
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].path, "/status/418");
        assert_eq!(requests[1].body, "brew");
    }

    #[tokio::test]
    async fn test_unused_base_url_refuses() {
        let url = unused_base_url().await.unwrap();
        let result = reqwest::get(format!("{}/ok", url)).await;
        assert!(result.is_err());
    }
}
