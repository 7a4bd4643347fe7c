//! Throwaway backend for pipeline and server tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, HOST, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::config::BackendConfig;

/// A backend bound to an ephemeral local port that counts the requests it sees.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Routes:
    /// - `/moved`: `301` to `/elsewhere`
    /// - `/slow`: `200` after three seconds
    /// - `/reserved`: the non-standard status `750`
    /// - anything else: `200`, body `backend:{path}`, with its own CORS origin
    ///   and echoes of `Host` and `X-Forwarded-For`
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .fallback(handle)
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            timeout_secs: 5,
        }
    }
}

/// Config pointing at a local port nothing listens on.
pub async fn closed_backend() -> BackendConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    BackendConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_secs: 5,
    }
}

async fn handle(State(hits): State<Arc<AtomicUsize>>, request: Request) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);

    if request.uri().path() == "/moved" {
        return (StatusCode::MOVED_PERMANENTLY, [(LOCATION, "/elsewhere")]).into_response();
    }
    if request.uri().path() == "/slow" {
        tokio::time::sleep(Duration::from_secs(3)).await;
        return (StatusCode::OK, "late").into_response();
    }
    if request.uri().path() == "/reserved" {
        let status = StatusCode::from_u16(750).unwrap();
        return (status, "reserved").into_response();
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = format!("backend:{}", request.uri().path());

    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), "https://origin.example".to_string()),
            ("x-seen-host", host),
            ("x-seen-forwarded-for", forwarded_for),
        ],
        body,
    )
        .into_response()
}
