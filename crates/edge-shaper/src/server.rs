//! Axum HTTP server: router, listeners, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

/// Every method and path goes through the pipeline; the edge owns no routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind every listen address, serve until a shutdown signal, then drain.
pub async fn run(listen_addresses: &[String], state: AppState) -> anyhow::Result<()> {
    let listeners = bind_all(listen_addresses).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    serve_all(listeners, router(state), shutdown_rx).await?;

    tracing::info!("edge-shaper shut down gracefully");
    Ok(())
}

/// Bind all addresses before serving any, so a bad address aborts startup.
async fn bind_all(listen_addresses: &[String]) -> anyhow::Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(listen_addresses.len());
    for address in listen_addresses {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {address}"))?;
        tracing::info!(address = %address, "edge-shaper listening");
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Serve `app` on each listener until `shutdown` flips to `true`.
async fn serve_all(
    listeners: Vec<TcpListener>,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut servers = JoinSet::new();
    for listener in listeners {
        let app = app.clone();
        let mut shutdown = shutdown.clone();
        servers.spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
        });
    }

    while let Some(joined) = servers.join_next().await {
        joined.context("listener task panicked")??;
    }
    Ok(())
}

async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.pipeline.run(request).await
}

/// Wait for SIGINT (Ctrl+C) or, on unix, SIGTERM from a process supervisor.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorsConfig, RedirectConfig};
    use crate::proxy::forward::Forwarder;
    use crate::shape::cors::CorsInjector;
    use crate::shape::inspect::Inspector;
    use crate::testing::MockBackend;

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_redirects_and_forwards_until_shutdown() {
        let backend = MockBackend::start().await;
        let state = AppState {
            pipeline: Pipeline::new(
                Inspector::new(&RedirectConfig::default()),
                Forwarder::new(&backend.config(), 1024 * 1024).unwrap(),
                CorsInjector::new(&CorsConfig::default()).unwrap(),
            ),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve_all(vec![listener], router(state), shutdown_rx));

        let client = client();

        let redirect = client
            .get(format!("http://{addr}/foo"))
            .header("host", "connect.ilhasoft.mobi")
            .send()
            .await
            .unwrap();
        assert_eq!(redirect.status(), reqwest::StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            redirect.headers()["location"],
            "https://connect.ilhasoft.mobi/foo"
        );
        assert_eq!(redirect.headers()["access-control-allow-origin"], "*");
        assert_eq!(backend.hits(), 0);

        let forwarded = client
            .get(format!("http://{addr}/"))
            .header("host", "other.example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(forwarded.status(), reqwest::StatusCode::OK);
        assert_eq!(forwarded.headers()["access-control-allow-origin"], "*");
        assert_eq!(forwarded.headers()["x-seen-forwarded-for"], "127.0.0.1");
        assert_eq!(forwarded.text().await.unwrap(), "backend:/");
        assert_eq!(backend.hits(), 1);

        // Close pooled keep-alive connections so draining finishes
        drop(client);
        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let err = bind_all(&["not-an-address".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }
}
