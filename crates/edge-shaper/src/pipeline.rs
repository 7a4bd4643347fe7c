//! Per-request shaping pipeline.
//!
//! ```text
//! Inspecting ──passthrough──▶ Forwarding ───┐
//!     │                                     ├─▶ Injecting ─▶ Delivered
//!     └──synthesize──▶ Synthesizing ────────┘
//! ```
//!
//! A straight line with one branch. Both branches, and every error they
//! produce, converge on injection before the response leaves.

use axum::extract::Request;
use axum::http::header::HOST;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::proxy::correlation;
use crate::proxy::forward::Forwarder;
use crate::shape::cors::CorsInjector;
use crate::shape::inspect::{Decision, Inspector};
use crate::shape::redirect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Inspecting,
    Synthesizing,
    Forwarding,
    Injecting,
    Delivered,
}

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Clone)]
pub struct Pipeline {
    inspector: Inspector,
    forwarder: Forwarder,
    injector: CorsInjector,
}

impl Pipeline {
    pub fn new(inspector: Inspector, forwarder: Forwarder, injector: CorsInjector) -> Self {
        Self {
            inspector,
            forwarder,
            injector,
        }
    }

    pub async fn run(&self, request: Request) -> Response {
        let request_id = correlation::generate_id();
        let path = request.uri().path().to_string();
        let host = request
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let span = edge_tracing::edge_request_span!(&request_id, request.method(), &host, &path);

        async {
            enter(Stage::Inspecting);
            let decision = self.inspector.inspect(request.uri(), request.headers());
            tracing::Span::current().record("decision", decision.label());

            let mut response = match decision {
                Decision::Synthesize(intent) => {
                    enter(Stage::Synthesizing);
                    tracing::debug!(location = %intent.target(), "Redirecting to https");
                    redirect::synthesize(intent).unwrap_or_else(|e| {
                        tracing::error!(error = %e, "Redirect synthesis failed");
                        e.into_response()
                    })
                }
                Decision::Passthrough => {
                    enter(Stage::Forwarding);
                    self.forwarder
                        .forward(request, &request_id)
                        .await
                        .unwrap_or_else(IntoResponse::into_response)
                }
            };

            enter(Stage::Injecting);
            self.injector.inject(&path, response.headers_mut());

            tracing::Span::current().record("status", response.status().as_u16());
            enter(Stage::Delivered);
            response
        }
        .instrument(span)
        .await
    }
}

fn enter(stage: Stage) {
    tracing::debug!(stage = ?stage, "Pipeline stage");
}
