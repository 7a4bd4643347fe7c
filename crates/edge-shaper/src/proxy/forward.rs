//! Verbatim forwarding to the backend.
//!
//! Status, headers and body come back untouched apart from hop-by-hop
//! headers. The response body is streamed, never buffered or parsed.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::{CONNECTION, CONTENT_LENGTH};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use tracing::Instrument;

use crate::config::BackendConfig;
use crate::error::ForwardError;

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
];

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Client for the single configured backend.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(config: &BackendConfig, max_body_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            // Backend redirects belong to the client, not to us
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            max_body_bytes,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` to the backend and relay its response.
    pub async fn forward(&self, request: Request, request_id: &str) -> Result<Response, ForwardError> {
        let path = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        // Asterisk-form (`OPTIONS *`) has no origin-form equivalent
        if !path.starts_with('/') {
            tracing::debug!(target_form = %path, "Rejecting non origin-form request target");
            return Err(ForwardError::RequestTarget(path.to_string()));
        }
        let url = format!("{}{path}", self.base_url);

        let span = edge_tracing::backend_forward_span!(request_id, url);
        let start = Instant::now();

        async {
            let client_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let (parts, body) = request.into_parts();

            let body = axum::body::to_bytes(body, self.max_body_bytes)
                .await
                .map_err(ForwardError::BodyRead)?;

            let mut headers = request_headers(&parts.headers);
            if let Some(addr) = client_addr {
                append_forwarded_for(&mut headers, addr);
            }

            let result = self
                .client
                .request(parts.method, &url)
                .headers(headers)
                .body(body)
                .send()
                .await;

            let latency = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::Span::current().record("latency_ms", latency);

            let upstream = match result {
                Ok(resp) => resp,
                Err(e) => {
                    let err = ForwardError::from(e);
                    tracing::Span::current().record("status", err.status().as_u16());
                    tracing::error!(error = %err, "Backend forward failed");
                    return Err(err);
                }
            };

            let status = upstream.status();
            tracing::Span::current().record("status", status.as_u16());
            tracing::debug!(status = status.as_u16(), latency_ms = latency, "Forward complete");

            build_response(upstream)
        }
        .instrument(span)
        .await
    }
}

/// Copy the inbound headers minus hop-by-hop ones. `Host` is kept so the
/// backend sees the name the client asked for.
fn request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = strip_hop_by_hop(inbound);
    // Recomputed by the client from the buffered body
    headers.remove(CONTENT_LENGTH);
    headers
}

/// Drop hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = source
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) || listed.iter().any(|l| l == name_str) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Append the client address the way caching proxies do: `prior, client`.
fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let client = addr.ip().to_string();
    let prior: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let combined = if prior.is_empty() {
        client
    } else {
        format!("{}, {client}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&combined) {
        headers.insert(HeaderName::from_static(FORWARDED_FOR_HEADER), value);
    }
}

/// Build the client-facing response, streaming the backend body verbatim.
fn build_response(upstream: reqwest::Response) -> Result<Response, ForwardError> {
    let mut builder = Response::builder().status(upstream.status());
    if let Some(headers) = builder.headers_mut() {
        *headers = strip_hop_by_hop(upstream.headers());
    }

    let body = Body::from_stream(upstream.bytes_stream());
    Ok(builder.body(body)?)
}
