//! Upgrade decision for inbound requests.
//!
//! A pure predicate over the request head: it never contacts the backend and
//! never mutates what is forwarded.

use axum::http::header::HOST;
use axum::http::{HeaderMap, Uri};

use crate::config::RedirectConfig;

/// Header set by the TLS-terminating hop in front of the edge.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Absolute URL a plain-HTTP request is sent to instead of the backend.
///
/// Owned and moved into the redirect builder, so it is consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectIntent {
    target: String,
}

impl RedirectIntent {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn into_target(self) -> String {
        self.target
    }
}

/// Outcome of inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Passthrough,
    Synthesize(RedirectIntent),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Passthrough => "passthrough",
            Decision::Synthesize(_) => "synthesize",
        }
    }
}

/// Decides whether a request is upgraded to HTTPS at the edge.
#[derive(Debug, Clone)]
pub struct Inspector {
    /// Lowercased; `None` disables the rule.
    hostname: Option<String>,
}

impl Inspector {
    pub fn new(config: &RedirectConfig) -> Self {
        let hostname = config
            .enabled
            .then(|| config.hostname.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty());
        Self { hostname }
    }

    pub fn inspect(&self, uri: &Uri, headers: &HeaderMap) -> Decision {
        let Some(hostname) = self.hostname.as_deref() else {
            return Decision::Passthrough;
        };

        // No (readable) Host header fails open
        let Some(host) = headers.get(HOST).and_then(|v| v.to_str().ok()) else {
            return Decision::Passthrough;
        };

        if !starts_with_ignore_case(host, hostname) || is_https(headers) {
            return Decision::Passthrough;
        }

        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        // `OPTIONS *` has no URL to redirect to
        if !path.starts_with('/') {
            return Decision::Passthrough;
        }
        Decision::Synthesize(RedirectIntent {
            target: format!("https://{host}{path}"),
        })
    }
}

/// Absent forwarded-proto counts as plain HTTP.
fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get_all(FORWARDED_PROTO_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("https"))
}

/// `prefix` must already be lowercase.
fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}
