//! Span builder helpers for edge-shaper instrumentation.

/// Create a tracing span for one pass through the shaping pipeline.
///
/// Usage: `let span = edge_request_span!(request_id, method, host, path);`
///
/// Recorded later by the pipeline:
/// - `decision`: `passthrough` or `synthesize`
/// - `status`: the status code delivered to the client
#[macro_export]
macro_rules! edge_request_span {
    ($request_id:expr, $method:expr, $host:expr, $path:expr) => {
        tracing::info_span!(
            "edge_request",
            request_id = %$request_id,
            method = %$method,
            host = %$host,
            path = %$path,
            decision = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the forward to the backend.
#[macro_export]
macro_rules! backend_forward_span {
    ($request_id:expr, $target:expr) => {
        tracing::info_span!(
            "backend_forward",
            request_id = %$request_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
