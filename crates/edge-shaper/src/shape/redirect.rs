//! Synthetic `301` responses built without contacting the backend.

use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;

use super::inspect::RedirectIntent;
use crate::error::SynthesisError;

/// Turn a redirect intent into a bodiless `301 Moved Permanently`.
pub fn synthesize(intent: RedirectIntent) -> Result<Response, SynthesisError> {
    let target = intent.into_target();
    let location = match HeaderValue::try_from(target.as_str()) {
        Ok(value) => value,
        Err(_) => return Err(SynthesisError::InvariantViolation { target }),
    };

    Ok(Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .body(Body::empty())?)
}
