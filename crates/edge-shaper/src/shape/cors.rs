//! CORS header injection on delivered responses.
//!
//! Values are validated once at startup and overwrite whatever the backend
//! sent under the same names.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue};

use crate::config::CorsConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct CorsInjector {
    path_prefix: String,
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
}

impl CorsInjector {
    pub fn new(config: &CorsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            path_prefix: config.path_prefix.clone(),
            allow_origin: header_value("allow_origin", &config.allow_origin)?,
            allow_methods: header_value("allow_methods", &config.allow_methods)?,
            allow_headers: header_value("allow_headers", &config.allow_headers)?,
        })
    }

    /// Whether responses to `path` get the headers.
    ///
    /// Non origin-form targets such as `*` are matched as `/`.
    pub fn applies_to(&self, path: &str) -> bool {
        let path = if path.starts_with('/') { path } else { "/" };
        path.starts_with(&self.path_prefix)
    }

    /// Set the three headers on `headers` if `path` is covered.
    pub fn inject(&self, path: &str, headers: &mut HeaderMap) {
        if !self.applies_to(path) {
            return;
        }
        // insert() drops every previous value for the name
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
    }
}

fn header_value(field: &'static str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|_| ConfigError::CorsValue {
        field,
        value: value.to_string(),
    })
}
