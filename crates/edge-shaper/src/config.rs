//! Configuration types and loading logic.

use std::net::Ipv6Addr;

use edge_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level edge configuration. Loaded once at startup, immutable afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShaperConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Inbound listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addresses")]
    pub listen_addresses: Vec<String>,

    /// Upper bound on a buffered inbound request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// The single upstream origin.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,

    #[serde(default = "default_backend_port")]
    pub port: u16,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Plain-HTTP to HTTPS upgrade for one hostname.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Matched case-insensitively against the start of the `Host` header.
    #[serde(default = "default_redirect_hostname")]
    pub hostname: String,
}

/// CORS headers set on every response whose path starts with `path_prefix`.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,

    #[serde(default = "default_allow_methods")]
    pub allow_methods: String,

    #[serde(default = "default_allow_headers")]
    pub allow_headers: String,
}

fn default_listen_addresses() -> Vec<String> {
    vec!["0.0.0.0:80".to_string()]
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    8000
}

fn default_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_redirect_hostname() -> String {
    "connect.ilhasoft.mobi".to_string()
}

fn default_path_prefix() -> String {
    "/".to_string()
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_methods() -> String {
    "GET, OPTIONS".to_string()
}

fn default_allow_headers() -> String {
    "Origin, Accept, Content-Type, X-Requested-With, X-CSRF-Token".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addresses: default_listen_addresses(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hostname: default_redirect_hostname(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            allow_origin: default_allow_origin(),
            allow_methods: default_allow_methods(),
            allow_headers: default_allow_headers(),
        }
    }
}

impl BackendConfig {
    /// Base URL requests are forwarded to, without a trailing slash.
    pub fn base_url(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Parse a `host:port` override as given on the command line.
    pub fn set_address(&mut self, address: &str) -> Result<(), ConfigError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::BackendAddress(address.to_string()))?;
        self.port = port
            .parse()
            .map_err(|_| ConfigError::BackendAddress(address.to_string()))?;
        self.host = host.to_string();
        Ok(())
    }
}

impl ShaperConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EDGE_ prefix, __ for nesting)
    /// 2. TOML config file (a missing file is not an error)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: ShaperConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("EDGE_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Reject configurations the edge cannot serve with.
    ///
    /// CORS values are checked separately when the injector is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addresses.is_empty() {
            return Err(ConfigError::NoListenAddress);
        }
        if self.backend.host.trim().is_empty() {
            return Err(ConfigError::EmptyBackendHost);
        }
        if self.backend.port == 0 {
            return Err(ConfigError::ZeroBackendPort);
        }
        if self.redirect.enabled && self.redirect.hostname.trim().is_empty() {
            return Err(ConfigError::EmptyRedirectHostname);
        }
        if !self.cors.path_prefix.starts_with('/') {
            return Err(ConfigError::PathPrefix(self.cors.path_prefix.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = ShaperConfig::load("missing.toml").unwrap();

            assert_eq!(config.server.listen_addresses, vec!["0.0.0.0:80"]);
            assert_eq!(config.backend.base_url(), "http://127.0.0.1:8000");
            assert!(config.redirect.enabled);
            assert_eq!(config.redirect.hostname, "connect.ilhasoft.mobi");
            assert_eq!(config.cors.allow_origin, "*");
            assert_eq!(config.cors.allow_methods, "GET, OPTIONS");
            assert_eq!(
                config.cors.allow_headers,
                "Origin, Accept, Content-Type, X-Requested-With, X-CSRF-Token"
            );
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_toml_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "edge.toml",
                r#"
                [server]
                listen_addresses = ["0.0.0.0:80", "0.0.0.0:8000"]

                [backend]
                host = "origin.internal"
                port = 9000

                [redirect]
                hostname = "app.example.org"
                "#,
            )?;
            jail.set_env("EDGE_BACKEND__PORT", "9100");

            let config = ShaperConfig::load("edge.toml").unwrap();

            assert_eq!(config.server.listen_addresses.len(), 2);
            assert_eq!(config.backend.host, "origin.internal");
            assert_eq!(config.backend.port, 9100);
            assert_eq!(config.redirect.hostname, "app.example.org");
            // Untouched sections keep their defaults
            assert_eq!(config.backend.timeout_secs, 60);
            assert_eq!(config.cors.path_prefix, "/");
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ShaperConfig::default();
        config.backend.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBackendPort)));

        let mut config = ShaperConfig::default();
        config.server.listen_addresses.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoListenAddress)));

        let mut config = ShaperConfig::default();
        config.redirect.hostname = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRedirectHostname)
        ));

        // An empty hostname is fine once the rule is switched off
        config.redirect.enabled = false;
        assert!(config.validate().is_ok());

        let mut config = ShaperConfig::default();
        config.cors.path_prefix = "api".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::PathPrefix(_))));
    }

    #[test]
    fn test_backend_address_override() {
        let mut backend = BackendConfig::default();
        backend.set_address("10.0.0.5:8080").unwrap();
        assert_eq!(backend.base_url(), "http://10.0.0.5:8080");

        assert!(backend.set_address("no-port").is_err());
        assert!(backend.set_address("host:http").is_err());
        // A failed override leaves the previous value in place
        assert_eq!(backend.base_url(), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_ipv6_backend_host_is_bracketed() {
        let backend = BackendConfig {
            host: "::1".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.base_url(), "http://[::1]:8000");

        let mut backend = BackendConfig::default();
        backend.set_address("[::1]:9000").unwrap();
        assert_eq!(backend.base_url(), "http://[::1]:9000");
    }
}
