//! edge-shaper: edge proxy that upgrades plain-HTTP requests for one hostname
//! and stamps CORS headers on everything it delivers from a single backend.

mod config;
mod error;
mod pipeline;
mod proxy;
mod server;
mod shape;
#[cfg(test)]
mod testing;

use config::ShaperConfig;
use pipeline::Pipeline;
use proxy::forward::Forwarder;
use server::AppState;
use shape::cors::CorsInjector;
use shape::inspect::Inspector;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("EDGE_SHAPER_CONFIG").ok())
        .unwrap_or_else(|| "edge-shaper.toml".to_string());

    let backend_override = args
        .iter()
        .position(|a| a == "--backend")
        .and_then(|i| args.get(i + 1).cloned());

    // --listen may be repeated; any occurrence replaces the configured list
    let listen_overrides: Vec<String> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "--listen")
        .filter_map(|(i, _)| args.get(i + 1).cloned())
        .collect();

    // Load configuration
    let mut config = ShaperConfig::load(&config_path)?;

    // Apply CLI overrides (take precedence over TOML and env vars)
    if let Some(address) = backend_override {
        config.backend.set_address(&address)?;
    }
    if !listen_overrides.is_empty() {
        config.server.listen_addresses = listen_overrides;
    }
    config.validate()?;

    // Build the tokio runtime first; the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize tracing (OTLP export is optional and falls back to fmt-only)
        let tracing_guard = edge_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_addresses = ?config.server.listen_addresses,
            backend = %config.backend.base_url(),
            redirect_enabled = config.redirect.enabled,
            redirect_hostname = %config.redirect.hostname,
            otlp_export = tracing_guard.exporting(),
            "Starting edge-shaper"
        );

        let result = run(config).await;
        drop(tracing_guard);
        result
    })
}

async fn run(config: ShaperConfig) -> anyhow::Result<()> {
    let forwarder = Forwarder::new(&config.backend, config.server.max_body_bytes)?;
    let injector = CorsInjector::new(&config.cors)?;
    let inspector = Inspector::new(&config.redirect);

    tracing::debug!(backend = %forwarder.base_url(), "Backend client ready");

    let state = AppState {
        pipeline: Pipeline::new(inspector, forwarder, injector),
    };

    server::run(&config.server.listen_addresses, state).await
}
