//! Pulse binary: wires configuration, cache, sources and provider into the
//! HTTP server.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use pulse_api::{start_server, AppState};
use pulse_chat::GeminiProvider;
use pulse_context::Aggregator;
use pulse_core::PulseConfig;
use pulse_storage::{Database, SqliteCache};

use crate::cli::CliArgs;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir
        .strip_prefix("~/")
        .or_else(|| data_dir.strip_prefix("~\\"))
    {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = PulseConfig::load_or_default(&config_file)?;
    config.server.host = args.resolve_host(&config.server.host);
    config.server.port = args.resolve_port(config.server.port);
    config.provider.api_key = args.resolve_api_key(&config.provider.api_key);

    // Tracing. An explicit --log-level beats RUST_LOG.
    match args.resolve_log_level() {
        Some(level) => tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(level))
            .init(),
        None => init_tracing(&config.general.log_level),
    }

    tracing::info!("Starting Pulse v{}", env!("CARGO_PKG_VERSION"));
    if config_file.exists() {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::warn!(path = %config_file.display(), "No config file, using defaults");
    }
    config.validate()?;

    if config.provider.api_key.is_empty() {
        tracing::warn!("No provider API key configured; set PULSE_PROVIDER_API_KEY");
    }

    // Cache.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("cache.db");
    let cache = Arc::new(SqliteCache::new(Arc::new(Database::new(&db_path)?)));
    tracing::info!(path = %db_path.display(), "Cache database opened");

    // Sources. The request timeout matches the source deadline; the deadline
    // itself is enforced by the fetcher.
    let http = reqwest::Client::builder()
        .connect_timeout(config.sources.connect_timeout())
        .timeout(config.sources.timeout())
        .build()?;
    let aggregator = Aggregator::from_config(&config.sources, cache, http);
    tracing::info!(sources = ?aggregator, "Aggregator ready");

    // Provider.
    let provider = Arc::new(GeminiProvider::new(config.provider.clone())?);
    tracing::info!(model = %config.provider.model, "Provider ready");

    let state = AppState::new(config, aggregator, provider);
    start_server(state).await?;

    Ok(())
}
