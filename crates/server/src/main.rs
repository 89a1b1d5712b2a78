//! Quarry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use quarry_core::config::AppConfig;
use quarry_server::{create_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quarry - a content-addressable blob store with resumable uploads
#[derive(Parser, Debug)]
#[command(name = "quarryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "QUARRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Quarry v{}", env!("CARGO_PKG_VERSION"));

    // Configuration comes from an optional TOML file with QUARRY_ env
    // variable overrides; either source alone is sufficient.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("QUARRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let bind = config.server.bind.clone();
    let state = AppState::init(config).await?;
    tracing::info!("Upload engine initialized");

    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(bind = %bind, "Server listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}
