//! relaybox gateway binary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaybox_gateway::{config::Config, server};

#[derive(Debug, Parser)]
#[command(name = "relaybox", version, about = "WHIP/WHEP broadcast relay")]
struct Args {
    /// TOML configuration file; environment variables override its values
    #[arg(short, long, env = "RELAYBOX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // axum-server is built without a default crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();

    tracing::info!("Starting relaybox...");

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    tracing::info!(
        "Configuration: http_address={}, tls={}, redirect={}, database={}, self_test={}",
        config.server.http_address,
        config.tls.paths().is_some(),
        config.redirect.enabled,
        config.database.store_config().is_some(),
        config.self_test.enabled
    );

    server::run(config).await
}
