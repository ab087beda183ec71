//! Gateway bootstrap: store, engine, self-test and listeners

use anyhow::{bail, Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use relaybox_core::MediaEngine;
use relaybox_credential_store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use relaybox_webrtc::WebRtcEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::redirect::redirect_router;
use crate::selftest;

/// How long in-flight requests get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the credential store the configuration asks for
pub fn build_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    match config.database.store_config() {
        Some(pg) => {
            tracing::info!(
                "Using Postgres credential store (max_connections={}, acquire_timeout={:?})",
                pg.max_connections,
                pg.acquire_timeout
            );
            let store =
                PgCredentialStore::connect_lazy(&pg).context("invalid Postgres configuration")?;
            Ok(Arc::new(store))
        }
        None => {
            if config.streamers.is_empty() {
                tracing::warn!("No database URL and no [[streamers]] configured; WHIP publishing is disabled");
            } else {
                tracing::info!(
                    "Using in-memory credential store with {} streamer(s)",
                    config.streamers.len()
                );
            }
            Ok(Arc::new(MemoryCredentialStore::new(config.streamers.clone())))
        }
    }
}

/// Run the gateway until a shutdown signal arrives
pub async fn run(config: Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let addr = config.server.socket_addr()?;

    let store = build_store(&config)?;
    let engine =
        Arc::new(WebRtcEngine::new(config.webrtc.clone()).context("failed to start WebRTC engine")?);

    let config = Arc::new(config);
    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&engine) as Arc<dyn MediaEngine>,
        Arc::clone(&config),
    );
    let router = build_router(state);

    if let Err(e) = self_test_gate(&config, router.clone()).await {
        store.close().await;
        engine.shutdown().await;
        return Err(e);
    }

    let handle = Handle::new();
    let redirect_handle = Handle::new();
    {
        let handle = handle.clone();
        let redirect_handle = redirect_handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            redirect_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });
    }

    let served = if config.redirect.enabled {
        let redirect_addr = config.redirect.socket_addr();
        tokio::try_join!(
            serve_main(&config, addr, router, handle),
            serve_redirect(redirect_addr, redirect_handle),
        )
        .map(|_| ())
    } else {
        serve_main(&config, addr, router, handle).await
    };

    store.close().await;
    engine.shutdown().await;

    served?;
    tracing::info!("relaybox shutdown complete");
    Ok(())
}

/// Run the startup self-test when enabled; anything but a pass is fatal
async fn self_test_gate(config: &Config, router: Router) -> Result<()> {
    if !config.self_test.enabled {
        return Ok(());
    }

    tracing::info!("Running startup self-test...");
    let outcome = selftest::run(router, &config.webrtc, &config.self_test).await;
    if !outcome.is_pass() {
        bail!("startup self-test {}", outcome);
    }
    tracing::info!("Startup self-test {}", outcome);
    Ok(())
}

async fn serve_main(config: &Config, addr: SocketAddr, router: Router, handle: Handle) -> Result<()> {
    let service = router.into_make_service();

    match config.tls.paths() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| format!("failed to load TLS certificate {} / key {}", cert, key))?;
            tracing::info!("HTTPS server listening on {}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(service)
                .await
                .with_context(|| format!("HTTPS server on {} failed", addr))
        }
        None => {
            tracing::info!("HTTP server listening on {}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(service)
                .await
                .with_context(|| format!("HTTP server on {} failed", addr))
        }
    }
}

async fn serve_redirect(addr: SocketAddr, handle: Handle) -> Result<()> {
    tracing::info!("HTTP->HTTPS redirect server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(redirect_router().into_make_service())
        .await
        .with_context(|| format!("redirect server on {} failed", addr))
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
