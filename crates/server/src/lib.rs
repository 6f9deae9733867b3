//! Turnstile server library.
//!
//! Provides a reusable server function to serve turnstile either for the binary, or for the
//! integration tests.

#![deny(missing_docs)]

mod admission;
mod health;
mod upstream;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use rate_limit::{AdmissionManager, ExemptionRules, Storage};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use admission::{AdmissionLayer, CallerExtractor};
use upstream::Upstream;

/// Configuration for serving turnstile.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized turnstile TOML configuration.
    pub config: Config,
    /// Cancelled to stop accepting connections and shut down gracefully.
    pub shutdown: CancellationToken,
}

/// Starts and runs the turnstile server with the provided configuration.
///
/// Returns once `shutdown` is cancelled and in-flight requests have completed. The counter
/// store is closed when the server stops, and also when it fails to start.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let storage = Arc::new(Storage::connect(&config.admission.storage).await);
    serve_with_storage(listen_address, &config, storage, shutdown).await
}

async fn serve_with_storage(
    listen_address: SocketAddr,
    config: &Config,
    storage: Arc<Storage>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let result = run(listen_address, config, storage.clone(), shutdown).await;

    storage.close();
    log::info!("Turnstile stopped");

    result
}

async fn run(
    listen_address: SocketAddr,
    config: &Config,
    storage: Arc<Storage>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let backend = storage.backend();
    let manager = Arc::new(AdmissionManager::from_config(&config.admission, storage)?);

    let app = router(config, manager)?;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("Turnstile listening on http://{listen_address} with {backend} admission counters");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))
}

fn router(config: &Config, manager: Arc<AdmissionManager>) -> anyhow::Result<Router> {
    let mut metered = match &config.server.upstream {
        Some(upstream_config) => {
            log::info!("Forwarding admitted requests to {}", upstream_config.url);

            Router::new()
                .fallback(upstream::forward)
                .with_state(Arc::new(Upstream::new(upstream_config)?))
        }
        None => {
            log::warn!("No upstream configured, admitted requests will be answered with 404");
            Router::new().fallback(upstream::not_found)
        }
    };

    if config.admission.enabled {
        let mut exemptions = ExemptionRules::from_config(&config.admission.exemptions);

        if config.server.health.enabled {
            exemptions.exempt_path(config.server.health.path.to_string());
        }

        let extractor = CallerExtractor::new(config.admission.identity.clone(), exemptions);
        metered = metered.layer(AdmissionLayer::new(manager, extractor));
    } else {
        log::warn!("Admission control is disabled, every request is forwarded unmetered");
    }

    let mut app = Router::new();

    // Mounted next to the metered fallback, outside of the admission layer.
    if config.server.health.enabled {
        app = app.route(&config.server.health.path, get(health::health));
    }

    Ok(app.merge(metered))
}
