use crate::config::Config;
use crate::gateway::TranslationGateway;
use crate::gateway::cache::TranslationCache;
use crate::provider::{HttpProvider, ProviderSettings, TranslationProvider};
use crate::state::AppState;
use crate::web::create_router;
use anyhow::Context;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Load the cache, build the provider client and assemble the gateway.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let gateway_config = config.gateway_config();

        let cache = Arc::new(
            TranslationCache::load(config.cache_path.clone(), gateway_config.cache_ttl).await,
        );

        let provider = HttpProvider::new(ProviderSettings {
            api_key: config.provider_api_key.clone(),
            base_url: config.provider_base_url.clone(),
            model: config.provider_model.clone(),
        })
        .context("Failed to create provider client")?;

        if !provider.is_configured() {
            warn!("PROVIDER_API_KEY is not set; translate requests will be rejected");
        }

        let gateway = Arc::new(TranslationGateway::new(
            cache,
            Arc::new(provider),
            &gateway_config,
        ));

        info!(
            cached_entries = gateway.stats().cached_entries,
            cache_path = %gateway.cache().path().display(),
            max_concurrent_upstream = gateway_config.max_concurrent_upstream,
            retry_batch_limit = gateway_config.retry_batch_limit,
            upstream_timeout = ?gateway_config.upstream_timeout,
            model = %config.provider_model,
            "translation gateway ready"
        );

        let app_state = AppState::new(gateway, &config.default_target_language);
        Ok(App { config, app_state })
    }

    /// Serve until a shutdown signal, drain in-flight requests for at most
    /// `SHUTDOWN_TIMEOUT`, then persist the cache one last time.
    pub async fn run(self) -> ExitCode {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "Failed to bind listener");
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");

        let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
        let router = create_router(self.app_state.clone());
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();

        let grace = self.config.shutdown_timeout;
        let drain_deadline = async move {
            // Resolves only after a signal arrived and the grace period elapsed.
            if signalled_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        let mut exit = ExitCode::SUCCESS;
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "web server failed");
                    exit = ExitCode::FAILURE;
                }
            }
            _ = drain_deadline => {
                warn!(grace = ?grace, "in-flight requests did not drain in time");
            }
        }

        let gateway = &self.app_state.gateway;
        gateway.close();
        match gateway.flush().await {
            Ok(entries) => info!(entries, "translation cache persisted"),
            Err(e) => {
                error!(error = %e, "Failed to persist translation cache on shutdown");
                exit = ExitCode::FAILURE;
            }
        }

        info!("shutdown complete");
        exit
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down gracefully...");
}
