//! Service daemon: component wiring, HTTP listener and shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use fleetwear_core::{IngestPath, SystemState};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::broadcaster::Broadcaster;
use crate::config::ServiceConfig;
use crate::forwarder::TimeSeriesForwarder;
use crate::http::router;
use crate::ingestion::IngestionService;
use crate::observability::ServiceMetrics;
use crate::ticker::MaintenanceTicker;

/// Build the ingestion service described by `config`.
///
/// Spawns the viewer writer, so it must be called from within a Tokio
/// runtime.
///
/// # Errors
///
/// Fails if metrics or the HTTP client cannot be created.
pub fn build_service(config: &ServiceConfig) -> Result<IngestionService> {
    let metrics = ServiceMetrics::new().context("Failed to register metrics")?;

    let state = Arc::new(SystemState::new(
        config.detector(),
        config.asset_allocator(),
        config.lifetime.initial_ceiling,
    ));
    metrics.set_state(0, state.ceiling());

    let (broadcaster, _writer) = Broadcaster::spawn(config.viewer.queue_capacity, metrics.clone());
    let forwarder = TimeSeriesForwarder::new(config.forwarder.clone(), metrics.clone())?;

    if !forwarder.is_enabled() {
        info!("No time-series ingest endpoint configured, forwarding disabled");
    }

    Ok(IngestionService::new(
        state,
        broadcaster,
        forwarder,
        metrics,
        config.axis_scale(IngestPath::Mobile),
    ))
}

/// Service daemon that owns the listener and the maintenance task.
pub struct ServiceDaemon {
    config: ServiceConfig,
}

impl ServiceDaemon {
    /// Create a daemon from a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        Ok(Self { config })
    }

    /// Address the daemon binds.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.http.bind_addr, self.config.http.port)
    }

    /// Bind the configured address and serve until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the server errors.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Fails if the components cannot be built or the server errors.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let service = build_service(&self.config)?;
        let ticker = MaintenanceTicker::new(
            service.clone(),
            self.config.maintenance.interval(),
            self.config.maintenance.credit,
        );
        ticker.start();

        let local = listener.local_addr().context("Listener has no local address")?;
        info!(addr = %local, "fleetweard listening");

        let result = axum::serve(listener, router(service.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error");

        info!("Shutting down");
        ticker.stop();
        service.broadcaster().shutdown();

        if let Err(e) = &result {
            error!("Server stopped with error: {:#}", e);
        }
        result
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error waiting for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
