//! Fleetwear service - telemetry ingestion daemon

#![deny(clippy::unwrap_used)]

pub mod broadcaster;
pub mod config;
pub mod daemon;
pub mod forwarder;
pub mod http;
pub mod ingestion;
pub mod observability;
pub mod ticker;

pub use broadcaster::{BroadcastStats, Broadcaster};
pub use config::{Overrides, ServiceConfig};
pub use daemon::{ServiceDaemon, build_service};
pub use forwarder::{ForwardRecord, QueryReply, TimeSeriesForwarder};
pub use http::router;
pub use ingestion::IngestionService;
pub use observability::{LoggingConfig, ServiceMetrics, init_logging};
pub use ticker::MaintenanceTicker;
