//! Logging setup and Prometheus metrics
//!
//! This module provides:
//! - Structured logging configuration
//! - Service counters exported on `/metrics`
//! - Span helpers carrying device context

use anyhow::{Context, Result};
use fleetwear_core::{EventKind, IngestPath};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Initialize structured logging
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let fmt_layer = if config.json_format {
        fmt::layer().json().with_current_span(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

/// Logging span helpers
pub struct LoggingSpans;

impl LoggingSpans {
    /// Span for one inbound sample
    pub fn ingest_span(device_id: &str, path: IngestPath) -> tracing::Span {
        tracing::debug_span!("ingest", device_id = %device_id, path = %path)
    }
}

/// Service metrics registered in a private Prometheus registry
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    samples: IntCounterVec,
    malformed: IntCounter,
    events: IntCounterVec,
    viewer_dropped: IntCounter,
    forward_failures: IntCounter,
    devices: IntGauge,
    ceiling: IntGauge,
}

impl ServiceMetrics {
    /// Create and register all metrics
    ///
    /// # Errors
    ///
    /// Fails if a metric cannot be registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let samples = IntCounterVec::new(
            Opts::new("fleetwear_samples_total", "Telemetry samples accepted"),
            &["path"],
        )?;
        let malformed = IntCounter::new(
            "fleetwear_malformed_total",
            "Request bodies dropped as malformed",
        )?;
        let events = IntCounterVec::new(
            Opts::new("fleetwear_events_total", "Hard events detected"),
            &["kind"],
        )?;
        let viewer_dropped = IntCounter::new(
            "fleetwear_viewer_dropped_total",
            "Viewer updates not delivered",
        )?;
        let forward_failures = IntCounter::new(
            "fleetwear_forward_failures_total",
            "Time-series forwards that failed",
        )?;
        let devices = IntGauge::new("fleetwear_devices", "Devices currently tracked")?;
        let ceiling = IntGauge::new("fleetwear_lifetime_ceiling", "Current lifetime ceiling")?;

        registry.register(Box::new(samples.clone()))?;
        registry.register(Box::new(malformed.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(viewer_dropped.clone()))?;
        registry.register(Box::new(forward_failures.clone()))?;
        registry.register(Box::new(devices.clone()))?;
        registry.register(Box::new(ceiling.clone()))?;

        Ok(Self {
            registry,
            samples,
            malformed,
            events,
            viewer_dropped,
            forward_failures,
            devices,
            ceiling,
        })
    }

    /// Count an accepted sample
    pub fn sample(&self, path: IngestPath) {
        self.samples.with_label_values(&[path.as_str()]).inc();
    }

    /// Count a dropped body
    pub fn malformed(&self) {
        self.malformed.inc();
    }

    /// Count a detected event
    pub fn event(&self, kind: EventKind) {
        self.events.with_label_values(&[kind.as_str()]).inc();
    }

    /// Count an undelivered viewer update
    pub fn viewer_dropped(&self) {
        self.viewer_dropped.inc();
    }

    /// Count a failed forward
    pub fn forward_failed(&self) {
        self.forward_failures.inc();
    }

    /// Record registry size and ceiling
    pub fn set_state(&self, devices: usize, ceiling: u64) {
        self.devices.set(i64::try_from(devices).unwrap_or(i64::MAX));
        self.ceiling.set(i64::try_from(ceiling).unwrap_or(i64::MAX));
    }

    /// Samples accepted on one path
    pub fn samples_total(&self, path: IngestPath) -> u64 {
        self.samples.with_label_values(&[path.as_str()]).get()
    }

    /// Bodies dropped as malformed
    pub fn malformed_total(&self) -> u64 {
        self.malformed.get()
    }

    /// Events detected of one kind
    pub fn events_total(&self, kind: EventKind) -> u64 {
        self.events.with_label_values(&[kind.as_str()]).get()
    }

    /// Failed forwards
    pub fn forward_failures_total(&self) -> u64 {
        self.forward_failures.get()
    }

    /// Render the Prometheus text exposition
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("Prometheus output was not UTF-8")
    }
}
