//! Service configuration loading and validation
//!
//! Every tunable the detection and maintenance paths use lives here, so the
//! historical per-deployment variants become one binary with different JSON.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use fleetwear_core::{AssetIdAllocator, AxisScale, EventDetector, IngestPath, LifetimeModel};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::observability::LoggingConfig;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener
    pub http: HttpConfig,
    /// Event detection
    pub detection: DetectionConfig,
    /// Lifetime model
    pub lifetime: LifetimeConfig,
    /// Maintenance credit task
    pub maintenance: MaintenanceConfig,
    /// Asset id pool
    pub assets: AssetConfig,
    /// Viewer push channel
    pub viewer: ViewerConfig,
    /// External time-series store
    pub forwarder: ForwarderConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind
    pub bind_addr: IpAddr,
    /// Port to bind when neither `--port` nor `PORT` is given
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
        }
    }
}

/// Detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Symmetric threshold in g
    pub threshold_g: f64,
    /// Divisor applied to x/y on the mobile route
    pub mobile_axis_scale: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_g: 1.2,
            mobile_axis_scale: 25.0,
        }
    }
}

/// Lifetime model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    /// Ceiling at process start
    pub initial_ceiling: u64,
    /// Wear charged per detected event
    pub wear_per_event: u64,
    /// Lowest reported estimate
    pub floor: u64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            initial_ceiling: 100_000,
            wear_per_event: 100,
            floor: 0,
        }
    }
}

/// Maintenance credit task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Tick period in milliseconds
    pub interval_ms: u64,
    /// Ceiling increase per tick
    pub credit: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            credit: 250,
        }
    }
}

impl MaintenanceConfig {
    /// Tick period.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Asset pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Ids in allocation order
    pub pool: Vec<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            pool: (1..=16).map(|n| format!("asset-{n:02}")).collect(),
        }
    }
}

/// Viewer push channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Pending updates held for the writer before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// External time-series store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Ingest endpoint; forwarding is disabled when unset
    pub ingest_url: Option<String>,
    /// Query endpoint for the pass-through route
    pub query_url: Option<String>,
    /// Tenant identifier sent on every request
    pub tenant: String,
    /// Header carrying the tenant identifier
    pub tenant_header: String,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            ingest_url: None,
            query_url: None,
            tenant: String::new(),
            tenant_header: "Predix-Zone-Id".to_string(),
            token: None,
            timeout_ms: 5_000,
        }
    }
}

impl ForwarderConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Command-line and environment overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Listener port
    pub port: Option<u16>,
    /// Listener address
    pub bind_addr: Option<IpAddr>,
    /// Force JSON log output
    pub json_logs: bool,
    /// Log level override
    pub log_level: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: ServiceConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply command-line and environment overrides.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            info!(port, "Port overridden");
            self.http.port = port;
        }
        if let Some(addr) = overrides.bind_addr {
            self.http.bind_addr = addr;
        }
        if overrides.json_logs {
            self.logging.json_format = true;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Fails with a description of the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection.threshold_g;
        if !threshold.is_finite() || threshold <= 0.0 {
            anyhow::bail!("Invalid detection threshold: {threshold} g");
        }

        let scale = self.detection.mobile_axis_scale;
        if !scale.is_finite() || scale <= 1.0 {
            anyhow::bail!("Invalid mobile axis scale: {scale} (must be > 1)");
        }

        if self.maintenance.interval_ms == 0 {
            anyhow::bail!("Maintenance interval must be non-zero");
        }

        if self.viewer.queue_capacity == 0 {
            anyhow::bail!("Viewer queue capacity must be non-zero");
        }

        let mut seen = HashSet::new();
        for id in &self.assets.pool {
            if id.trim().is_empty() {
                anyhow::bail!("Asset pool contains an empty id");
            }
            if !seen.insert(id.as_str()) {
                anyhow::bail!("Asset pool contains duplicate id: {id}");
            }
        }

        for (name, url) in [
            ("ingest_url", &self.forwarder.ingest_url),
            ("query_url", &self.forwarder.query_url),
        ] {
            if let Some(url) = url {
                Url::parse(url).with_context(|| format!("Invalid forwarder {name}: {url}"))?;
            }
        }

        if self.forwarder.timeout_ms == 0 {
            anyhow::bail!("Forwarder timeout must be non-zero");
        }

        Ok(())
    }

    /// Divisor for one ingestion route.
    ///
    /// A scale that fails validation falls back to the vehicle scale.
    pub fn axis_scale(&self, path: IngestPath) -> AxisScale {
        match path {
            IngestPath::Vehicle => AxisScale::VEHICLE,
            IngestPath::Mobile => {
                AxisScale::new(self.detection.mobile_axis_scale).unwrap_or(AxisScale::VEHICLE)
            }
        }
    }

    /// Build the detector described by this configuration.
    pub fn detector(&self) -> EventDetector {
        EventDetector::new(
            self.detection.threshold_g,
            LifetimeModel::new(self.lifetime.wear_per_event, self.lifetime.floor),
        )
    }

    /// Build a fresh asset allocator.
    pub fn asset_allocator(&self) -> AssetIdAllocator {
        AssetIdAllocator::new(self.assets.pool.iter().cloned())
    }
}
