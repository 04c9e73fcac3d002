//! Fire-and-forget mirror of detected events to an external time-series store
//!
//! Each event becomes one batched ingest request carrying the raw reading,
//! the lifespan estimate and the per-kind counter. Requests run on detached
//! tasks; failures are logged and counted, never retried.

use std::sync::Arc;

use anyhow::{Context, Result};
use fleetwear_core::{AssetId, DriveEvent, EventKind};
use fleetwear_errors::ForwardError;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ForwarderConfig;
use crate::observability::ServiceMetrics;

/// Datapoint quality flag the store treats as "good".
const QUALITY_GOOD: u8 = 3;

/// Longest upstream error body kept in a [`ForwardError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Everything one forward needs, detached from registry state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardRecord {
    /// Device identifier
    pub device_id: String,
    /// External asset id, if assigned
    pub asset_id: Option<AssetId>,
    /// Device timestamp of the triggering sample
    pub timestamp: u64,
    /// Scaled reading that crossed the threshold
    pub measured: f64,
    /// Crossing direction
    pub kind: EventKind,
    /// Lifetime estimate after the event
    pub lifetime: u64,
    /// New counter value for `kind`
    pub count: u64,
}

impl From<&DriveEvent> for ForwardRecord {
    fn from(event: &DriveEvent) -> Self {
        Self {
            device_id: event.device_id.clone(),
            asset_id: event.asset_id.clone(),
            timestamp: event.timestamp,
            measured: event.measured,
            kind: event.kind,
            lifetime: event.lifetime,
            count: event.count,
        }
    }
}

impl ForwardRecord {
    /// Tag prefix: the asset id, or the device id when none was assigned.
    pub fn tag_prefix(&self) -> &str {
        self.asset_id
            .as_ref()
            .map_or(self.device_id.as_str(), AssetId::as_str)
    }

    /// Batched ingest body.
    pub fn to_payload(&self) -> Value {
        let prefix = self.tag_prefix();
        let attributes = json!({ "device": self.device_id });
        let ts = self.timestamp;

        json!({
            "messageId": ts.to_string(),
            "body": [
                {
                    "name": format!("{prefix}.{}", self.kind),
                    "datapoints": [[ts, self.measured, QUALITY_GOOD]],
                    "attributes": attributes,
                },
                {
                    "name": format!("{prefix}.lifespan"),
                    "datapoints": [[ts, self.lifetime, QUALITY_GOOD]],
                    "attributes": attributes,
                },
                {
                    "name": format!("{prefix}.{}_count", self.kind),
                    "datapoints": [[ts, self.count, QUALITY_GOOD]],
                    "attributes": attributes,
                },
            ]
        })
    }
}

/// Raw upstream reply relayed by the query pass-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    /// Upstream HTTP status
    pub status: u16,
    /// Upstream `Content-Type`, if any
    pub content_type: Option<String>,
    /// Upstream body
    pub body: String,
}

/// Client for the external time-series store.
#[derive(Clone)]
pub struct TimeSeriesForwarder {
    client: Client,
    config: Arc<ForwarderConfig>,
    metrics: ServiceMetrics,
}

impl TimeSeriesForwarder {
    /// Create a forwarder.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: ForwarderConfig, metrics: ServiceMetrics) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("fleetwear/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config: Arc::new(config),
            metrics,
        })
    }

    /// Whether an ingest endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.ingest_url.is_some()
    }

    /// Send `record` on a detached task.
    ///
    /// Returns `None` when forwarding is disabled. Callers normally drop the
    /// handle; tests await it.
    pub fn forward(&self, record: ForwardRecord) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            debug!(device_id = %record.device_id, "Forwarding disabled, event not mirrored");
            return None;
        }

        let forwarder = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = forwarder.send(&record).await {
                forwarder.metrics.forward_failed();
                warn!(
                    device_id = %record.device_id,
                    kind = %record.kind,
                    severity = ?e.severity(),
                    error = %e,
                    "Time-series forward failed"
                );
            }
        }))
    }

    /// Send one record and wait for the store's answer.
    ///
    /// # Errors
    ///
    /// Returns a [`ForwardError`] for a missing endpoint, a transport failure
    /// or a non-success status.
    pub async fn send(&self, record: &ForwardRecord) -> Result<(), ForwardError> {
        let url = self
            .config
            .ingest_url
            .as_deref()
            .ok_or(ForwardError::NotConfigured("ingest"))?;

        let request = self
            .authorize(self.client.post(url), &self.config.tenant)
            .json(&record.to_payload());

        let response = request.send().await.map_err(ForwardError::transport)?;
        let status = response.status();
        if status.is_success() {
            debug!(device_id = %record.device_id, status = status.as_u16(), "Event mirrored");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::status(status.as_u16(), truncate(body)))
    }

    /// Read the most recent values of `tag` from the store.
    ///
    /// `tenant` overrides the configured tenant for this request.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::NotConfigured`] without a query endpoint, or
    /// [`ForwardError::Transport`] when the store is unreachable. Upstream
    /// error statuses are relayed in the reply, not as errors.
    pub async fn query(&self, tag: &str, tenant: Option<&str>) -> Result<QueryReply, ForwardError> {
        let url = self
            .config
            .query_url
            .as_deref()
            .ok_or(ForwardError::NotConfigured("query"))?;
        let tenant = tenant
            .filter(|t| !t.is_empty())
            .unwrap_or(self.config.tenant.as_str());

        let body = json!({
            "start": "1y-ago",
            "tags": [{ "name": tag, "limit": 1000, "order": "desc" }],
        });

        let response = self
            .authorize(self.client.post(url), tenant)
            .json(&body)
            .send()
            .await
            .map_err(ForwardError::transport)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(ForwardError::transport)?;

        debug!(tag, status, "Query relayed");
        Ok(QueryReply {
            status,
            content_type,
            body,
        })
    }

    fn authorize(&self, request: RequestBuilder, tenant: &str) -> RequestBuilder {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.header(self.config.tenant_header.as_str(), tenant)
    }
}

fn truncate(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
        body.truncate(idx);
    }
    body
}
