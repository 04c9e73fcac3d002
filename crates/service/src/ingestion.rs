//! Per-sample orchestration
//!
//! Parse, fold into the registry, then for each event in detection order
//! push to the viewer and mirror to the time-series store. Only the registry
//! step is synchronous with the caller; the push is a queue hand-off and the
//! mirror is a detached task.

use std::sync::Arc;

use fleetwear_core::{
    AxisScale, DeviceSnapshot, DriveEvent, IngestPath, SystemState, TelemetrySample, ViewerSink,
    ViewerUpdate, parse_envelope,
};
use fleetwear_errors::{BroadcastError, IngestError};
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::forwarder::{ForwardRecord, TimeSeriesForwarder};
use crate::observability::{LoggingSpans, ServiceMetrics};

/// Entry point for every inbound sample and command.
#[derive(Clone)]
pub struct IngestionService {
    state: Arc<SystemState>,
    broadcaster: Broadcaster,
    forwarder: TimeSeriesForwarder,
    metrics: ServiceMetrics,
    mobile_scale: AxisScale,
}

impl IngestionService {
    /// Wire the service together.
    pub fn new(
        state: Arc<SystemState>,
        broadcaster: Broadcaster,
        forwarder: TimeSeriesForwarder,
        metrics: ServiceMetrics,
        mobile_scale: AxisScale,
    ) -> Self {
        Self {
            state,
            broadcaster,
            forwarder,
            metrics,
            mobile_scale,
        }
    }

    /// Divisor for one route.
    pub fn axis_scale(&self, path: IngestPath) -> AxisScale {
        match path {
            IngestPath::Vehicle => AxisScale::VEHICLE,
            IngestPath::Mobile => self.mobile_scale,
        }
    }

    /// Parse a request body and ingest it.
    ///
    /// Malformed bodies are logged, counted and dropped; the result is then
    /// empty and the caller still acknowledges the request.
    pub fn ingest_bytes(&self, path: IngestPath, body: &[u8]) -> Vec<DriveEvent> {
        match parse_envelope(body).and_then(|sample| self.ingest(path, &sample)) {
            Ok(events) => events,
            Err(e) => {
                self.metrics.malformed();
                warn!(%path, severity = ?e.severity(), error = %e, "Dropping malformed telemetry");
                Vec::new()
            }
        }
    }

    /// Ingest one sample, returning the events it produced in emission
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestError`] if the sample fails validation; nothing is
    /// recorded in that case.
    pub fn ingest(
        &self,
        path: IngestPath,
        sample: &TelemetrySample,
    ) -> Result<Vec<DriveEvent>, IngestError> {
        sample.validate()?;

        let span = LoggingSpans::ingest_span(&sample.id, path);
        let _guard = span.enter();

        self.metrics.sample(path);
        let outcome = self.state.record(sample, self.axis_scale(path));
        self.metrics
            .set_state(self.state.device_count(), self.state.ceiling());

        let events = outcome.into_events();
        for event in &events {
            self.metrics.event(event.kind);
            info!(
                kind = %event.kind,
                count = event.count,
                lifetime = event.lifetime,
                asset_id = ?event.asset_id,
                "Hard event detected"
            );

            self.publish(ViewerUpdate::Event(event.clone()));
            // The mirror runs detached.
            drop(self.forwarder.forward(ForwardRecord::from(event)));
        }

        Ok(events)
    }

    /// Hand one update to the viewer writer. Failures are logged only.
    pub fn publish(&self, update: ViewerUpdate) {
        match self.broadcaster.publish(update) {
            Ok(()) => {}
            // Already logged and counted by the broadcaster.
            Err(BroadcastError::QueueFull { .. }) => {}
            Err(e) => warn!(error = %e, "Viewer publish failed"),
        }
    }

    /// Current registry contents.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.state.snapshot_all()
    }

    /// Clear every device and reseed the asset pool.
    pub fn reset(&self) {
        let cleared = self.state.device_count();
        self.state.reset();
        self.metrics.set_state(0, self.state.ceiling());
        info!(cleared, "Registry reset");
    }

    /// Make `sink` the dashboard viewer, superseding any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::WriterClosed`] during shutdown.
    pub fn attach_viewer(&self, sink: Box<dyn ViewerSink>) -> Result<u64, BroadcastError> {
        let connection = self.broadcaster.attach(sink)?;
        debug!(connection, "Viewer attach requested");
        Ok(connection)
    }

    /// Release `connection` if it is still the attached viewer.
    pub fn detach_viewer(&self, connection: u64) {
        self.broadcaster.detach(connection);
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<SystemState> {
        &self.state
    }

    /// Viewer push channel.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Time-series client.
    pub fn forwarder(&self) -> &TimeSeriesForwarder {
        &self.forwarder
    }

    /// Service metrics.
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForwarderConfig, ServiceConfig};
    use fleetwear_core::{AssetId, AssetIdAllocator, EventKind};
    use fleetwear_test_helpers::prelude::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn service(pool: &[&str]) -> TestResult<IngestionService> {
        let config = ServiceConfig::default();
        let metrics = ServiceMetrics::new()?;
        let state = Arc::new(SystemState::new(
            config.detector(),
            AssetIdAllocator::new(pool.iter().copied()),
            config.lifetime.initial_ceiling,
        ));
        let (broadcaster, _) = Broadcaster::spawn(64, metrics.clone());
        let forwarder = TimeSeriesForwarder::new(ForwarderConfig::default(), metrics.clone())?;
        Ok(IngestionService::new(
            state,
            broadcaster,
            forwarder,
            metrics,
            config.axis_scale(IngestPath::Mobile),
        ))
    }

    type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn test_two_device_scenario() -> TestResult {
        let service = service(&["A1", "A2"])?;

        let car1 = TelemetrySample::new("car1", 1)
            .with_accel(2.0, 0.0, 0.0)
            .with_odometer(10.0);
        let events = service.ingest(IngestPath::Vehicle, &car1)?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::HardAcceleration);
        assert_eq!(events[0].count, 1);
        assert_eq!(events[0].asset_id, Some(AssetId::new("A1")));
        assert_eq!(events[0].lifetime, 99_900);

        let car2 = TelemetrySample::new("car2", 2)
            .with_accel(0.0, -2.0, 0.0)
            .with_odometer(5.0);
        let events = service.ingest(IngestPath::Vehicle, &car2)?;
        assert_eq!(events[0].kind, EventKind::HardBraking);
        assert_eq!(events[0].asset_id, Some(AssetId::new("A2")));

        service.ingest(IngestPath::Vehicle, &quiet("car3", 3))?;
        let car3 = must_some(service.state().device("car3"), "car3 tracked");
        assert_eq!(car3.asset_id, None);
        assert_eq!(car3.lifetime, 100_000);
        assert_eq!(service.snapshot().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_mobile_path_scales_axes() -> TestResult {
        let service = service(&["A1"])?;
        let raw = TelemetrySample::new("phone", 1).with_accel(50.0, 0.0, 0.0);
        let events = service.ingest(IngestPath::Mobile, &raw)?;
        assert_eq!(events.len(), 1);
        assert!((events[0].measured - 2.0).abs() < f64::EPSILON);

        let below = TelemetrySample::new("phone", 2).with_accel(25.0, -25.0, 0.0);
        assert!(service.ingest(IngestPath::Mobile, &below)?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_body_is_dropped_and_counted() -> TestResult {
        let service = service(&["A1"])?;
        assert!(service.ingest_bytes(IngestPath::Vehicle, b"{not json").is_empty());
        assert!(service
            .ingest_bytes(IngestPath::Vehicle, br#"{"id":"","ts":1,"x":0,"y":0}"#)
            .is_empty());
        assert_eq!(service.metrics().malformed_total(), 2);
        assert!(service.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_both_axes_publish_accel_then_brake() -> TestResult {
        let service = service(&["A1"])?;
        let (viewer, log) = RecordingViewer::new();
        service.attach_viewer(Box::new(viewer))?;

        let body = wrapped_body(&TelemetrySample::new("car1", 1).with_accel(2.0, -2.0, 0.0));
        let events = service.ingest_bytes(IngestPath::Vehicle, &body);
        assert_eq!(events.len(), 2);

        assert_eq!(log.wait_for(2, WAIT).await, 2);
        let kinds: Vec<EventKind> = log
            .updates()
            .into_iter()
            .filter_map(|u| match u {
                ViewerUpdate::Event(event) => Some(event.kind),
                ViewerUpdate::Snapshot(_) => None,
            })
            .collect();
        assert_eq!(kinds, vec![EventKind::HardAcceleration, EventKind::HardBraking]);
        assert_eq!(service.metrics().events_total(EventKind::HardBraking), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_without_viewer_still_records() -> TestResult {
        let service = service(&["A1"])?;
        let events = service.ingest_bytes(IngestPath::Vehicle, &bare_body(&hard_accel("car1", 1)));
        assert_eq!(events.len(), 1);
        let car1 = must_some(service.state().device("car1"), "car1 tracked");
        assert_eq!(car1.hard_accel_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_accelerations_accumulate() -> TestResult {
        let service = service(&["A1"])?;
        let mut car1 = SampleFixture::new("car1").with_odometer(42.0);

        let mut lifetimes = Vec::new();
        for sample in car1.accelerations(4) {
            let events = service.ingest(IngestPath::Vehicle, &sample)?;
            assert_eq!(events.len(), 1);
            lifetimes.push(events[0].lifetime);
        }
        assert!(lifetimes.windows(2).all(|w| w[1] < w[0]));

        let quiet_sample = car1.next(0.1, 0.1);
        assert!(service.ingest(IngestPath::Vehicle, &quiet_sample)?.is_empty());

        let state = must_some(service.state().device("car1"), "car1 tracked");
        assert_eq!(state.hard_accel_count, 4);
        assert_eq!(state.hard_brake_count, 0);
        assert!(state.odometer.is_some_and(|m| (m - 42.0).abs() < f64::EPSILON));
        assert_eq!(service.metrics().events_total(EventKind::HardAcceleration), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_reseeds_pool() -> TestResult {
        let service = service(&["A1", "A2"])?;
        service.ingest(IngestPath::Vehicle, &quiet("car1", 1))?;
        service.ingest(IngestPath::Vehicle, &quiet("car2", 2))?;
        service.reset();
        assert!(service.snapshot().is_empty());

        service.ingest(IngestPath::Vehicle, &quiet("car9", 3))?;
        let car9 = must_some(service.state().device("car9"), "car9 tracked");
        assert_eq!(car9.asset_id, Some(AssetId::new("A1")));
        Ok(())
    }
}
