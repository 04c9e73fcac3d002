//! Periodic lifetime credit and snapshot refresh

use std::time::Duration;

use fleetwear_core::ViewerUpdate;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::ingestion::IngestionService;

/// Background task that raises the lifetime ceiling and republishes every
/// device on a fixed interval.
pub struct MaintenanceTicker {
    service: IngestionService,
    period: Duration,
    credit: u64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceTicker {
    /// Create a stopped ticker.
    pub fn new(service: IngestionService, period: Duration, credit: u64) -> Self {
        Self {
            service,
            period,
            credit,
            handle: Mutex::new(None),
        }
    }

    /// Run one credit and republish step. Returns the number of snapshots
    /// published.
    pub fn tick(&self) -> usize {
        run_tick(&self.service, self.credit)
    }

    /// Start the periodic task. A second call while running is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let service = self.service.clone();
        let (period, credit) = (self.period, self.credit);
        *handle = Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                run_tick(&service, credit);
            }
        }));

        info!(
            period = ?self.period,
            credit = self.credit,
            "Maintenance ticker started"
        );
    }

    /// Abort the periodic task.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!("Maintenance ticker stopped");
        }
    }

    /// Whether the periodic task is running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

fn run_tick(service: &IngestionService, credit: u64) -> usize {
    let ceiling = service.state().credit(credit);
    let snapshots = service.snapshot();
    let published = snapshots.len();

    for snapshot in snapshots {
        service.publish(ViewerUpdate::Snapshot(snapshot));
    }

    service
        .metrics()
        .set_state(service.state().device_count(), ceiling);
    debug!(ceiling, published, "Maintenance tick");
    published
}

impl Drop for MaintenanceTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::config::ForwarderConfig;
    use crate::forwarder::TimeSeriesForwarder;
    use crate::observability::ServiceMetrics;
    use fleetwear_core::{AxisScale, IngestPath, SystemState};
    use fleetwear_test_helpers::prelude::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    fn service() -> Result<IngestionService, Box<dyn std::error::Error>> {
        let metrics = ServiceMetrics::new()?;
        let (broadcaster, _) = Broadcaster::spawn(64, metrics.clone());
        let forwarder = TimeSeriesForwarder::new(ForwarderConfig::default(), metrics.clone())?;
        Ok(IngestionService::new(
            Arc::new(SystemState::default()),
            broadcaster,
            forwarder,
            metrics,
            AxisScale::VEHICLE,
        ))
    }

    #[tokio::test]
    async fn test_tick_credits_and_republishes() -> TestResult {
        let service = service()?;
        let (viewer, log) = RecordingViewer::new();
        service.attach_viewer(Box::new(viewer))?;
        service.ingest(IngestPath::Vehicle, &hard_accel("car1", 1))?;
        service.ingest(IngestPath::Vehicle, &quiet("car2", 2))?;

        let ticker = MaintenanceTicker::new(service.clone(), Duration::from_secs(60), 250);
        assert_eq!(ticker.tick(), 2);
        assert_eq!(service.state().ceiling(), 100_250);

        // One event frame, then two snapshots.
        assert_eq!(log.wait_for(3, WAIT).await, 3);
        let snapshots: Vec<_> = log
            .updates()
            .into_iter()
            .filter_map(|u| match u {
                ViewerUpdate::Snapshot(s) => Some(s),
                ViewerUpdate::Event(_) => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 2);
        let car1 = must_some(
            snapshots.iter().find(|s| s.device_id == "car1"),
            "car1 snapshot",
        );
        assert_eq!(car1.lifetime, 100_150);
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_with_no_devices_still_credits() -> TestResult {
        let service = service()?;
        let ticker = MaintenanceTicker::new(service.clone(), Duration::from_secs(60), 250);
        assert_eq!(ticker.tick(), 0);
        assert_eq!(ticker.tick(), 0);
        assert_eq!(service.state().ceiling(), 100_500);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_until_stopped() -> TestResult {
        let service = service()?;
        let ticker = MaintenanceTicker::new(service.clone(), Duration::from_millis(2_000), 250);
        ticker.start();
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(service.state().ceiling(), 100_750);

        ticker.stop();
        assert!(!ticker.is_running());
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(service.state().ceiling(), 100_750);
        Ok(())
    }
}
