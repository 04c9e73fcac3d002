//! Single-viewer push channel
//!
//! One writer task owns the viewer connection. Request handlers and the
//! maintenance task hand it updates through a bounded queue and never wait on
//! the socket; a full queue drops the update instead of blocking ingestion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fleetwear_core::{ViewerSink, ViewerUpdate};
use fleetwear_errors::BroadcastError;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observability::ServiceMetrics;

enum Control {
    Attach {
        connection: u64,
        sink: Box<dyn ViewerSink>,
    },
    Detach {
        connection: u64,
    },
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped_no_viewer: AtomicU64,
    dropped_full: AtomicU64,
    write_failures: AtomicU64,
    /// Connection id of the attached viewer, 0 when none
    attached: AtomicU64,
}

/// Point-in-time broadcaster counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    /// Updates handed to `publish`
    pub published: u64,
    /// Updates written to a viewer
    pub delivered: u64,
    /// Updates discarded because no viewer was attached
    pub dropped_no_viewer: u64,
    /// Updates discarded because the queue was full
    pub dropped_full: u64,
    /// Writes the transport rejected
    pub write_failures: u64,
    /// Connection id of the attached viewer
    pub connection: Option<u64>,
}

/// Handle to the viewer writer task. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    updates: mpsc::Sender<ViewerUpdate>,
    control: mpsc::UnboundedSender<Control>,
    counters: Arc<Counters>,
    next_connection: Arc<AtomicU64>,
    capacity: usize,
    metrics: ServiceMetrics,
}

impl Broadcaster {
    /// Spawn the writer task with a queue of `capacity` pending updates.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(capacity: usize, metrics: ServiceMetrics) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (updates_tx, updates_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let writer = ViewerWriter {
            updates: updates_rx,
            control: control_rx,
            counters: Arc::clone(&counters),
            metrics: metrics.clone(),
            viewer: None,
        };
        let handle = tokio::spawn(writer.run());

        let broadcaster = Self {
            updates: updates_tx,
            control: control_tx,
            counters,
            next_connection: Arc::new(AtomicU64::new(1)),
            capacity,
            metrics,
        };

        (broadcaster, handle)
    }

    /// Make `sink` the viewer, superseding any previous one.
    ///
    /// Returns the connection id to pass to [`Broadcaster::detach`].
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::WriterClosed`] if the writer has stopped.
    pub fn attach(&self, sink: Box<dyn ViewerSink>) -> Result<u64, BroadcastError> {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.control
            .send(Control::Attach { connection, sink })
            .map_err(|_| BroadcastError::WriterClosed)?;
        Ok(connection)
    }

    /// Drop the viewer if it is still `connection`. Stale ids are ignored.
    pub fn detach(&self, connection: u64) {
        if self.control.send(Control::Detach { connection }).is_err() {
            debug!(connection, "Detach after writer shutdown");
        }
    }

    /// Queue an update for the viewer without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::QueueFull`] when the update was dropped, or
    /// [`BroadcastError::WriterClosed`] if the writer has stopped.
    pub fn publish(&self, update: ViewerUpdate) -> Result<(), BroadcastError> {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        match self.updates.try_send(update) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(update)) => {
                self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                self.metrics.viewer_dropped();
                warn!(
                    device_id = %update.device_id(),
                    capacity = self.capacity,
                    "Viewer queue full, update dropped"
                );
                Err(BroadcastError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(BroadcastError::WriterClosed),
        }
    }

    /// Whether a viewer is currently attached.
    pub fn is_attached(&self) -> bool {
        self.counters.attached.load(Ordering::Acquire) != 0
    }

    /// Current counters.
    pub fn stats(&self) -> BroadcastStats {
        let attached = self.counters.attached.load(Ordering::Acquire);
        BroadcastStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_no_viewer: self.counters.dropped_no_viewer.load(Ordering::Relaxed),
            dropped_full: self.counters.dropped_full.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            connection: (attached != 0).then_some(attached),
        }
    }

    /// Close the viewer and stop the writer task.
    pub fn shutdown(&self) {
        if self.control.send(Control::Shutdown).is_err() {
            debug!("Viewer writer already stopped");
        }
    }
}

struct ViewerWriter {
    updates: mpsc::Receiver<ViewerUpdate>,
    control: mpsc::UnboundedReceiver<Control>,
    counters: Arc<Counters>,
    metrics: ServiceMetrics,
    viewer: Option<(u64, Box<dyn ViewerSink>)>,
}

impl ViewerWriter {
    async fn run(mut self) {
        debug!("Viewer writer started");

        loop {
            tokio::select! {
                biased;

                command = self.control.recv() => match command {
                    Some(Control::Attach { connection, sink }) => self.attach(connection, sink),
                    Some(Control::Detach { connection }) => self.detach(connection).await,
                    Some(Control::Shutdown) | None => break,
                },
                update = self.updates.recv() => match update {
                    Some(update) => self.deliver(update).await,
                    None => break,
                },
            }
        }

        if let Some((connection, mut sink)) = self.viewer.take() {
            sink.close().await;
            debug!(connection, "Viewer closed on shutdown");
        }
        self.counters.attached.store(0, Ordering::Release);
        debug!("Viewer writer stopped");
    }

    fn attach(&mut self, connection: u64, sink: Box<dyn ViewerSink>) {
        // The superseded sink is dropped without a close frame.
        if let Some((previous, _old)) = self.viewer.take() {
            info!(previous, connection, "Viewer superseded");
        } else {
            info!(connection, "Viewer attached");
        }
        self.viewer = Some((connection, sink));
        self.counters.attached.store(connection, Ordering::Release);
    }

    async fn detach(&mut self, connection: u64) {
        let current = self.viewer.as_ref().map(|(id, _)| *id);
        if current != Some(connection) {
            debug!(connection, ?current, "Ignoring detach of stale viewer");
            return;
        }
        if let Some((_, mut sink)) = self.viewer.take() {
            sink.close().await;
        }
        self.counters.attached.store(0, Ordering::Release);
        info!(connection, "Viewer detached");
    }

    async fn deliver(&mut self, update: ViewerUpdate) {
        let Some((connection, sink)) = self.viewer.as_mut() else {
            self.counters.dropped_no_viewer.fetch_add(1, Ordering::Relaxed);
            self.metrics.viewer_dropped();
            debug!(device_id = %update.device_id(), "No viewer attached, update dropped");
            return;
        };
        let connection = *connection;

        let text = match update.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode viewer update");
                return;
            }
        };

        match sink.send_text(text).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.viewer_dropped();
                warn!(connection, error = %e, "Viewer write failed, detaching");
                self.viewer = None;
                self.counters.attached.store(0, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwear_core::{AssetId, DeviceSnapshot};
    use fleetwear_test_helpers::prelude::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn snapshot(id: &str) -> ViewerUpdate {
        ViewerUpdate::Snapshot(DeviceSnapshot {
            device_id: id.to_string(),
            asset_id: Some(AssetId::new("asset-01")),
            started_at: 1,
            odometer: None,
            hard_accel_count: 0,
            hard_brake_count: 0,
            lifetime: 100_000,
        })
    }

    fn spawn(capacity: usize) -> Broadcaster {
        let metrics = must(ServiceMetrics::new());
        Broadcaster::spawn(capacity, metrics).0
    }

    async fn eventually(broadcaster: &Broadcaster, check: impl Fn(&BroadcastStats) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if check(&broadcaster.stats()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_delivers_in_publish_order() -> TestResult {
        let broadcaster = spawn(16);
        let (viewer, log) = RecordingViewer::new();
        broadcaster.attach(Box::new(viewer))?;

        for id in ["car1", "car2", "car3"] {
            broadcaster.publish(snapshot(id))?;
        }

        assert_eq!(log.wait_for(3, WAIT).await, 3);
        let ids: Vec<String> = log
            .updates()
            .iter()
            .map(|u| u.device_id().to_string())
            .collect();
        assert_eq!(ids, vec!["car1", "car2", "car3"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_viewer_drops_silently() -> TestResult {
        let broadcaster = spawn(16);
        broadcaster.publish(snapshot("car1"))?;
        broadcaster.publish(snapshot("car2"))?;

        assert!(eventually(&broadcaster, |s| s.dropped_no_viewer == 2).await);
        assert!(!broadcaster.is_attached());
        assert_eq!(broadcaster.stats().delivered, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_new_viewer_supersedes_old() -> TestResult {
        let broadcaster = spawn(16);
        let (first, first_log) = RecordingViewer::new();
        let (second, second_log) = RecordingViewer::new();

        let first_id = broadcaster.attach(Box::new(first))?;
        broadcaster.publish(snapshot("car1"))?;
        assert_eq!(first_log.wait_for(1, WAIT).await, 1);

        let second_id = broadcaster.attach(Box::new(second))?;
        assert_ne!(first_id, second_id);

        broadcaster.publish(snapshot("car2"))?;
        assert_eq!(second_log.wait_for(1, WAIT).await, 1);
        assert_eq!(broadcaster.stats().connection, Some(second_id));

        // Superseded without a close frame and without further updates.
        assert!(!first_log.is_closed());
        assert_eq!(first_log.len(), 1);
        assert!(!first_log.wait_closed(Duration::from_millis(50)).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_detach_is_ignored() -> TestResult {
        let broadcaster = spawn(16);
        let (first, first_log) = RecordingViewer::new();
        let (second, second_log) = RecordingViewer::new();

        let first_id = broadcaster.attach(Box::new(first))?;
        let second_id = broadcaster.attach(Box::new(second))?;
        broadcaster.detach(first_id);

        broadcaster.publish(snapshot("car1"))?;
        assert_eq!(second_log.wait_for(1, WAIT).await, 1);
        assert!(!second_log.is_closed());
        assert!(!first_log.is_closed());
        assert_eq!(broadcaster.stats().connection, Some(second_id));
        Ok(())
    }

    #[tokio::test]
    async fn test_detach_closes_current_viewer() -> TestResult {
        let broadcaster = spawn(16);
        let (viewer, log) = RecordingViewer::new();
        let id = broadcaster.attach(Box::new(viewer))?;
        broadcaster.detach(id);

        assert!(log.wait_closed(WAIT).await);
        assert!(eventually(&broadcaster, |s| s.connection.is_none()).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_failure_detaches_viewer() -> TestResult {
        let broadcaster = spawn(16);
        let (viewer, attempts) = FailingViewer::new();
        broadcaster.attach(Box::new(viewer))?;

        broadcaster.publish(snapshot("car1"))?;
        assert!(eventually(&broadcaster, |s| s.write_failures == 1).await);
        assert!(!broadcaster.is_attached());

        broadcaster.publish(snapshot("car2"))?;
        assert!(eventually(&broadcaster, |s| s.dropped_no_viewer == 1).await);
        assert_eq!(*attempts.lock(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() -> TestResult {
        let broadcaster = spawn(1);
        let (viewer, _log) = RecordingViewer::slow(Duration::from_millis(200));
        broadcaster.attach(Box::new(viewer))?;

        let results: Vec<_> = (0..10)
            .map(|i| broadcaster.publish(snapshot(&format!("car{i}"))))
            .collect();

        let dropped = results
            .iter()
            .filter(|r| matches!(r, Err(BroadcastError::QueueFull { capacity: 1 })))
            .count();
        assert!(dropped >= 8, "expected most updates dropped, got {dropped}");
        assert_eq!(broadcaster.stats().dropped_full, dropped as u64);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_closes_viewer() -> TestResult {
        let metrics = ServiceMetrics::new()?;
        let (broadcaster, handle) = Broadcaster::spawn(4, metrics);
        let (viewer, log) = RecordingViewer::new();
        broadcaster.attach(Box::new(viewer))?;

        broadcaster.shutdown();
        tokio::time::timeout(WAIT, handle).await??;
        assert!(log.is_closed());
        assert!(matches!(
            broadcaster.attach(Box::new(RecordingViewer::new().0)),
            Err(BroadcastError::WriterClosed)
        ));
        Ok(())
    }
}
