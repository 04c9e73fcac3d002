//! Mock viewer connections.
//!
//! [`RecordingViewer`] keeps every frame it is sent in a shared [`ViewerLog`]
//! the test holds on to after handing the sink to the broadcaster.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetwear_core::{ViewerSink, ViewerUpdate};
use fleetwear_errors::BroadcastError;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct LogInner {
    frames: Mutex<Vec<String>>,
    closed: Mutex<bool>,
    changed: Notify,
}

/// Shared view of what a [`RecordingViewer`] received.
#[derive(Debug, Clone, Default)]
pub struct ViewerLog {
    inner: Arc<LogInner>,
}

impl ViewerLog {
    /// Raw text frames in arrival order.
    pub fn frames(&self) -> Vec<String> {
        self.inner.frames.lock().clone()
    }

    /// Frames decoded as viewer updates; undecodable frames are skipped.
    pub fn updates(&self) -> Vec<ViewerUpdate> {
        self.inner
            .frames
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Number of frames received.
    pub fn len(&self) -> usize {
        self.inner.frames.lock().len()
    }

    /// True when nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the sink was closed.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.lock()
    }

    /// Wait until at least `count` frames arrived or `timeout` elapsed.
    /// Returns the number of frames seen.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.changed.notified();
            let seen = self.len();
            if seen >= count {
                return seen;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len();
            }
        }
    }

    /// Wait until the sink is closed or `timeout` elapsed.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.changed.notified();
            if self.is_closed() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_closed();
            }
        }
    }
}

/// Viewer sink that records frames.
#[derive(Debug, Default)]
pub struct RecordingViewer {
    log: ViewerLog,
    write_delay: Option<Duration>,
}

impl RecordingViewer {
    /// Create a sink and the log that observes it.
    pub fn new() -> (Self, ViewerLog) {
        let log = ViewerLog::default();
        (
            Self {
                log: log.clone(),
                write_delay: None,
            },
            log,
        )
    }

    /// Create a sink that sleeps before each write, to simulate a slow
    /// transport.
    pub fn slow(delay: Duration) -> (Self, ViewerLog) {
        let (mut sink, log) = Self::new();
        sink.write_delay = Some(delay);
        (sink, log)
    }
}

#[async_trait]
impl ViewerSink for RecordingViewer {
    async fn send_text(&mut self, text: String) -> Result<(), BroadcastError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.log.inner.frames.lock().push(text);
        self.log.inner.changed.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) {
        *self.log.inner.closed.lock() = true;
        self.log.inner.changed.notify_waiters();
    }
}

/// Viewer sink whose every write fails.
#[derive(Debug, Default)]
pub struct FailingViewer {
    attempts: Arc<Mutex<usize>>,
}

impl FailingViewer {
    /// Create a failing sink and a counter of attempted writes.
    pub fn new() -> (Self, Arc<Mutex<usize>>) {
        let attempts = Arc::new(Mutex::new(0));
        (
            Self {
                attempts: Arc::clone(&attempts),
            },
            attempts,
        )
    }
}

#[async_trait]
impl ViewerSink for FailingViewer {
    async fn send_text(&mut self, _text: String) -> Result<(), BroadcastError> {
        *self.attempts.lock() += 1;
        Err(BroadcastError::write_failed("connection reset by peer"))
    }
}
