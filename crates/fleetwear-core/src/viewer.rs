//! What the dashboard viewer receives, and the seam it is written through.

use async_trait::async_trait;
use fleetwear_errors::BroadcastError;
use serde::{Deserialize, Serialize};

use crate::detector::DriveEvent;
use crate::registry::DeviceSnapshot;

/// One push frame, encoded as a JSON text message tagged on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerUpdate {
    /// A detected crossing
    Event(DriveEvent),
    /// Periodic per-device refresh from the maintenance task
    Snapshot(DeviceSnapshot),
}

impl ViewerUpdate {
    /// Device the update concerns.
    pub fn device_id(&self) -> &str {
        match self {
            ViewerUpdate::Event(event) => &event.device_id,
            ViewerUpdate::Snapshot(snapshot) => &snapshot.device_id,
        }
    }

    /// Encode as the JSON text frame sent to the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, BroadcastError> {
        serde_json::to_string(self).map_err(|e| BroadcastError::Encode(e.to_string()))
    }
}

impl From<DriveEvent> for ViewerUpdate {
    fn from(event: DriveEvent) -> Self {
        ViewerUpdate::Event(event)
    }
}

impl From<DeviceSnapshot> for ViewerUpdate {
    fn from(snapshot: DeviceSnapshot) -> Self {
        ViewerUpdate::Snapshot(snapshot)
    }
}

/// Outbound half of a viewer connection.
///
/// Exactly one task owns a sink at a time, so implementations never see
/// concurrent writes.
#[async_trait]
pub trait ViewerSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), BroadcastError>;

    /// Close the connection. Called on an explicit detach of the current
    /// viewer or when the writer shuts down, never on supersede.
    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::EventKind;

    #[test]
    fn event_frame_is_tagged() -> Result<(), BroadcastError> {
        let update = ViewerUpdate::Event(DriveEvent {
            kind: EventKind::HardBraking,
            device_id: "car2".into(),
            asset_id: None,
            timestamp: 9,
            count: 3,
            odometer: Some(5.0),
            lifetime: 99_700,
            measured: -2.0,
        });
        let json = update.to_json()?;
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""kind":"hard_braking""#));
        assert!(json.contains(r#""asset_id":null"#));
        assert_eq!(update.device_id(), "car2");
        Ok(())
    }

    #[test]
    fn snapshot_frame_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let update = ViewerUpdate::Snapshot(DeviceSnapshot {
            device_id: "car1".into(),
            asset_id: Some("A1".into()),
            started_at: 1,
            odometer: None,
            hard_accel_count: 2,
            hard_brake_count: 0,
            lifetime: 99_800,
        });
        let back: ViewerUpdate = serde_json::from_str(&update.to_json()?)?;
        assert_eq!(back, update);
        Ok(())
    }
}
