//! Hard-acceleration and hard-braking detection.
//!
//! A sample is checked twice, acceleration first and braking second. Both
//! checks may fire for the same sample, and consumers see the acceleration
//! event before the braking event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assets::AssetId;
use crate::lifetime::LifetimeModel;
use crate::registry::DeviceState;
use crate::sample::{AxisScale, TelemetrySample};

/// Default detection threshold in g.
pub const DEFAULT_THRESHOLD_G: f64 = 1.2;

/// Which crossing an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// x or y above the positive threshold
    HardAcceleration,
    /// x or y below the negative threshold
    HardBraking,
}

impl EventKind {
    /// Stable tag used in metrics and time-series names.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::HardAcceleration => "hard_acceleration",
            EventKind::HardBraking => "hard_braking",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveEvent {
    /// Crossing direction
    pub kind: EventKind,
    /// Device identifier
    pub device_id: String,
    /// Asset id, if the device has one
    pub asset_id: Option<AssetId>,
    /// Device timestamp of the triggering sample
    pub timestamp: u64,
    /// New counter value for `kind`
    pub count: u64,
    /// Last reported odometer value
    pub odometer: Option<f64>,
    /// Remaining-life estimate after this event
    pub lifetime: u64,
    /// Scaled reading that crossed the threshold
    pub measured: f64,
}

/// What a single sample produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
    acceleration: Option<DriveEvent>,
    braking: Option<DriveEvent>,
}

impl EventOutcome {
    /// Events in emission order: acceleration, then braking.
    pub fn events(&self) -> impl Iterator<Item = &DriveEvent> {
        self.acceleration.iter().chain(self.braking.iter())
    }

    /// Owned events in emission order.
    pub fn into_events(self) -> Vec<DriveEvent> {
        self.acceleration.into_iter().chain(self.braking).collect()
    }

    /// The acceleration event, if one fired.
    pub fn acceleration(&self) -> Option<&DriveEvent> {
        self.acceleration.as_ref()
    }

    /// The braking event, if one fired.
    pub fn braking(&self) -> Option<&DriveEvent> {
        self.braking.as_ref()
    }

    /// Number of events fired (0, 1 or 2).
    pub fn len(&self) -> usize {
        usize::from(self.acceleration.is_some()) + usize::from(self.braking.is_some())
    }

    /// True when the sample stayed within the threshold band.
    pub fn is_empty(&self) -> bool {
        self.acceleration.is_none() && self.braking.is_none()
    }
}

/// Classifies samples against a symmetric g threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventDetector {
    threshold: f64,
    model: LifetimeModel,
}

impl EventDetector {
    /// Create a detector.
    pub fn new(threshold: f64, model: LifetimeModel) -> Self {
        Self { threshold, model }
    }

    /// Detection threshold in g.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Lifetime model used for event payloads.
    pub fn model(&self) -> &LifetimeModel {
        &self.model
    }

    /// Check one sample, bumping the device's counters for each crossing.
    ///
    /// `scale` divides x and y; `ceiling` is the lifetime ceiling the event
    /// payloads are computed against.
    pub fn detect(
        &self,
        sample: &TelemetrySample,
        device: &mut DeviceState,
        scale: AxisScale,
        ceiling: u64,
    ) -> EventOutcome {
        let x = scale.apply(sample.x);
        let y = scale.apply(sample.y);
        let mut outcome = EventOutcome::default();

        if x > self.threshold || y > self.threshold {
            let count = device.record_hard_accel();
            outcome.acceleration = Some(self.event(
                EventKind::HardAcceleration,
                sample,
                device,
                count,
                ceiling,
                x.max(y),
            ));
        }

        if x < -self.threshold || y < -self.threshold {
            let count = device.record_hard_brake();
            outcome.braking = Some(self.event(
                EventKind::HardBraking,
                sample,
                device,
                count,
                ceiling,
                x.min(y),
            ));
        }

        outcome
    }

    fn event(
        &self,
        kind: EventKind,
        sample: &TelemetrySample,
        device: &DeviceState,
        count: u64,
        ceiling: u64,
        measured: f64,
    ) -> DriveEvent {
        DriveEvent {
            kind,
            device_id: sample.id.clone(),
            asset_id: device.asset_id().cloned(),
            timestamp: sample.timestamp,
            count,
            odometer: device.odometer(),
            lifetime: device.lifetime(&self.model, ceiling),
            measured,
        }
    }
}

impl Default for EventDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_G, LifetimeModel::default())
    }
}
