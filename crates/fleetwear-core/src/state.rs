//! Process-wide state shared by request workers and the maintenance task.

use crate::assets::AssetIdAllocator;
use crate::detector::{EventDetector, EventOutcome};
use crate::lifetime::{LifetimeCeiling, LifetimeModel};
use crate::registry::{DeviceRegistry, DeviceSnapshot};
use crate::sample::{AxisScale, TelemetrySample};

/// Registry, asset pool and lifetime ceiling behind narrow, lock-guarded
/// methods. One instance per service, shared through an `Arc`.
pub struct SystemState {
    registry: DeviceRegistry,
    ceiling: LifetimeCeiling,
    detector: EventDetector,
}

impl SystemState {
    /// Create the state with an empty registry.
    pub fn new(detector: EventDetector, assets: AssetIdAllocator, initial_ceiling: u64) -> Self {
        Self {
            registry: DeviceRegistry::new(assets),
            ceiling: LifetimeCeiling::new(initial_ceiling),
            detector,
        }
    }

    /// Fold one validated sample into its device and run detection.
    pub fn record(&self, sample: &TelemetrySample, scale: AxisScale) -> EventOutcome {
        let ceiling = self.ceiling.get();
        self.registry
            .observe(sample, |device| self.detector.detect(sample, device, scale, ceiling))
    }

    /// Snapshot of every tracked device against the current ceiling.
    pub fn snapshot_all(&self) -> Vec<DeviceSnapshot> {
        self.registry.snapshot_all(self.detector.model(), self.ceiling.get())
    }

    /// Snapshot of one device.
    pub fn device(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.registry
            .get(device_id, self.detector.model(), self.ceiling.get())
    }

    /// Clear every device and reseed the asset pool. The ceiling keeps its
    /// accumulated credit.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Raise the lifetime ceiling, returning the new value.
    pub fn credit(&self, amount: u64) -> u64 {
        self.ceiling.raise(amount)
    }

    /// Current lifetime ceiling.
    pub fn ceiling(&self) -> u64 {
        self.ceiling.get()
    }

    /// Number of tracked devices.
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Lifetime model in use.
    pub fn model(&self) -> &LifetimeModel {
        self.detector.model()
    }

    /// Detector in use.
    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new(EventDetector::default(), AssetIdAllocator::default(), 100_000)
    }
}
