//! Per-device state and the registry that owns it.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assets::{AssetId, AssetIdAllocator};
use crate::lifetime::LifetimeModel;
use crate::sample::TelemetrySample;

/// Everything tracked for one device identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    started_at: u64,
    asset_id: Option<AssetId>,
    odometer: Option<f64>,
    hard_accel_count: u64,
    hard_brake_count: u64,
}

impl DeviceState {
    fn new(started_at: u64, asset_id: Option<AssetId>) -> Self {
        Self {
            started_at,
            asset_id,
            odometer: None,
            hard_accel_count: 0,
            hard_brake_count: 0,
        }
    }

    /// Timestamp of the first sample seen for this device.
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Asset id, unless the pool was exhausted when the device appeared.
    pub fn asset_id(&self) -> Option<&AssetId> {
        self.asset_id.as_ref()
    }

    /// Last reported odometer value.
    pub fn odometer(&self) -> Option<f64> {
        self.odometer
    }

    /// Hard accelerations detected so far.
    pub fn hard_accel_count(&self) -> u64 {
        self.hard_accel_count
    }

    /// Hard brakings detected so far.
    pub fn hard_brake_count(&self) -> u64 {
        self.hard_brake_count
    }

    /// Remaining life for this device under `model` and `ceiling`.
    pub fn lifetime(&self, model: &LifetimeModel, ceiling: u64) -> u64 {
        model.estimate(ceiling, self.hard_accel_count, self.hard_brake_count)
    }

    pub(crate) fn record_hard_accel(&mut self) -> u64 {
        self.hard_accel_count = self.hard_accel_count.saturating_add(1);
        self.hard_accel_count
    }

    pub(crate) fn record_hard_brake(&mut self) -> u64 {
        self.hard_brake_count = self.hard_brake_count.saturating_add(1);
        self.hard_brake_count
    }

    fn update_odometer(&mut self, miles: Option<f64>) {
        if miles.is_some() {
            self.odometer = miles;
        }
    }

    fn snapshot(&self, device_id: &str, model: &LifetimeModel, ceiling: u64) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: device_id.to_owned(),
            asset_id: self.asset_id.clone(),
            started_at: self.started_at,
            odometer: self.odometer,
            hard_accel_count: self.hard_accel_count,
            hard_brake_count: self.hard_brake_count,
            lifetime: self.lifetime(model, ceiling),
        }
    }
}

/// Point-in-time copy of one device, as served by the snapshot query and
/// pushed by the maintenance task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Device identifier
    pub device_id: String,
    /// Assigned asset id, if any
    pub asset_id: Option<AssetId>,
    /// First-seen timestamp
    pub started_at: u64,
    /// Last reported odometer value
    pub odometer: Option<f64>,
    /// Hard accelerations detected
    pub hard_accel_count: u64,
    /// Hard brakings detected
    pub hard_brake_count: u64,
    /// Remaining-life estimate at snapshot time
    pub lifetime: u64,
}

struct RegistryInner {
    devices: HashMap<String, DeviceState>,
    assets: AssetIdAllocator,
}

/// Single owner of every [`DeviceState`].
///
/// The device map and the asset allocator share one lock: creating a device,
/// drawing its asset id, overwriting the odometer and bumping counters all
/// happen inside one critical section, and a reset clears both together.
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    /// Create an empty registry drawing ids from `assets`.
    pub fn new(assets: AssetIdAllocator) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                devices: HashMap::new(),
                assets,
            }),
        }
    }

    /// Look up or create the device named by `sample`, refresh its odometer
    /// and run `f` on the live entry.
    ///
    /// `f` runs with the registry lock held, so it must not block.
    pub fn observe<R>(&self, sample: &TelemetrySample, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let mut inner = self.inner.lock();
        let RegistryInner { devices, assets } = &mut *inner;

        let device = devices.entry(sample.id.clone()).or_insert_with(|| {
            let asset_id = assets.allocate();
            match &asset_id {
                Some(asset) => debug!(device_id = %sample.id, asset_id = %asset, "New device"),
                None => debug!(device_id = %sample.id, "New device; asset pool exhausted"),
            }
            DeviceState::new(sample.timestamp, asset_id)
        });
        device.update_odometer(sample.odometer);
        f(device)
    }

    /// Snapshot of one device.
    pub fn get(&self, device_id: &str, model: &LifetimeModel, ceiling: u64) -> Option<DeviceSnapshot> {
        let inner = self.inner.lock();
        inner
            .devices
            .get(device_id)
            .map(|state| state.snapshot(device_id, model, ceiling))
    }

    /// Consistent snapshot of every tracked device. Order is unspecified.
    pub fn snapshot_all(&self, model: &LifetimeModel, ceiling: u64) -> Vec<DeviceSnapshot> {
        let inner = self.inner.lock();
        inner
            .devices
            .iter()
            .map(|(id, state)| state.snapshot(id, model, ceiling))
            .collect()
    }

    /// Forget every device and reseed the asset pool.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.devices.clear();
        inner.assets.reset();
    }

    /// Number of tracked devices.
    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    /// True when no device has been observed since start or the last reset.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asset ids still unassigned.
    pub fn assets_remaining(&self) -> usize {
        self.inner.lock().assets.remaining()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(AssetIdAllocator::default())
    }
}
