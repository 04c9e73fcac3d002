//! Detection core for fleetwear.
//!
//! Vehicle and phone accelerometers post [`TelemetrySample`]s. Each sample is
//! folded into the per-device [`DeviceState`] held by the [`DeviceRegistry`];
//! the [`EventDetector`] decides whether it counts as a hard acceleration, a
//! hard braking, or both, and the [`LifetimeModel`] turns the accumulated
//! counts into a remaining-life estimate against the shared
//! [`LifetimeCeiling`].
//!
//! [`SystemState`] bundles these into the single process-wide owner that the
//! service hands to every request worker and to the maintenance task.
//!
//! ```
//! use fleetwear_core::{
//!     AssetIdAllocator, AxisScale, EventDetector, LifetimeModel, SystemState, TelemetrySample,
//! };
//!
//! let state = SystemState::new(
//!     EventDetector::new(1.2, LifetimeModel::new(100, 0)),
//!     AssetIdAllocator::new(["A1", "A2"]),
//!     100_000,
//! );
//!
//! let sample = TelemetrySample::new("car1", 1).with_accel(2.0, 0.0, 0.0);
//! let outcome = state.record(&sample, AxisScale::VEHICLE);
//! assert_eq!(outcome.len(), 1);
//! assert_eq!(state.snapshot_all()[0].lifetime, 99_900);
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod assets;
pub mod detector;
pub mod lifetime;
pub mod registry;
pub mod sample;
pub mod state;
pub mod viewer;

pub use assets::{AssetId, AssetIdAllocator};
pub use detector::{DriveEvent, EventDetector, EventKind, EventOutcome};
pub use lifetime::{LifetimeCeiling, LifetimeModel};
pub use registry::{DeviceRegistry, DeviceSnapshot, DeviceState};
pub use sample::{AxisScale, IngestPath, TelemetrySample, parse_envelope};
pub use state::SystemState;
pub use viewer::{ViewerSink, ViewerUpdate};
