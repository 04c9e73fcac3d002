//! Remaining-life estimate and the shared ceiling it is measured against.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Maps event counts to a remaining-life figure.
///
/// `estimate = max(ceiling - wear_per_event * (accel + brake), floor)`,
/// computed with saturating arithmetic so the result never wraps and never
/// drops below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeModel {
    wear_per_event: u64,
    floor: u64,
}

impl LifetimeModel {
    /// Create a model.
    pub const fn new(wear_per_event: u64, floor: u64) -> Self {
        Self {
            wear_per_event,
            floor,
        }
    }

    /// Remaining life for a device with the given counters.
    pub fn estimate(&self, ceiling: u64, hard_accel: u64, hard_brake: u64) -> u64 {
        let events = hard_accel.saturating_add(hard_brake);
        let wear = self.wear_per_event.saturating_mul(events);
        ceiling.saturating_sub(wear).max(self.floor)
    }

    /// Wear charged per detected event.
    pub fn wear_per_event(&self) -> u64 {
        self.wear_per_event
    }

    /// Lowest value the estimate reports.
    pub fn floor(&self) -> u64 {
        self.floor
    }
}

impl Default for LifetimeModel {
    fn default() -> Self {
        Self::new(100, 0)
    }
}

/// Process-wide lifetime ceiling.
///
/// Read by every estimate, raised only by the maintenance task. A single
/// atomic word, so readers never observe a torn value.
#[derive(Debug)]
pub struct LifetimeCeiling(AtomicU64);

impl LifetimeCeiling {
    /// Create a ceiling at its initial value.
    pub fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the ceiling by `credit`, saturating at `u64::MAX`. Returns the
    /// new value.
    pub fn raise(&self, credit: u64) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(credit))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_add(credit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_each_event() {
        let model = LifetimeModel::new(100, 0);
        assert_eq!(model.estimate(100_000, 0, 0), 100_000);
        assert_eq!(model.estimate(100_000, 1, 0), 99_900);
        assert_eq!(model.estimate(100_000, 2, 3), 99_500);
    }

    #[test]
    fn clamps_at_zero() {
        let model = LifetimeModel::new(100, 0);
        assert_eq!(model.estimate(250, 10, 10), 0);
        assert_eq!(model.estimate(250, u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn honors_configured_floor() {
        let model = LifetimeModel::new(1_000, 500);
        assert_eq!(model.estimate(2_000, 1, 0), 1_000);
        assert_eq!(model.estimate(2_000, 5, 0), 500);
    }

    #[test]
    fn ceiling_raise_returns_new_value() {
        let ceiling = LifetimeCeiling::new(100_000);
        assert_eq!(ceiling.raise(250), 100_250);
        assert_eq!(ceiling.get(), 100_250);
    }

    #[test]
    fn ceiling_saturates() {
        let ceiling = LifetimeCeiling::new(u64::MAX - 1);
        assert_eq!(ceiling.raise(250), u64::MAX);
        assert_eq!(ceiling.get(), u64::MAX);
    }
}
