//! Sample builders and request bodies for common test scenarios.

use fleetwear_core::TelemetrySample;

/// Reading comfortably above the default 1.2 g threshold.
pub const HARD_G: f64 = 2.0;

/// Builder for samples with a running timestamp.
#[derive(Debug, Clone)]
pub struct SampleFixture {
    id: String,
    next_ts: u64,
    odometer: Option<f64>,
}

impl SampleFixture {
    /// Start a fixture for `id` at timestamp 1.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_ts: 1,
            odometer: None,
        }
    }

    /// Attach an odometer reading to every subsequent sample.
    pub fn with_odometer(mut self, miles: f64) -> Self {
        self.odometer = Some(miles);
        self
    }

    /// Produce the next sample with the given x and y.
    pub fn next(&mut self, x: f64, y: f64) -> TelemetrySample {
        let mut sample = TelemetrySample::new(self.id.clone(), self.next_ts).with_accel(x, y, 0.0);
        sample.odometer = self.odometer;
        self.next_ts += 1;
        sample
    }

    /// `n` consecutive hard accelerations.
    pub fn accelerations(&mut self, n: usize) -> Vec<TelemetrySample> {
        (0..n).map(|_| self.next(HARD_G, 0.0)).collect()
    }
}

/// A sample that fires a hard acceleration.
pub fn hard_accel(id: &str, ts: u64) -> TelemetrySample {
    TelemetrySample::new(id, ts).with_accel(HARD_G, 0.0, 0.0)
}

/// A sample that fires a hard braking.
pub fn hard_brake(id: &str, ts: u64) -> TelemetrySample {
    TelemetrySample::new(id, ts).with_accel(0.0, -HARD_G, 0.0)
}

/// A sample inside the threshold band.
pub fn quiet(id: &str, ts: u64) -> TelemetrySample {
    TelemetrySample::new(id, ts).with_accel(0.3, -0.4, 1.0)
}

/// Body in the bare-object form.
pub fn bare_body(sample: &TelemetrySample) -> Vec<u8> {
    serde_json::to_vec(sample).unwrap_or_default()
}

/// Body in the `{"data": ...}` form.
pub fn wrapped_body(sample: &TelemetrySample) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "data": sample })).unwrap_or_default()
}
