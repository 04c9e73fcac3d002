//! Inbound telemetry samples and the envelope they arrive in.

use std::fmt;

use fleetwear_errors::IngestError;
use serde::{Deserialize, Serialize};

/// One accelerometer reading from a vehicle unit or a phone.
///
/// Timestamps come from the device clock and are not required to increase;
/// devices retransmit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Device identifier, never empty once validated
    pub id: String,
    /// Device clock timestamp
    #[serde(rename = "ts")]
    pub timestamp: u64,
    /// Odometer reading, if the unit reports one
    #[serde(rename = "miles", default, skip_serializing_if = "Option::is_none")]
    pub odometer: Option<f64>,
    /// Longitudinal acceleration in g (raw units on the mobile path)
    pub x: f64,
    /// Lateral acceleration in g (raw units on the mobile path)
    pub y: f64,
    /// Vertical acceleration; carried but unused by detection
    #[serde(default)]
    pub z: f64,
}

impl TelemetrySample {
    /// Create a resting sample for a device.
    pub fn new(id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            odometer: None,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Set the three axis readings.
    pub fn with_accel(mut self, x: f64, y: f64, z: f64) -> Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self
    }

    /// Set the odometer reading.
    pub fn with_odometer(mut self, miles: f64) -> Self {
        self.odometer = Some(miles);
        self
    }

    /// Check the invariants a parsed sample must hold before it reaches the
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::EmptyDeviceId`] for a blank identifier and
    /// [`IngestError::NonFiniteAxis`] for NaN or infinite readings.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.id.trim().is_empty() {
            return Err(IngestError::EmptyDeviceId);
        }
        for (axis, value) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !value.is_finite() {
                return Err(IngestError::NonFiniteAxis {
                    device: self.id.clone(),
                    axis,
                });
            }
        }
        Ok(())
    }
}

/// Accepted request bodies: the wrapped `{"data": {...}}` form, or the bare
/// sample object older firmware posts.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { data: TelemetrySample },
    Bare(TelemetrySample),
}

/// Decode and validate one request body.
///
/// # Errors
///
/// Returns [`IngestError::MalformedEnvelope`] when the body matches neither
/// envelope form, or the validation errors of [`TelemetrySample::validate`].
pub fn parse_envelope(body: &[u8]) -> Result<TelemetrySample, IngestError> {
    let sample = match serde_json::from_slice::<Envelope>(body).map_err(IngestError::malformed)? {
        Envelope::Wrapped { data } => data,
        Envelope::Bare(sample) => sample,
    };
    sample.validate()?;
    Ok(sample)
}

/// Which ingestion route a sample came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPath {
    /// Vehicle-mounted unit, readings already in g
    Vehicle,
    /// Phone sensor, readings need dividing by the mobile scale
    Mobile,
}

impl IngestPath {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            IngestPath::Vehicle => "vehicle",
            IngestPath::Mobile => "mobile",
        }
    }
}

impl fmt::Display for IngestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Divisor applied to the x and y readings before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct AxisScale(f64);

impl AxisScale {
    /// Vehicle units report in g already.
    pub const VEHICLE: AxisScale = AxisScale(1.0);

    /// Create a scale; `None` unless the divisor is finite and positive.
    pub fn new(divisor: f64) -> Option<Self> {
        (divisor.is_finite() && divisor > 0.0).then_some(Self(divisor))
    }

    /// The raw divisor.
    pub fn divisor(self) -> f64 {
        self.0
    }

    /// Normalize one reading.
    pub fn apply(self, raw: f64) -> f64 {
        raw / self.0
    }
}

impl Default for AxisScale {
    fn default() -> Self {
        Self::VEHICLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_sample() -> Result<(), IngestError> {
        let body = br#"{"id":"car1","ts":17,"miles":10.5,"x":2.0,"y":0.0,"z":1.0}"#;
        let sample = parse_envelope(body)?;
        assert_eq!(sample.id, "car1");
        assert_eq!(sample.timestamp, 17);
        assert_eq!(sample.odometer, Some(10.5));
        Ok(())
    }

    #[test]
    fn parses_wrapped_sample_without_optional_fields() -> Result<(), IngestError> {
        let body = br#"{"data":{"id":"phone-3","ts":5,"x":50,"y":-1}}"#;
        let sample = parse_envelope(body)?;
        assert_eq!(sample.id, "phone-3");
        assert_eq!(sample.odometer, None);
        assert!(sample.z.abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_envelope(b"not json at all");
        assert!(matches!(err, Err(IngestError::MalformedEnvelope(_))));

        let err = parse_envelope(br#"{"data":{"ts":1}}"#);
        assert!(matches!(err, Err(IngestError::MalformedEnvelope(_))));
    }

    #[test]
    fn rejects_blank_id() {
        let err = parse_envelope(br#"{"id":"  ","ts":1,"x":0,"y":0}"#);
        assert_eq!(err, Err(IngestError::EmptyDeviceId));
    }

    #[test]
    fn validate_catches_non_finite() {
        let sample = TelemetrySample::new("car1", 0).with_accel(f64::NAN, 0.0, 0.0);
        assert!(matches!(
            sample.validate(),
            Err(IngestError::NonFiniteAxis { axis: "x", .. })
        ));
    }

    #[test]
    fn axis_scale_rejects_non_positive() {
        assert!(AxisScale::new(0.0).is_none());
        assert!(AxisScale::new(-25.0).is_none());
        assert!(AxisScale::new(f64::INFINITY).is_none());
        assert!(AxisScale::new(25.0).is_some());
    }

    #[test]
    fn mobile_scale_matches_vehicle_reading() {
        let Some(mobile) = AxisScale::new(25.0) else {
            panic!("25.0 is a valid divisor");
        };
        assert!((mobile.apply(50.0) - AxisScale::VEHICLE.apply(2.0)).abs() < 1e-12);
    }
}
