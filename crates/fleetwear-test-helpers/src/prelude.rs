//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use fleetwear_test_helpers::prelude::*;
//! ```

pub use crate::must::{must, must_some, must_with};

#[cfg(feature = "mock")]
pub use crate::must::must_async;

#[cfg(feature = "fixtures")]
pub use crate::fixtures::{
    SampleFixture, bare_body, hard_accel, hard_brake, quiet, wrapped_body,
};

#[cfg(feature = "mock")]
pub use crate::mock::{FailingViewer, RecordingViewer, ViewerLog};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
