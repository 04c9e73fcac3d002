//! Error types for fleetwear.
//!
//! The telemetry pipeline distinguishes four failure classes, none of which
//! is fatal to the process:
//!
//! - [`ingest`]: malformed inbound envelopes. Logged, request dropped.
//! - [`broadcast`]: viewer push failures (queue full, writer gone, socket
//!   write failed). Logged, update discarded.
//! - [`forward`]: external time-series store failures. Logged, no retry.
//! - Asset-pool exhaustion is not an error at all: the device simply carries
//!   no asset id.
//!
//! Each class reports an [`ErrorSeverity`] from [`severity`].
//!
//! # Example
//!
//! ```
//! use fleetwear_errors::prelude::*;
//!
//! fn require_id(id: &str) -> Result<&str, IngestError> {
//!     if id.is_empty() {
//!         return Err(IngestError::EmptyDeviceId);
//!     }
//!     Ok(id)
//! }
//!
//! let err = require_id("").err();
//! assert_eq!(err.map(|e| e.severity()), Some(ErrorSeverity::Warning));
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod broadcast;
pub mod forward;
pub mod ingest;
pub mod prelude;
pub mod severity;

pub use broadcast::BroadcastError;
pub use forward::ForwardError;
pub use ingest::IngestError;
pub use severity::ErrorSeverity;
