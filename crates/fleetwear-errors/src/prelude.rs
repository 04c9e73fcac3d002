//! Prelude module for convenient error handling imports.
//!
//! ```
//! use fleetwear_errors::prelude::*;
//!
//! let err = ForwardError::NotConfigured("query");
//! assert_eq!(err.severity(), ErrorSeverity::Info);
//! ```

pub use crate::{
    broadcast::BroadcastError, forward::ForwardError, ingest::IngestError,
    severity::ErrorSeverity,
};
