//! Convenient re-exports for common usage.
//!
//! This module provides a curated set of the most commonly used types
//! from h223-core, allowing you to import them with a single `use` statement.
//!
//! # Example
//!
//! ```rust
//! use h223_core::prelude::*;
//!
//! let mut session = H223Session::with_defaults();
//! let call = session
//!     .open_call(CallKey::Tunnel { circuit_id: 1 }, H223Level::Level2)
//!     .unwrap();
//! let _ = call;
//! ```

// Session types
pub use crate::dissect::{
    CallStats, Delivery, DeliveryContext, DissectOutput, H223Session, SessionConfig,
    Subdissector, SubdissectorId, SubdissectorRegistry,
};

// Identity types
pub use crate::circuit::{CallId, CallKey, SubCircuitId, TransportProtocol};

// Mux and state types
pub use crate::mux::{H223Level, MuxPduRecord, NeedMore};
pub use crate::state::{AlType, Direction, LogicalChannelParams, MuxTableEntry};

// Error types
pub use crate::error::{Diagnostic, Error, Result};
