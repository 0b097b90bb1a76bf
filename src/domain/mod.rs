//! Domain layer for mirrorcache
//!
//! This module contains the wire protocol, records and port traits.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{MirrorError, MirrorResult, ProtocolError, ServiceError, TransportError};
