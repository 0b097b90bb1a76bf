//! Port trait definitions (Hexagonal Architecture)
//!
//! - Transport: the named duplex message channel mirrors talk over
//!
//! Adapters in `crate::adapters` implement these so that mirrors stay
//! independent of any particular channel substrate.

pub mod transport;

pub use transport::{Connection, FrameSink, Transport, TransportEvent};
