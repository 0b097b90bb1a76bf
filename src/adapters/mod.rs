//! Infrastructure adapters for external systems.

pub mod local;
