//! In-process transport wiring mirrors straight to a [`CacheService`].
//!
//! [`CacheService`]: crate::services::cache_service::CacheService

pub mod local_transport;

pub use local_transport::LocalTransport;
