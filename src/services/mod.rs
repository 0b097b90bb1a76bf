//! Service layer: client mirrors, their registry, and the reference
//! in-process cache service.

pub mod cache_service;
pub mod mirror;
pub mod mirror_registry;

pub use cache_service::{CacheService, PeerId, ServiceHandle};
pub use mirror::Mirror;
pub use mirror_registry::MirrorRegistry;
