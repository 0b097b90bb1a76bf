//! mirrorcache - shared key-value cache mirrors
//!
//! Several independent clients share one mutable key-value cache through a
//! single authoritative service. Each client holds a [`Mirror`] per cache
//! name: reads never block, writes apply locally first, and updates reach
//! other clients asynchronously with no ordering or atomicity guarantee.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): wire protocol, records, config models, ports
//! - **Service Layer** (`services`): mirrors, the mirror registry, the
//!   reference cache service
//! - **Adapters** (`adapters`): transport implementations
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mirrorcache::{CacheService, Config, LocalTransport, MirrorRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let (service, _task) = CacheService::spawn(config.service.clone());
//!     let registry = MirrorRegistry::new(Arc::new(LocalTransport::new(service)), &config);
//!
//!     let settings = registry.open("settings")?;
//!     let theme = settings.get("theme");
//!     settings.set("theme", serde_json::json!("dark"));
//!     assert_eq!(theme.value(), Some(serde_json::json!("dark")));
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::local::LocalTransport;
pub use domain::models::{
    CacheMessage, CacheRecord, ChannelName, Config, LoggingConfig, MirrorConfig, RecordSnapshot,
    RecordState, ServiceConfig,
};
pub use domain::ports::{Connection, FrameSink, Transport, TransportEvent};
pub use domain::{MirrorError, ProtocolError, ServiceError, TransportError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CacheService, Mirror, MirrorRegistry, ServiceHandle};
