//! Domain models for mirrorcache.

pub mod channel;
pub mod config;
pub mod message;
pub mod record;

pub use channel::ChannelName;
pub use config::{Config, LoggingConfig, MirrorConfig, ServiceConfig};
pub use message::CacheMessage;
pub use record::{CacheRecord, RecordSnapshot, RecordState};
