use tokio::sync::mpsc;

use crate::domain::errors::TransportError;
use crate::domain::models::ChannelName;

/// Something that happened on a connected channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound JSON text frame.
    Frame(String),
    /// The channel went away. No further frames follow.
    Disconnected,
}

/// Outbound half of a connection.
///
/// `send` must not block: mirrors call it from inside `get`/`set`.
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: String) -> Result<(), TransportError>;
}

/// An open, ordered, bidirectional channel.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    /// Inbound events in delivery order. The stream ending counts as a
    /// disconnect.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Port for the hosting environment's message channel.
pub trait Transport: Send + Sync {
    /// Open the named channel.
    fn connect(&self, channel: &ChannelName) -> Result<Connection, TransportError>;
}
