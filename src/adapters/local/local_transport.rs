use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::errors::TransportError;
use crate::domain::models::ChannelName;
use crate::domain::ports::{Connection, FrameSink, Transport};
use crate::services::cache_service::{PeerId, ServiceHandle};

/// Transport whose far end is a cache service running in the same process.
///
/// Each `connect` attaches a fresh peer. Frames travel over unbounded mpsc
/// channels, so delivery is reliable and ordered for as long as both
/// sides are alive.
#[derive(Clone)]
pub struct LocalTransport {
    service: ServiceHandle,
}

impl LocalTransport {
    pub const fn new(service: ServiceHandle) -> Self {
        Self { service }
    }
}

impl Transport for LocalTransport {
    fn connect(&self, channel: &ChannelName) -> Result<Connection, TransportError> {
        let (outbox, events) = mpsc::unbounded_channel();
        let peer = self.service.attach(channel, outbox)?;
        debug!(channel = %channel, peer = %peer, "local connection opened");

        Ok(Connection {
            sink: Box::new(LocalSink {
                service: self.service.clone(),
                channel: channel.clone(),
                peer,
            }),
            events,
        })
    }
}

/// Outbound half of a local connection. Detaches its peer on drop.
struct LocalSink {
    service: ServiceHandle,
    channel: ChannelName,
    peer: PeerId,
}

impl FrameSink for LocalSink {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.service
            .submit(self.peer, frame)
            .map_err(|_| TransportError::Closed {
                channel: self.channel.to_string(),
            })
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        self.service.detach(self.peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CacheMessage, ServiceConfig};
    use crate::domain::ports::TransportEvent;
    use crate::services::cache_service::CacheService;
    use serde_json::json;

    fn settings() -> ChannelName {
        ChannelName::for_cache("cache", "settings").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_round_trip() {
        let (service, _task) = CacheService::spawn(ServiceConfig::default());
        service.put(&settings(), "theme", json!("dark")).await.unwrap();
        let transport = LocalTransport::new(service);

        let mut connection = transport.connect(&settings()).unwrap();
        connection
            .sink
            .send(CacheMessage::fetch("theme").encode().unwrap())
            .unwrap();

        let Some(TransportEvent::Frame(frame)) = connection.events.recv().await else {
            panic!("expected a reply frame");
        };
        assert_eq!(
            CacheMessage::decode(&frame).unwrap(),
            CacheMessage::entry("theme", json!("dark"))
        );
    }

    #[tokio::test]
    async fn test_dropping_sink_detaches_peer() {
        let (service, _task) = CacheService::spawn(ServiceConfig::default());
        let transport = LocalTransport::new(service.clone());

        let connection = transport.connect(&settings()).unwrap();
        assert_eq!(service.peer_count(&settings()).await.unwrap(), 1);

        drop(connection);
        assert_eq!(service.peer_count(&settings()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_after_shutdown_fails() {
        let (service, task) = CacheService::spawn(ServiceConfig::default());
        let transport = LocalTransport::new(service.clone());
        let connection = transport.connect(&settings()).unwrap();

        service.shutdown();
        task.await.unwrap();

        assert!(matches!(
            transport.connect(&settings()),
            Err(TransportError::ServiceUnavailable)
        ));
        assert!(matches!(
            connection.sink.send("{}".to_string()),
            Err(TransportError::Closed { .. })
        ));
    }
}
