//! In-process authoritative cache service.
//!
//! Runs as a single actor task that owns every channel's entries and the
//! set of attached peers. Commands arrive on one mpsc mailbox and are
//! handled strictly in order, so each peer observes the service's output
//! in the order it was produced.
//!
//! Protocol behavior:
//! - `fetch` from a peer is answered to that peer only, with `entry` when
//!   the key is stored and `expiring` otherwise.
//! - `entry` from a peer is stored and rebroadcast to every *other* peer
//!   on the channel.
//! - Anything else a client sends is logged and ignored.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{ProtocolError, ServiceError, TransportError};
use crate::domain::models::{CacheMessage, ChannelName, ServiceConfig};
use crate::domain::ports::TransportEvent;

/// Identity of one attached connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery side of one attached peer.
pub type Outbox = mpsc::UnboundedSender<TransportEvent>;

enum ServiceCommand {
    Attach {
        channel: ChannelName,
        peer: PeerId,
        outbox: Outbox,
    },
    Detach {
        peer: PeerId,
    },
    Frame {
        peer: PeerId,
        frame: String,
    },
    Put {
        channel: ChannelName,
        key: String,
        value: Value,
        done: oneshot::Sender<()>,
    },
    Expire {
        channel: ChannelName,
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Lookup {
        channel: ChannelName,
        key: String,
        reply: oneshot::Sender<Option<Value>>,
    },
    PeerCount {
        channel: ChannelName,
        reply: oneshot::Sender<usize>,
    },
    DisconnectAll {
        channel: ChannelName,
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

#[derive(Default)]
struct ChannelState {
    entries: HashMap<String, Value>,
    peers: HashMap<PeerId, Outbox>,
}

impl ChannelState {
    /// Deliver `message` to every peer except `skip`, pruning dead peers.
    fn broadcast(&mut self, message: &CacheMessage, skip: Option<PeerId>) -> Vec<PeerId> {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(key = message.key(), error = %e, "failed to encode broadcast");
                return Vec::new();
            }
        };

        let mut dead = Vec::new();
        for (peer, outbox) in &self.peers {
            if Some(*peer) == skip {
                continue;
            }
            if outbox.send(TransportEvent::Frame(frame.clone())).is_err() {
                dead.push(*peer);
            }
        }
        for peer in &dead {
            self.peers.remove(peer);
        }
        dead
    }

    fn reply(&mut self, peer: PeerId, message: &CacheMessage) -> bool {
        let Some(outbox) = self.peers.get(&peer) else {
            return false;
        };
        let delivered = message
            .encode()
            .map(|frame| outbox.send(TransportEvent::Frame(frame)).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.peers.remove(&peer);
        }
        delivered
    }
}

/// Authoritative store behind every mirror of every channel.
pub struct CacheService {
    config: ServiceConfig,
    channels: HashMap<ChannelName, ChannelState>,
    peers: HashMap<PeerId, ChannelName>,
}

impl CacheService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    /// Start the service actor on the current runtime.
    pub fn spawn(config: ServiceConfig) -> (ServiceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::new(config).run(rx));
        (ServiceHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ServiceCommand>) {
        info!("cache service started");

        while let Some(command) = rx.recv().await {
            if matches!(command, ServiceCommand::Shutdown) {
                break;
            }
            self.handle(command);
        }

        self.disconnect_everyone();
        info!("cache service stopped");
    }

    fn handle(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Attach {
                channel,
                peer,
                outbox,
            } => {
                debug!(channel = %channel, peer = %peer, "peer attached");
                self.channels
                    .entry(channel.clone())
                    .or_default()
                    .peers
                    .insert(peer, outbox);
                self.peers.insert(peer, channel);
            }
            ServiceCommand::Detach { peer } => self.detach(peer),
            ServiceCommand::Frame { peer, frame } => self.handle_frame(peer, &frame),
            ServiceCommand::Put {
                channel,
                key,
                value,
                done,
            } => {
                let state = self.channels.entry(channel).or_default();
                state.entries.insert(key.clone(), value.clone());
                let dead = state.broadcast(&CacheMessage::entry(key, value), None);
                self.forget(&dead);
                let _ = done.send(());
            }
            ServiceCommand::Expire {
                channel,
                key,
                reply,
            } => {
                let state = self.channels.entry(channel).or_default();
                let existed = state.entries.remove(&key).is_some();
                let dead = state.broadcast(&CacheMessage::expiring(key), None);
                self.forget(&dead);
                let _ = reply.send(existed);
            }
            ServiceCommand::Lookup {
                channel,
                key,
                reply,
            } => {
                let value = self
                    .channels
                    .get(&channel)
                    .and_then(|state| state.entries.get(&key))
                    .cloned();
                let _ = reply.send(value);
            }
            ServiceCommand::PeerCount { channel, reply } => {
                let count = self.channels.get(&channel).map_or(0, |s| s.peers.len());
                let _ = reply.send(count);
            }
            ServiceCommand::DisconnectAll { channel, reply } => {
                let peers: Vec<(PeerId, Outbox)> = self
                    .channels
                    .get_mut(&channel)
                    .map(|state| state.peers.drain().collect())
                    .unwrap_or_default();
                for (peer, outbox) in &peers {
                    let _ = outbox.send(TransportEvent::Disconnected);
                    self.peers.remove(peer);
                }
                info!(channel = %channel, peers = peers.len(), "channel peers disconnected");
                let _ = reply.send(peers.len());
            }
            ServiceCommand::Shutdown => {}
        }
    }

    fn handle_frame(&mut self, peer: PeerId, frame: &str) {
        let Some(channel) = self.peers.get(&peer).cloned() else {
            debug!(peer = %peer, "frame from detached peer dropped");
            return;
        };

        let message = match CacheMessage::decode(frame) {
            Ok(message) => message,
            Err(ProtocolError::UnknownKind(kind)) => {
                warn!(channel = %channel, peer = %peer, kind = %kind, "ignoring unknown message kind");
                return;
            }
            Err(e) => {
                warn!(channel = %channel, peer = %peer, error = %e, "ignoring undecodable frame");
                return;
            }
        };

        let reply_on_miss = self.config.reply_expiring_on_miss;
        let state = self.channels.entry(channel.clone()).or_default();

        match message {
            CacheMessage::Fetch { key } => {
                let answer = match state.entries.get(&key) {
                    Some(value) => Some(CacheMessage::entry(key, value.clone())),
                    None if reply_on_miss => Some(CacheMessage::expiring(key)),
                    None => None,
                };
                if let Some(answer) = answer {
                    if !state.reply(peer, &answer) {
                        self.peers.remove(&peer);
                    }
                }
            }
            CacheMessage::Entry { key, value } => {
                debug!(channel = %channel, peer = %peer, key = %key, "entry accepted");
                state.entries.insert(key.clone(), value.clone());
                let dead = state.broadcast(&CacheMessage::entry(key, value), Some(peer));
                self.forget(&dead);
            }
            CacheMessage::Expiring { key } => {
                warn!(channel = %channel, peer = %peer, key = %key, "ignoring expiring sent by a client");
            }
        }
    }

    fn detach(&mut self, peer: PeerId) {
        if let Some(channel) = self.peers.remove(&peer) {
            if let Some(state) = self.channels.get_mut(&channel) {
                state.peers.remove(&peer);
            }
            debug!(channel = %channel, peer = %peer, "peer detached");
        }
    }

    fn forget(&mut self, dead: &[PeerId]) {
        for peer in dead {
            debug!(peer = %peer, "pruning unreachable peer");
            self.peers.remove(peer);
        }
    }

    fn disconnect_everyone(&mut self) {
        for state in self.channels.values_mut() {
            for (_, outbox) in state.peers.drain() {
                let _ = outbox.send(TransportEvent::Disconnected);
            }
        }
        self.peers.clear();
    }
}

/// Cloneable handle used by transports and administrators.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceCommand>,
}

impl ServiceHandle {
    /// Attach a new peer to `channel`. Frames for it go to `outbox`.
    pub fn attach(&self, channel: &ChannelName, outbox: Outbox) -> Result<PeerId, TransportError> {
        let peer = PeerId::new();
        self.tx
            .send(ServiceCommand::Attach {
                channel: channel.clone(),
                peer,
                outbox,
            })
            .map_err(|_| TransportError::ServiceUnavailable)?;
        Ok(peer)
    }

    pub fn detach(&self, peer: PeerId) {
        let _ = self.tx.send(ServiceCommand::Detach { peer });
    }

    /// Hand one client frame to the service.
    pub fn submit(&self, peer: PeerId, frame: String) -> Result<(), TransportError> {
        self.tx
            .send(ServiceCommand::Frame { peer, frame })
            .map_err(|_| TransportError::ServiceUnavailable)
    }

    /// Store `value` and broadcast it to every peer on the channel.
    pub async fn put(&self, channel: &ChannelName, key: &str, value: Value) -> Result<(), ServiceError> {
        let (done, rx) = oneshot::channel();
        self.request(ServiceCommand::Put {
            channel: channel.clone(),
            key: key.to_string(),
            value,
            done,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Drop the stored value and broadcast `expiring` to every peer.
    ///
    /// Returns whether a value was stored.
    pub async fn expire(&self, channel: &ChannelName, key: &str) -> Result<bool, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.request(ServiceCommand::Expire {
            channel: channel.clone(),
            key: key.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Authoritative value of `key`, if stored.
    pub async fn value(&self, channel: &ChannelName, key: &str) -> Result<Option<Value>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.request(ServiceCommand::Lookup {
            channel: channel.clone(),
            key: key.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn peer_count(&self, channel: &ChannelName) -> Result<usize, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.request(ServiceCommand::PeerCount {
            channel: channel.clone(),
            reply,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Notify every peer on `channel` that it has been disconnected and
    /// detach them. Returns how many were dropped.
    pub async fn disconnect_all(&self, channel: &ChannelName) -> Result<usize, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.request(ServiceCommand::DisconnectAll {
            channel: channel.clone(),
            reply,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Stop the actor after it drains already queued commands.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ServiceCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn request(&self, command: ServiceCommand) -> Result<(), ServiceError> {
        self.tx.send(command).map_err(|_| ServiceError::Stopped)
    }
}
