//! Common test utilities for integration tests
//!
//! Provides a running in-process cache service, registries wired to it,
//! and helpers for waiting on asynchronous propagation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use mirrorcache::{
    CacheMessage, CacheRecord, CacheService, ChannelName, Config, FrameSink, LocalTransport,
    MirrorRegistry, ServiceHandle, Transport, TransportError,
};

/// How long propagation helpers wait before failing the test.
pub const SETTLE: Duration = Duration::from_secs(2);

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A cache service running on the test runtime plus a transport to it.
#[allow(dead_code)]
pub struct Harness {
    pub config: Config,
    pub service: ServiceHandle,
    pub transport: Arc<dyn Transport>,
    pub task: JoinHandle<()>,
}

#[allow(dead_code)]
impl Harness {
    pub fn start() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let (service, task) = CacheService::spawn(config.service.clone());
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(service.clone()));
        Self {
            config,
            service,
            transport,
            task,
        }
    }

    /// A fresh registry, standing in for one client process.
    pub fn client(&self) -> MirrorRegistry {
        MirrorRegistry::new(self.transport.clone(), &self.config)
    }

    pub fn channel(&self, name: &str) -> ChannelName {
        ChannelName::for_cache(&self.config.channel_prefix, name).expect("valid cache name")
    }

    /// Round-trip through the service mailbox so every frame submitted
    /// before this call has been handled.
    pub async fn flush(&self, name: &str) {
        self.service
            .peer_count(&self.channel(name))
            .await
            .expect("service running");
    }
}

/// Wait until `record` holds `expected`, failing the test after [`SETTLE`].
#[allow(dead_code)]
pub async fn wait_for_value(record: &CacheRecord, expected: Option<Value>) {
    let mut rx = record.subscribe();
    let reached = matches!(
        tokio::time::timeout(SETTLE, rx.wait_for(|state| state.value == expected)).await,
        Ok(Ok(_))
    );
    assert!(
        reached,
        "record {} never reached {:?}, last value {:?}",
        record.key(),
        expected,
        record.value()
    );
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
#[allow(dead_code)]
pub async fn wait_for<F>(mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();

    while start.elapsed() < SETTLE {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Sink that keeps every frame a mirror sends.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn messages(&self) -> Vec<CacheMessage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| CacheMessage::decode(frame).expect("mirror sent a valid frame"))
            .collect()
    }

    pub fn fetches_for(&self, key: &str) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, CacheMessage::Fetch { key: k } if k == key))
            .count()
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}
