//! Client-side mirror of one named cache.
//!
//! A mirror keeps a local map of key to [`CacheRecord`] and speaks the
//! fetch/entry/expiring protocol with the cache service:
//!
//! - `get` hands back the record immediately and sends at most one fetch
//!   per key for the mirror's lifetime.
//! - `set` writes locally first, then proposes the value with an entry.
//! - Inbound entry/expiring frames only touch records that already exist.
//!
//! Inbound frames are applied by a single task per mirror in delivery
//! order. All state sits behind one mutex, so `get`/`set` and inbound
//! application serialize per cache name while different mirrors never
//! contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::{MirrorError, ProtocolError};
use crate::domain::models::{CacheMessage, CacheRecord, ChannelName, MirrorConfig, RecordSnapshot};
use crate::domain::ports::{FrameSink, Transport, TransportEvent};

/// Local replica and protocol endpoint for one cache name.
pub struct Mirror {
    name: String,
    channel: ChannelName,
    records: Mutex<HashMap<String, Arc<CacheRecord>>>,
    sink: Box<dyn FrameSink>,
    connected: AtomicBool,
}

impl Mirror {
    /// Build a mirror over an already opened sink. Inbound frames must be
    /// fed through [`Mirror::handle_frame`] or [`Mirror::handle_event`].
    pub fn new(channel: ChannelName, sink: Box<dyn FrameSink>) -> Self {
        Self {
            name: channel.cache_name().to_string(),
            channel,
            records: Mutex::new(HashMap::new()),
            sink,
            connected: AtomicBool::new(true),
        }
    }

    /// Open `channel` on `transport` and start the inbound pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        transport: &dyn Transport,
        channel: ChannelName,
        config: &MirrorConfig,
    ) -> Result<(Arc<Self>, JoinHandle<()>), MirrorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MirrorError::NoRuntime)?;
        let connection = transport.connect(&channel)?;

        let mirror = Arc::new(Self::new(channel, connection.sink));
        let pump = runtime.spawn(run_inbound(
            mirror.clone(),
            connection.events,
            config.mailbox_warn_depth,
        ));

        info!(cache = %mirror.name, channel = %mirror.channel, "mirror connected");
        Ok((mirror, pump))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Whether the channel is still up. A disconnected mirror keeps
    /// serving its last known state.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Return the record for `key`, creating it if needed.
    ///
    /// Sends a fetch the first time the key is asked for. Never blocks on
    /// the reply; the value arrives later through the same record.
    pub fn get(&self, key: &str) -> Arc<CacheRecord> {
        let mut records = self.lock_records();
        let record = Self::record_for(&mut records, key);

        if record.mark_requested() {
            self.send(&CacheMessage::fetch(key));
        }
        record
    }

    /// Write `value` locally and propose it to the service.
    ///
    /// The new value is visible through the returned record before any
    /// round trip.
    pub fn set(&self, key: &str, value: Value) -> Arc<CacheRecord> {
        let record = {
            let mut records = self.lock_records();
            let record = Self::record_for(&mut records, key);
            record.assign(Some(value.clone()));
            self.send(&CacheMessage::entry(key, value));
            record
        };

        record.notify();
        record
    }

    /// Look up a record without creating it or sending a fetch.
    pub fn peek(&self, key: &str) -> Option<Arc<CacheRecord>> {
        self.lock_records().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_records().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    /// Snapshot of every record, sorted by key.
    pub fn snapshot(&self) -> Vec<RecordSnapshot> {
        let mut snapshot: Vec<RecordSnapshot> = self
            .lock_records()
            .values()
            .map(|record| record.snapshot())
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    /// Apply one transport event.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.handle_frame(&frame),
            TransportEvent::Disconnected => self.mark_disconnected(),
        }
    }

    /// Decode and apply one inbound JSON frame.
    ///
    /// Undecodable frames and unknown message kinds are logged and dropped.
    pub fn handle_frame(&self, frame: &str) {
        match CacheMessage::decode(frame) {
            Ok(message) => self.handle_message(message),
            Err(ProtocolError::UnknownKind(kind)) => {
                warn!(cache = %self.name, kind = %kind, "ignoring unknown message kind");
            }
            Err(e) => {
                warn!(cache = %self.name, error = %e, "ignoring undecodable frame");
            }
        }
    }

    /// Apply one decoded inbound message.
    pub fn handle_message(&self, message: CacheMessage) {
        match message {
            CacheMessage::Entry { key, value } => self.apply_entry(&key, value),
            CacheMessage::Expiring { key } => self.apply_expiring(&key),
            CacheMessage::Fetch { key } => {
                warn!(cache = %self.name, key = %key, "ignoring inbound fetch");
            }
        }
    }

    fn apply_entry(&self, key: &str, value: Value) {
        let Some(record) = self.assign_existing(key, Some(value)) else {
            debug!(cache = %self.name, key = %key, "entry for unknown key dropped");
            return;
        };
        debug!(cache = %self.name, key = %key, "entry applied");
        record.notify();
    }

    fn apply_expiring(&self, key: &str) {
        let Some(record) = self.assign_existing(key, None) else {
            debug!(cache = %self.name, key = %key, "expiring for unknown key dropped");
            return;
        };
        debug!(cache = %self.name, key = %key, "record expired");
        record.notify();
    }

    /// Overwrite the value of an existing record. Never creates one.
    fn assign_existing(&self, key: &str, value: Option<Value>) -> Option<Arc<CacheRecord>> {
        let records = self.lock_records();
        let record = records.get(key)?;
        record.assign(value);
        Some(record.clone())
    }

    pub(crate) fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!(
                cache = %self.name,
                channel = %self.channel,
                "channel disconnected, serving local state only"
            );
        }
    }

    fn record_for(
        records: &mut HashMap<String, Arc<CacheRecord>>,
        key: &str,
    ) -> Arc<CacheRecord> {
        records
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CacheRecord::new(key)))
            .clone()
    }

    fn send(&self, message: &CacheMessage) {
        if !self.is_connected() {
            debug!(cache = %self.name, kind = message.kind(), key = message.key(), "offline, message dropped");
            return;
        }

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(cache = %self.name, key = message.key(), error = %e, "failed to encode message");
                return;
            }
        };

        if let Err(e) = self.sink.send(frame) {
            warn!(cache = %self.name, kind = message.kind(), error = %e, "send failed");
            self.mark_disconnected();
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, Arc<CacheRecord>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("connected", &self.is_connected())
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

/// Edge-triggered alarm for the inbound queue depth.
///
/// Fires once when the backlog rises above the threshold and re-arms only
/// after it has drained back to the threshold or below.
#[derive(Debug)]
struct BacklogAlarm {
    threshold: usize,
    raised: bool,
}

impl BacklogAlarm {
    const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            raised: false,
        }
    }

    /// Returns `true` when `backlog` has just crossed the threshold.
    fn observe(&mut self, backlog: usize) -> bool {
        if backlog <= self.threshold {
            self.raised = false;
            return false;
        }
        !std::mem::replace(&mut self.raised, true)
    }
}

/// Drain inbound events in arrival order until the channel goes away.
async fn run_inbound(
    mirror: Arc<Mirror>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    warn_depth: usize,
) {
    let mut alarm = BacklogAlarm::new(warn_depth);

    while let Some(event) = events.recv().await {
        if matches!(event, TransportEvent::Disconnected) {
            break;
        }
        mirror.handle_event(event);

        let backlog = events.len();
        if alarm.observe(backlog) {
            warn!(cache = %mirror.name, backlog, threshold = warn_depth, "inbound backlog is growing");
        }
    }

    mirror.mark_disconnected();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::TransportError;
    use serde_json::json;

    /// Sink that records every frame it is handed.
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<CacheMessage> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| CacheMessage::decode(f).unwrap())
                .collect()
        }
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: String) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Closed {
                    channel: "cache:settings".to_string(),
                });
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn settings_mirror() -> (Mirror, RecordingSink) {
        let sink = RecordingSink::default();
        let channel = ChannelName::for_cache("cache", "settings").unwrap();
        (Mirror::new(channel, Box::new(sink.clone())), sink)
    }

    fn entry_frame(key: &str, value: Value) -> String {
        CacheMessage::entry(key, value).encode().unwrap()
    }

    #[test]
    fn test_first_get_sends_fetch() {
        let (mirror, sink) = settings_mirror();

        let record = mirror.get("theme");

        assert_eq!(record.key(), "theme");
        assert_eq!(record.value(), None);
        assert!(record.requested());
        assert_eq!(sink.messages(), vec![CacheMessage::fetch("theme")]);
    }

    #[test]
    fn test_repeated_get_fetches_once_and_keeps_identity() {
        let (mirror, sink) = settings_mirror();

        let first = mirror.get("volume");
        let second = mirror.get("volume");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sink.messages(), vec![CacheMessage::fetch("volume")]);
    }

    #[test]
    fn test_set_is_visible_before_round_trip() {
        let (mirror, sink) = settings_mirror();

        let record = mirror.set("theme", json!("light"));

        assert_eq!(record.value(), Some(json!("light")));
        assert!(!record.requested());
        assert!(Arc::ptr_eq(&record, &mirror.peek("theme").unwrap()));
        assert_eq!(
            sink.messages(),
            vec![CacheMessage::entry("theme", json!("light"))]
        );
    }

    #[test]
    fn test_get_after_set_still_fetches_once() {
        let (mirror, sink) = settings_mirror();

        mirror.set("theme", json!("light"));
        let record = mirror.get("theme");
        mirror.get("theme");

        assert_eq!(record.value(), Some(json!("light")));
        assert_eq!(
            sink.messages(),
            vec![
                CacheMessage::entry("theme", json!("light")),
                CacheMessage::fetch("theme"),
            ]
        );
    }

    #[test]
    fn test_entry_updates_existing_record_in_place() {
        let (mirror, _sink) = settings_mirror();
        let record = mirror.get("theme");

        mirror.handle_frame(&entry_frame("theme", json!("dark")));

        assert_eq!(record.value(), Some(json!("dark")));
        assert!(Arc::ptr_eq(&record, &mirror.get("theme")));
    }

    #[test]
    fn test_entry_for_unknown_key_is_dropped() {
        let (mirror, sink) = settings_mirror();

        mirror.handle_frame(&entry_frame("language", json!("en")));

        assert!(mirror.peek("language").is_none());
        assert!(mirror.is_empty());
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_expiring_clears_value_but_keeps_record() {
        let (mirror, sink) = settings_mirror();
        let record = mirror.get("theme");
        mirror.handle_frame(&entry_frame("theme", json!("dark")));

        mirror.handle_message(CacheMessage::expiring("theme"));

        assert_eq!(record.value(), None);
        assert!(record.requested());
        assert!(Arc::ptr_eq(&record, &mirror.get("theme")));
        // The latch stays set, so no second fetch goes out.
        assert_eq!(sink.messages(), vec![CacheMessage::fetch("theme")]);
    }

    #[test]
    fn test_unknown_kind_and_inbound_fetch_change_nothing() {
        let (mirror, sink) = settings_mirror();
        let record = mirror.set("theme", json!("light"));

        mirror.handle_frame(r#"{"type":"purge","key":"theme"}"#);
        mirror.handle_frame(r#"{"type":"fetch","key":"theme"}"#);
        mirror.handle_frame("garbage");

        assert_eq!(record.value(), Some(json!("light")));
        assert_eq!(mirror.len(), 1);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_last_message_wins() {
        let (mirror, _sink) = settings_mirror();
        let record = mirror.set("theme", json!("light"));

        mirror.handle_frame(&entry_frame("theme", json!("dark")));
        mirror.handle_frame(&entry_frame("theme", json!("solarized")));

        assert_eq!(record.value(), Some(json!("solarized")));
    }

    #[test]
    fn test_disconnect_keeps_serving_local_state() {
        let (mirror, sink) = settings_mirror();
        let record = mirror.set("theme", json!("light"));

        mirror.handle_event(TransportEvent::Disconnected);
        assert!(!mirror.is_connected());

        let again = mirror.set("theme", json!("dark"));
        let fresh = mirror.get("volume");

        assert!(Arc::ptr_eq(&record, &again));
        assert_eq!(record.value(), Some(json!("dark")));
        assert!(fresh.requested());
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_send_failure_marks_disconnected() {
        let (mirror, sink) = settings_mirror();
        sink.fail.store(true, Ordering::SeqCst);

        let record = mirror.set("theme", json!("light"));

        assert_eq!(record.value(), Some(json!("light")));
        assert!(!mirror.is_connected());
    }

    #[test]
    fn test_callbacks_fire_for_inbound_updates() {
        let (mirror, _sink) = settings_mirror();
        let record = mirror.get("theme");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        record.on_change(move |_, state| log.lock().unwrap().push(state.value.clone()));

        mirror.handle_frame(&entry_frame("theme", json!("dark")));
        mirror.handle_message(CacheMessage::expiring("theme"));

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("dark")), None]);
    }

    #[test]
    fn test_snapshot_sorted_by_key() {
        let (mirror, _sink) = settings_mirror();
        mirror.get("volume");
        mirror.set("theme", json!("light"));

        let keys: Vec<String> = mirror.snapshot().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["theme".to_string(), "volume".to_string()]);
        assert_eq!(mirror.keys(), keys);
    }

    #[tokio::test]
    async fn test_pump_applies_frames_in_order_then_disconnects() {
        let (mirror, _sink) = settings_mirror();
        let mirror = Arc::new(mirror);
        let record = mirror.get("theme");
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(TransportEvent::Frame(entry_frame("theme", json!("dark"))))
            .unwrap();
        tx.send(TransportEvent::Frame(entry_frame("theme", json!("light"))))
            .unwrap();
        drop(tx);

        run_inbound(mirror.clone(), rx, 16).await;

        assert_eq!(record.value(), Some(json!("light")));
        assert!(!mirror.is_connected());
    }

    #[test]
    fn test_backlog_alarm_fires_once_per_crossing() {
        let mut alarm = BacklogAlarm::new(4);

        assert!(!alarm.observe(3));
        assert!(!alarm.observe(4));
        assert!(alarm.observe(5));
        assert!(!alarm.observe(6));
        assert!(!alarm.observe(1030));
        assert!(!alarm.observe(5));

        assert!(!alarm.observe(2));
        assert!(alarm.observe(9));
    }
}
