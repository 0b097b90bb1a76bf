//! Identity-stable local representation of one cached key.
//!
//! A record is created once per key and handed out as `Arc<CacheRecord>`.
//! It is never replaced: inbound updates mutate it in place, so anyone
//! holding the `Arc` keeps seeing the latest value.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

/// Value half of a record, published to subscribers on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordState {
    /// Current value, `None` when never known or invalidated.
    pub value: Option<Value>,
    /// When the value last changed locally.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Serializable point-in-time view of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSnapshot {
    pub key: String,
    pub value: Option<Value>,
    pub requested: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

type ChangeCallback = Arc<dyn Fn(&str, &RecordState) + Send + Sync>;

/// Local record for a single key.
pub struct CacheRecord {
    key: String,
    state: watch::Sender<RecordState>,
    /// Latched once a fetch has been sent. Never cleared.
    requested: AtomicBool,
    callbacks: Mutex<Vec<ChangeCallback>>,
}

impl CacheRecord {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        let (state, _) = watch::channel(RecordState::default());
        Self {
            key: key.into(),
            state,
            requested: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, if any.
    pub fn value(&self) -> Option<Value> {
        self.state.borrow().value.clone()
    }

    /// Whether this mirror has ever sent a fetch for the key.
    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().updated_at
    }

    /// Watch the record for value changes.
    ///
    /// The receiver starts out with the current state marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<RecordState> {
        self.state.subscribe()
    }

    /// Register a callback run after every value mutation.
    ///
    /// Callbacks run on whichever task applied the mutation, after the
    /// mirror has released its lock. They must not block.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&str, &RecordState) + Send + Sync + 'static,
    {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(Arc::new(callback));
        }
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        let state = self.state.borrow();
        RecordSnapshot {
            key: self.key.clone(),
            value: state.value.clone(),
            requested: self.requested(),
            updated_at: state.updated_at,
        }
    }

    /// Set the requested latch. Returns `true` only for the call that
    /// flipped it.
    pub(crate) fn mark_requested(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// Overwrite the value in place and wake watchers.
    pub(crate) fn assign(&self, value: Option<Value>) {
        self.state.send_replace(RecordState {
            value,
            updated_at: Some(Utc::now()),
        });
    }

    /// Run registered callbacks against the current state.
    pub(crate) fn notify(&self) {
        let callbacks: Vec<ChangeCallback> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.clone(),
            Err(_) => return,
        };
        if callbacks.is_empty() {
            return;
        }

        let state = self.state.borrow().clone();
        for callback in callbacks {
            callback(&self.key, &state);
        }
    }
}

impl fmt::Debug for CacheRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CacheRecord")
            .field("key", &self.key)
            .field("value", &state.value)
            .field("requested", &self.requested())
            .finish_non_exhaustive()
    }
}
