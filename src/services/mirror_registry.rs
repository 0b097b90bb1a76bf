//! Owner of the name → mirror table.
//!
//! The registry is constructed explicitly and passed to whoever needs to
//! open caches. It guarantees at most one mirror per cache name and tears
//! all of them down on [`MirrorRegistry::shutdown`] or drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::errors::{MirrorError, MirrorResult};
use crate::domain::models::{ChannelName, Config, MirrorConfig};
use crate::domain::ports::Transport;
use crate::services::mirror::Mirror;

struct MirrorSlot {
    mirror: Arc<Mirror>,
    pump: JoinHandle<()>,
}

/// Table of open mirrors, at most one per cache name.
pub struct MirrorRegistry {
    transport: Arc<dyn Transport>,
    channel_prefix: String,
    mirror_config: MirrorConfig,
    /// `None` once the registry has been shut down.
    slots: Mutex<Option<HashMap<String, MirrorSlot>>>,
}

impl MirrorRegistry {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            channel_prefix: config.channel_prefix.clone(),
            mirror_config: config.mirror.clone(),
            slots: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Return the mirror for `name`, connecting it on first use.
    ///
    /// Repeated calls with the same name return the same `Arc`.
    pub fn open(&self, name: &str) -> MirrorResult<Arc<Mirror>> {
        let mut guard = self.lock_slots();
        let slots = guard.as_mut().ok_or(MirrorError::RegistryShutdown)?;

        if let Some(slot) = slots.get(name) {
            return Ok(slot.mirror.clone());
        }

        let channel = ChannelName::for_cache(&self.channel_prefix, name)?;
        let (mirror, pump) = Mirror::connect(self.transport.as_ref(), channel, &self.mirror_config)?;
        slots.insert(
            name.to_string(),
            MirrorSlot {
                mirror: mirror.clone(),
                pump,
            },
        );

        debug!(cache = %name, open = slots.len(), "mirror registered");
        Ok(mirror)
    }

    /// Look up an already open mirror.
    pub fn get(&self, name: &str) -> Option<Arc<Mirror>> {
        self.lock_slots()
            .as_ref()
            .and_then(|slots| slots.get(name))
            .map(|slot| slot.mirror.clone())
    }

    /// Names of open mirrors, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock_slots()
            .as_ref()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock_slots().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every mirror's inbound pump and refuse further opens.
    ///
    /// Mirrors already handed out keep serving their local state.
    pub fn shutdown(&self) {
        let Some(slots) = self.lock_slots().take() else {
            return;
        };
        let closed = slots.len();
        Self::close_all(slots);
        info!(closed, "mirror registry shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock_slots().is_none()
    }

    fn close_all(slots: HashMap<String, MirrorSlot>) {
        for (name, slot) in slots {
            slot.pump.abort();
            slot.mirror.mark_disconnected();
            debug!(cache = %name, "mirror pump stopped");
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Option<HashMap<String, MirrorSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MirrorRegistry {
    fn drop(&mut self) {
        if let Some(slots) = self.lock_slots().take() {
            Self::close_all(slots);
        }
    }
}
