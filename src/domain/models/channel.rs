use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::MirrorError;

/// Separator between the channel prefix and the cache name.
const SEPARATOR: char = ':';

/// Transport address of a cache, e.g. `cache:settings`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelName(String);

impl ChannelName {
    /// Build the channel address for the cache `name` under `prefix`.
    ///
    /// The prefix may not contain the separator, so the cache name is
    /// always everything after the first `:`.
    pub fn for_cache(prefix: &str, name: &str) -> Result<Self, MirrorError> {
        if prefix.trim().is_empty() || prefix.contains(SEPARATOR) {
            return Err(MirrorError::InvalidPrefix(prefix.to_string()));
        }
        if name.trim().is_empty() {
            return Err(MirrorError::InvalidName(name.to_string()));
        }
        Ok(Self(format!("{prefix}{SEPARATOR}{name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache name part of the address.
    pub fn cache_name(&self) -> &str {
        self.0
            .split_once(SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
