//! Wire vocabulary spoken between mirrors and the cache service.
//!
//! Every frame is a JSON object of the shape
//! `{ "type": "fetch" | "entry" | "expiring", "key": string, "value"?: any }`.
//! There are no acknowledgements or correlation ids; ordering and delivery
//! belong to the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::ProtocolError;

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheMessage {
    /// Client asks the service for the current value of `key`.
    Fetch { key: String },
    /// Asserts the current value of `key`. A proposed write when sent by a
    /// client; an answer or a rebroadcast when sent by the service.
    Entry { key: String, value: Value },
    /// Service-originated invalidation notice.
    Expiring { key: String },
}

/// Loose frame shape used for decoding, so that unknown `type` values can
/// be told apart from frames that are not messages at all.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    key: Option<String>,
    #[serde(default)]
    value: Value,
}

impl CacheMessage {
    pub fn fetch(key: impl Into<String>) -> Self {
        Self::Fetch { key: key.into() }
    }

    pub fn entry(key: impl Into<String>, value: Value) -> Self {
        Self::Entry {
            key: key.into(),
            value,
        }
    }

    pub fn expiring(key: impl Into<String>) -> Self {
        Self::Expiring { key: key.into() }
    }

    /// Key this message refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::Fetch { key } | Self::Entry { key, .. } | Self::Expiring { key } => key,
        }
    }

    /// Wire name of the message kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Entry { .. } => "entry",
            Self::Expiring { .. } => "expiring",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    ///
    /// An `entry` frame without a `value` field decodes to `Value::Null`.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let key = raw
            .key
            .ok_or_else(|| ProtocolError::Malformed(format!("{} frame without key", raw.kind)))?;

        match raw.kind.as_str() {
            "fetch" => Ok(Self::Fetch { key }),
            "entry" => Ok(Self::Entry {
                key,
                value: raw.value,
            }),
            "expiring" => Ok(Self::Expiring { key }),
            _ => Err(ProtocolError::UnknownKind(raw.kind)),
        }
    }
}
