//! Telemetry message representation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A telemetry message as carried on the wire.
///
/// The body is opaque to the dispatcher; only the device identifier is
/// inspected, as the routing key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryMessage {
    /// Message identity, for logging and downstream deduplication.
    pub id: Uuid,

    /// Stable device identifier; the routing key.
    pub device_id: String,

    /// Opaque payload.
    pub payload: Bytes,
}

impl TelemetryMessage {
    /// Create a message for a device with an opaque payload.
    pub fn new(device_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            payload: payload.into(),
        }
    }

    /// The routing key, if the message carries a usable one.
    pub fn routing_key(&self) -> Option<&str> {
        let key = self.device_id.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Serialize the message for publication.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Decode a message from a received body.
    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
