//! Notification payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// An opaque JSON message exchanged on the notification channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification(Value);

impl Notification {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The first frame a client sends after opening its stream.
    pub fn registration(client_id: &str, username: &str) -> Self {
        Self(json!({
            "type": "register",
            "client_id": client_id,
            "username": username,
        }))
    }

    /// Message type, when the payload is an object with a string `type` field.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Encode as a frame payload.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&self.0).map(Bytes::from)
    }

    /// Decode one frame payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload).map(Self)
    }
}

impl From<Value> for Notification {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
