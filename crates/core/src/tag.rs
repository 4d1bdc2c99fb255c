//! Tag records correlating a beacon with a tagged file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use time::OffsetDateTime;
use uuid::Uuid;

/// RFC 4122 version-4 UUID, lowercase hex.
static UUID_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}")
        .expect("invalid uuid pattern")
});

/// Unique identifier embedded in a beacon.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Generate a new random tag ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse from a string, requiring the exact version-4 UUID shape.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match UUID_V4.find(s) {
            Some(m) if m.start() == 0 && m.end() == s.len() => Ok(Self(s.to_string())),
            _ => Err(crate::Error::InvalidTagId(s.to_string())),
        }
    }

    /// Find the first version-4 UUID inside arbitrary text.
    pub fn find_in(text: &str) -> Option<Self> {
        UUID_V4.find(text).map(|m| Self(m.as_str().to_string()))
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TagId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tracking record for a beaconed document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Resolved by the caller; empty until then.
    pub username: String,
    /// Local path at tagging time.
    pub file_path: String,
    /// Beacon identity, stable across re-tagging.
    pub id: String,
    /// Optional correlation key.
    #[serde(default)]
    pub client_id: String,
    /// Hex SHA-256 of the document after beacon insertion.
    #[serde(default)]
    pub hash: String,
    /// Beacon URL embedded in the document.
    #[serde(default)]
    pub url: String,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub created: i64,
}

impl Tag {
    /// Create a tag for a freshly inserted beacon, stamped with the current time.
    pub fn new(id: &TagId, file_path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            file_path: file_path.into(),
            url: url.into(),
            created: OffsetDateTime::now_utc().unix_timestamp(),
            ..Self::default()
        }
    }

    /// Create a tag for a beacon that was already present in the document.
    ///
    /// The original creation time is not recoverable, so `created` stays zero.
    pub fn recovered(id: &TagId, file_path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            file_path: file_path.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Set the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the client correlation key.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Serialize to the canonical JSON body posted to the tagging endpoint.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
