//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Media category of a stored artifact. Each kind maps to its own namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Pdf,
    Image,
    Html,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Pdf, MediaKind::Image, MediaKind::Html];

    /// Namespace segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            "html" => Ok(Self::Html),
            other => Err(StorageError::Config(format!("unknown media kind: {other}"))),
        }
    }
}

/// Reject names that are not a single normal path component.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(StorageError::InvalidName(name.to_string())),
    }
}

/// Artifact storage, one namespace per [`MediaKind`].
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Save an artifact and return its locator (URL, path or object key).
    ///
    /// `correlation_id` is only meaningful to remote backends.
    async fn save(
        &self,
        kind: MediaKind,
        data: Bytes,
        name: &str,
        correlation_id: Option<&str>,
    ) -> StorageResult<String>;

    /// List artifact names in a namespace. A namespace that does not exist yet is empty.
    async fn list(&self, kind: MediaKind) -> StorageResult<Vec<String>>;

    /// Get an artifact's content.
    async fn get(&self, kind: MediaKind, name: &str) -> StorageResult<Bytes>;

    /// Delete an artifact.
    async fn delete(&self, kind: MediaKind, name: &str) -> StorageResult<()>;

    /// Static identifier for the backend type (e.g., "s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and configured.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
