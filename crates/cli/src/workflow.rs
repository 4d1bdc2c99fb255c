//! Classify-and-tag entry point for a single file path.

use crate::api_client::ApiClient;
use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tripwire_core::{BeaconUrl, DocumentType, Tag, TagId, document, hash_file, inject_or_detect};
use tripwire_storage::{MediaKind, Storage};

/// Input for one tagging run.
#[derive(Clone, Debug)]
pub struct TagRequest {
    pub path: PathBuf,
    /// Overrides the environment-derived username.
    pub username: Option<String>,
    pub client_id: String,
}

impl TagRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            username: None,
            client_id: String::new(),
        }
    }
}

/// What happened to the file, for the caller to render.
#[derive(Clone, Debug, Serialize)]
pub struct TagOutcome {
    pub document_type: DocumentType,
    pub metadata: BTreeMap<String, String>,
    /// Set for beaconed documents.
    pub tag: Option<Tag>,
    /// Set for pass-through uploads.
    pub location: Option<String>,
    /// Tagging API failure. The document itself was still processed.
    pub api_error: Option<String>,
}

impl TagOutcome {
    fn new(path: &Path) -> Self {
        Self {
            document_type: DocumentType::infer(path),
            metadata: document::describe(path),
            tag: None,
            location: None,
            api_error: None,
        }
    }

    /// Whether the file was neither beaconed nor uploaded.
    pub fn is_unsupported(&self) -> bool {
        self.tag.is_none() && self.location.is_none()
    }
}

/// Username for tags: explicit value, then `USER`, then `USERNAME`.
pub fn resolve_username(explicit: Option<&str>) -> String {
    explicit
        .filter(|u| !u.trim().is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .or_else(|| std::env::var("USERNAME").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Runs the tagging workflow against the API and an optional storage backend.
pub struct Tagger {
    api: ApiClient,
    beacon: BeaconUrl,
    storage: Option<Arc<dyn Storage>>,
}

impl Tagger {
    pub fn new(api: ApiClient, beacon: BeaconUrl) -> Self {
        Self {
            api,
            beacon,
            storage: None,
        }
    }

    /// Enable pass-through uploads of PDFs and images.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Classify the file, then beacon it (Word) or upload it (PDF, image).
    ///
    /// Injection and hashing run on the blocking pool. A failed tag post is
    /// recorded in the outcome rather than returned as an error.
    pub async fn tag_document(&self, request: TagRequest) -> Result<TagOutcome> {
        let mut outcome = TagOutcome::new(&request.path);
        info!(path = %request.path.display(), kind = %outcome.document_type, "processing document");

        match outcome.document_type {
            DocumentType::Word => {
                let tag = self.beacon_document(&request).await?;
                if let Err(err) = self.api.post_tag(&tag).await {
                    warn!(id = %tag.id, error = %err, "tag submission failed");
                    outcome.api_error = Some(format!("{err:#}"));
                }
                outcome.tag = Some(tag);
            }
            DocumentType::Pdf => {
                outcome.location = Some(self.upload(&request.path, MediaKind::Pdf).await?);
            }
            DocumentType::Image => {
                outcome.location = Some(self.upload(&request.path, MediaKind::Image).await?);
            }
            DocumentType::Text | DocumentType::Unknown => {
                info!(path = %request.path.display(), "document type not supported for tagging");
            }
        }

        Ok(outcome)
    }

    async fn beacon_document(&self, request: &TagRequest) -> Result<Tag> {
        let path = request.path.clone();
        let beacon = self.beacon.clone();
        let candidate = TagId::new();

        let (tag, hash) = tokio::task::spawn_blocking(move || -> tripwire_core::Result<(Tag, String)> {
            let tag = inject_or_detect(&path, &beacon, &candidate)?;
            let hash = hash_file(&path)?;
            Ok((tag, hash))
        })
        .await
        .context("beacon task panicked")?
        .with_context(|| format!("failed to tag {}", request.path.display()))?;

        Ok(tag
            .with_hash(hash)
            .with_username(resolve_username(request.username.as_deref()))
            .with_client_id(request.client_id.clone()))
    }

    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<String> {
        let storage = self
            .storage
            .as_ref()
            .context("no storage backend configured for uploads")?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name")?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let location = storage
            .save(kind, Bytes::from(data), &name, None)
            .await
            .with_context(|| format!("failed to upload {name}"))?;
        info!(%name, %location, backend = storage.backend_name(), "document uploaded");
        Ok(location)
    }
}
