//! Remote storage service reached through the chunked upload protocol.

use crate::error::{StorageError, StorageResult};
use crate::traits::{MediaKind, Storage, validate_name};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, info, instrument};
use tripwire_core::upload::retrieval_url;
use tripwire_core::{ChunkPlan, UploadStatus};

const HEADER_FILENAME: &str = "X-filename";
const HEADER_ID: &str = "X-ID";
const HEADER_LAST_CHUNK: &str = "X-Last-Chunk";

/// Default per-request timeout for upload exchanges.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the `{endpoint}/upload` chunked transfer protocol.
///
/// Each window of the payload is one POST. Chunks are never retried: the
/// first non-200 response aborts the transfer.
#[derive(Clone)]
pub struct ChunkedUploader {
    client: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    secret_access_key: String,
    chunk_size: usize,
}

impl std::fmt::Debug for ChunkedUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("endpoint", &self.endpoint)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl ChunkedUploader {
    /// Create an uploader for the given storage service.
    pub fn new(
        endpoint: &str,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> StorageResult<Self> {
        if endpoint.trim().is_empty() {
            return Err(StorageError::Config(
                "http storage requires a non-empty endpoint".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            chunk_size: tripwire_core::TRANSFER_CHUNK_SIZE,
        })
    }

    /// Override the window size. Zero is ignored.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    /// Base URL of the storage service.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorization(&self) -> String {
        format!("AWS {}:{}", self.access_key_id, self.secret_access_key)
    }

    /// Upload `data` under `name` and return the retrieval URL of the finished artifact.
    #[instrument(skip(self, data), fields(backend = "http", size = data.len()))]
    pub async fn upload(&self, data: Bytes, name: &str, correlation_id: &str) -> StorageResult<String> {
        if data.is_empty() {
            return Err(StorageError::Transfer(format!("refusing to upload empty payload: {name}")));
        }

        let plan = ChunkPlan::new(data.len(), self.chunk_size)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let total = plan.chunk_count();
        let url = format!("{}/upload", self.endpoint);
        let mut final_body = None;

        for window in plan.windows() {
            let mut request = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(AUTHORIZATION, self.authorization())
                .header(HEADER_FILENAME, name)
                .header(HEADER_ID, correlation_id);
            if window.last {
                request = request.header(HEADER_LAST_CHUNK, "true");
            }

            let response = request.body(data.slice(window.range())).send().await?;
            let status = response.status();
            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::Transfer(format!(
                    "chunk {} of {} for {} rejected with HTTP {}: {}",
                    window.index + 1,
                    total,
                    name,
                    status,
                    body.trim()
                )));
            }
            debug!(chunk = window.index, len = window.len, last = window.last, "chunk accepted");

            if window.last {
                final_body = Some(response.bytes().await?);
            }
        }

        let body = final_body
            .ok_or_else(|| StorageError::Transfer(format!("no final chunk sent for {name}")))?;
        let envelope = UploadStatus::from_slice(&body)
            .map_err(|e| StorageError::Transfer(format!("undecodable completion response: {e}")))?;
        if !envelope.is_complete() {
            return Err(StorageError::Transfer(format!(
                "upload {} still pending after final chunk",
                envelope.id
            )));
        }

        let location = retrieval_url(&self.endpoint, name);
        info!(name, id = %envelope.id, chunks = total, %location, "upload complete");
        Ok(location)
    }

    /// Fetch a finished artifact by its retrieval URL.
    #[instrument(skip(self), fields(backend = "http"))]
    pub async fn fetch(&self, url: &str) -> StorageResult<Bytes> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(url.to_string())),
            status => Err(StorageError::Transfer(format!(
                "retrieval of {url} failed with HTTP {status}"
            ))),
        }
    }
}

/// Storage backed by a remote service. Only saving is supported.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    uploader: ChunkedUploader,
}

impl HttpBackend {
    pub fn new(uploader: ChunkedUploader) -> Self {
        Self { uploader }
    }

    /// Get the underlying uploader.
    pub fn uploader(&self) -> &ChunkedUploader {
        &self.uploader
    }

    /// Fetch a finished artifact by its retrieval URL.
    pub async fn fetch(&self, url: &str) -> StorageResult<Bytes> {
        self.uploader.fetch(url).await
    }

    fn not_implemented(operation: &'static str) -> StorageError {
        StorageError::NotImplemented {
            backend: "http",
            operation,
        }
    }
}

#[async_trait]
impl Storage for HttpBackend {
    async fn save(
        &self,
        kind: MediaKind,
        data: Bytes,
        name: &str,
        correlation_id: Option<&str>,
    ) -> StorageResult<String> {
        validate_name(name)?;
        let id = correlation_id.unwrap_or(kind.as_str());
        self.uploader.upload(data, name, id).await
    }

    async fn list(&self, _kind: MediaKind) -> StorageResult<Vec<String>> {
        Err(Self::not_implemented("list"))
    }

    async fn get(&self, _kind: MediaKind, _name: &str) -> StorageResult<Bytes> {
        Err(Self::not_implemented("get"))
    }

    async fn delete(&self, _kind: MediaKind, _name: &str) -> StorageResult<()> {
        Err(Self::not_implemented("delete"))
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
