//! Artifact storage abstraction and backends for Tripwire.
//!
//! This crate provides:
//! - The [`Storage`] capability, namespaced per [`MediaKind`]
//! - The chunked upload client for the remote storage service
//! - Backends: remote HTTP service, local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    http::{ChunkedUploader, HttpBackend},
    s3::S3Backend,
};
pub use error::{StorageError, StorageResult};
pub use traits::{MediaKind, Storage, validate_name};

use std::sync::Arc;
use tripwire_core::config::StorageConfig;

/// Create a storage backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Http {
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            let uploader =
                ChunkedUploader::new(endpoint, access_key_id.clone(), secret_access_key.clone())?;
            Ok(Arc::new(HttpBackend::new(uploader)))
        }
        StorageConfig::Filesystem { path, flat } => {
            let backend = FilesystemBackend::new(path, *flat).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
