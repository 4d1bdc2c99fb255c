//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{MediaKind, Storage, validate_name};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem artifact store.
///
/// Each [`MediaKind`] lives in `{root}/{kind}`. In flat mode every kind shares
/// the root directory, so listing any kind returns all stored artifacts.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
    flat: bool,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>, flat: bool) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, flat })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding artifacts of `kind`.
    pub fn namespace(&self, kind: MediaKind) -> PathBuf {
        if self.flat {
            self.root.clone()
        } else {
            self.root.join(kind.as_str())
        }
    }

    fn object_path(&self, kind: MediaKind, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.namespace(kind).join(name))
    }

    fn not_found(kind: MediaKind, name: &str) -> impl FnOnce(std::io::Error) -> StorageError {
        let key = format!("{kind}/{name}");
        move |e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key)
            } else {
                StorageError::Io(e)
            }
        }
    }
}

/// Temp files are dot-prefixed so listings can skip in-flight writes.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{}", Uuid::new_v4()))
}

#[async_trait]
impl Storage for FilesystemBackend {
    #[instrument(skip(self, data, _correlation_id), fields(backend = "filesystem", size = data.len()))]
    async fn save(
        &self,
        kind: MediaKind,
        data: Bytes,
        name: &str,
        _correlation_id: Option<&str>,
    ) -> StorageResult<String> {
        let path = self.object_path(kind, name)?;
        fs::create_dir_all(self.namespace(kind)).await?;

        let temp_path = temp_path_for(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(path.to_string_lossy().into_owned())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, kind: MediaKind) -> StorageResult<Vec<String>> {
        let dir = self.namespace(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks; those are skipped.
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && name.contains(".tmp.") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, kind: MediaKind, name: &str) -> StorageResult<Bytes> {
        let path = self.object_path(kind, name)?;
        let data = fs::read(&path).await.map_err(Self::not_found(kind, name))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, kind: MediaKind, name: &str) -> StorageResult<()> {
        let path = self.object_path(kind, name)?;
        fs::remove_file(&path)
            .await
            .map_err(Self::not_found(kind, name))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
