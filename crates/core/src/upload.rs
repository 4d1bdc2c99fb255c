//! Upload completion envelope and retrieval naming.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server-side state of a chunked upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// More chunks are expected.
    Pending,
    /// The artifact is assembled and retrievable.
    Complete,
}

/// Status envelope returned by the upload endpoint: `{status, id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub status: UploadState,
    pub id: String,
}

impl UploadStatus {
    /// Decode the envelope from a response body.
    pub fn from_slice(body: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Check if the upload is complete.
    pub fn is_complete(&self) -> bool {
        self.status == UploadState::Complete
    }
}

/// Name under which the server publishes a finished upload.
///
/// `report.pdf` becomes `report_new.pdf`; a name without extension just gets
/// the `_new` suffix. Only the final path component is used.
pub fn retrieval_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}_new.{}", ext.to_string_lossy()),
        None => format!("{stem}_new"),
    }
}

/// Retrieval URL for a finished upload, derived only from the storage base
/// and the uploaded name.
pub fn retrieval_url(storage_base: &str, name: &str) -> String {
    format!(
        "{}/static/{}",
        storage_base.trim_end_matches('/'),
        retrieval_name(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_envelope() {
        let status = UploadStatus::from_slice(br#"{"status":"complete","id":"x"}"#).unwrap();
        assert!(status.is_complete());
        assert_eq!(status.id, "x");

        let pending = UploadStatus::from_slice(br#"{"status":"pending","id":"x"}"#).unwrap();
        assert!(!pending.is_complete());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(UploadStatus::from_slice(b"OK").is_err());
        assert!(UploadStatus::from_slice(br#"{"status":"done","id":"x"}"#).is_err());
        assert!(UploadStatus::from_slice(br#"{"status":"complete"}"#).is_err());
    }

    #[test]
    fn test_retrieval_name() {
        assert_eq!(retrieval_name("report.pdf"), "report_new.pdf");
        assert_eq!(retrieval_name("archive.tar.gz"), "archive.tar_new.gz");
        assert_eq!(retrieval_name("README"), "README_new");
        assert_eq!(retrieval_name("../../etc/passwd.pdf"), "passwd_new.pdf");
    }

    #[test]
    fn test_retrieval_url() {
        assert_eq!(
            retrieval_url("http://store.example/", "report.pdf"),
            "http://store.example/static/report_new.pdf"
        );
    }
}
