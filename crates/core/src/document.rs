//! Document classification by file extension.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// The kind of document handed to the tagger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Word,
    Pdf,
    Text,
    Image,
    Unknown,
}

impl DocumentType {
    /// Infer the type from the path's extension, case-insensitively.
    pub fn infer(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "docx" | "doc" => Self::Word,
            "pdf" => Self::Pdf,
            "txt" => Self::Text,
            "jpg" | "jpeg" | "png" | "gif" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Whether a beacon can be embedded in this kind of document.
    pub fn is_beaconable(&self) -> bool {
        matches!(self, Self::Word)
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Word => "Word Document",
            Self::Pdf => "PDF",
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Basic metadata for display: `filename`, `type` and, when the file can be
/// stat'ed, `size`.
pub fn describe(path: impl AsRef<Path>) -> BTreeMap<String, String> {
    let path = path.as_ref();
    let mut metadata = BTreeMap::new();

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    metadata.insert("filename".to_string(), filename);
    metadata.insert("type".to_string(), DocumentType::infer(path).label().to_string());

    if let Ok(meta) = std::fs::metadata(path) {
        metadata.insert("size".to_string(), format!("{} bytes", meta.len()));
    }

    metadata
}
