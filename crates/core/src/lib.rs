//! Core domain types and shared logic for Tripwire document beaconing.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Tags binding a beacon identity to a file, user and time
//! - Streaming content hashing
//! - Beacon injection into ZIP+XML document packages
//! - Document classification
//! - Chunk planning and upload status envelopes for the transfer protocol

pub mod beacon;
pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod hash;
pub mod tag;
pub mod upload;

pub use beacon::{BeaconUrl, inject_or_detect};
pub use chunk::{ChunkPlan, ChunkWindow};
pub use document::DocumentType;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher, hash_file};
pub use tag::{Tag, TagId};
pub use upload::{UploadState, UploadStatus};

/// Transfer chunk size: 1 MiB
pub const TRANSFER_CHUNK_SIZE: usize = 1024 * 1024;
