//! Chunk planning for the transfer protocol.

use std::ops::Range;

/// One window of a payload, sent as a single exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkWindow {
    /// Position in the transfer (0-indexed).
    pub index: u32,
    /// Byte offset into the payload.
    pub offset: usize,
    /// Window length in bytes.
    pub len: usize,
    /// Whether this window completes the transfer.
    pub last: bool,
}

impl ChunkWindow {
    /// Byte range of this window within the payload.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Partition of a payload into consecutive fixed-size windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plan a transfer of `total` bytes in windows of `chunk_size`.
    pub fn new(total: usize, chunk_size: usize) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(crate::Error::Config("chunk size must be non-zero".to_string()));
        }
        Ok(Self { total, chunk_size })
    }

    /// Plan with the default 1 MiB window.
    pub fn with_default_size(total: usize) -> Self {
        Self {
            total,
            chunk_size: crate::TRANSFER_CHUNK_SIZE,
        }
    }

    /// Number of exchanges: `ceil(total / chunk_size)`.
    pub fn chunk_count(&self) -> usize {
        self.total.div_ceil(self.chunk_size)
    }

    /// Total payload size.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Window size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Iterate over the windows in order; exactly the final one is marked last.
    pub fn windows(&self) -> impl Iterator<Item = ChunkWindow> + '_ {
        let count = self.chunk_count();
        (0..count).map(move |i| {
            let offset = i * self.chunk_size;
            let len = self.chunk_size.min(self.total - offset);
            ChunkWindow {
                index: i as u32,
                offset,
                len,
                last: i + 1 == count,
            }
        })
    }
}
