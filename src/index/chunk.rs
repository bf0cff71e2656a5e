use crate::bgzf::VirtualFileOffset;
use crate::error::{Error, Result};

/// A `[begin, end)` span of the compressed stream holding whole records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    begin: VirtualFileOffset,
    end: VirtualFileOffset,
}

impl Chunk {
    /// Build a chunk without checking `begin <= end`.
    pub fn new(begin: VirtualFileOffset, end: VirtualFileOffset) -> Self {
        Self { begin, end }
    }

    /// Build a chunk, rejecting `begin > end`.
    pub fn try_new(begin: VirtualFileOffset, end: VirtualFileOffset) -> Result<Self> {
        if begin > end {
            return Err(Error::InvalidChunk { begin: begin.raw(), end: end.raw() });
        }
        Ok(Self { begin, end })
    }

    pub fn begin(&self) -> VirtualFileOffset {
        self.begin
    }

    pub fn end(&self) -> VirtualFileOffset {
        self.end
    }
}

/// Sort chunks by start and coalesce any that overlap or touch.
pub fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_unstable();

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.begin <= current.end => {
                current.end = current.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}
