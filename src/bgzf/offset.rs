//! Virtual file offsets into a BGZF stream.
//!
//! A virtual offset packs the byte offset of a compressed block (high 48
//! bits) with a position inside that block's uncompressed payload (low 16
//! bits). Comparing the raw values therefore orders positions by where they
//! occur in the stream.

use std::fmt;

/// An opaque 64-bit position in a block-compressed stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualFileOffset(u64);

impl VirtualFileOffset {
    /// The first position of the stream.
    pub const ZERO: Self = VirtualFileOffset(0);

    /// Build from a compressed block offset and a position within that block.
    pub fn new(block_offset: u64, within_block: u16) -> Self {
        VirtualFileOffset((block_offset << 16) | u64::from(within_block))
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualFileOffset(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the compressed block in the file.
    pub fn block_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Offset inside the uncompressed block.
    pub fn within_block(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<u64> for VirtualFileOffset {
    fn from(raw: u64) -> Self {
        VirtualFileOffset(raw)
    }
}

impl From<VirtualFileOffset> for u64 {
    fn from(offset: VirtualFileOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualFileOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_offset(), self.within_block())
    }
}
