use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    File { path: PathBuf, source: Box<Error> },

    // Magic numbers
    #[error("Invalid BAI magic bytes: expected \"BAI\\1\", got {0:02x?}")]
    InvalidIndexMagic([u8; 4]),

    #[error("Invalid BAM magic bytes: expected \"BAM\\1\", got {0:02x?}")]
    InvalidBamMagic([u8; 4]),

    // BGZF errors
    #[error("Invalid BGZF block header at offset {offset}")]
    InvalidBgzfHeader { offset: u64 },

    #[error("BGZF block too large: {size} bytes exceeds maximum {max}")]
    BgzfBlockTooLarge { size: usize, max: usize },

    #[error("Failed to inflate BGZF block at offset {offset}")]
    Decompression { offset: u64 },

    #[error("CRC32 mismatch: expected 0x{expected:08x}, got 0x{found:08x}")]
    Crc32Mismatch { expected: u32, found: u32 },

    #[error("Size mismatch: expected {expected} bytes, got {found}")]
    SizeMismatch { expected: u32, found: u32 },

    // Structural errors
    #[error("Stream truncated at offset {offset} while reading {context}")]
    Truncated { offset: u64, context: &'static str },

    #[error("Negative {field}: {value}")]
    NegativeCount { field: &'static str, value: i32 },

    #[error("Header has {header} reference sequences but the index has {index}")]
    ReferenceCountMismatch { header: usize, index: usize },

    #[error("Metadata pseudo-bin has {chunks} chunks, expected 2")]
    InvalidMetadataBin { chunks: i32 },

    #[error("Reference index {index} out of range ({count} references)")]
    ReferenceOutOfRange { index: usize, count: usize },

    #[error("Unknown reference sequence: {0}")]
    UnknownReference(String),

    #[error("Invalid chunk: begin {begin:#x} is past end {end:#x}")]
    InvalidChunk { begin: u64, end: u64 },

    #[error("Invalid alignment interval [{start}, {end})")]
    InvalidInterval { start: u32, end: u32 },

    #[error("Invalid BAM record: {0}")]
    InvalidRecord(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Attach the path of the file being processed.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        Error::File { path: path.into(), source: Box::new(self) }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
