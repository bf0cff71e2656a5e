pub mod bam;
pub mod batch;
pub mod bgzf;
pub mod error;
pub mod index;

pub use bam::{BamReader, BamRecord, BamWriter, ReferenceSequence, SamHeader};
pub use bgzf::{BgzfReader, BgzfWriter, VirtualFileOffset};
pub use error::{Error, Result};
pub use index::{
    default_index_path, index_bam, index_bam_file, read_index, read_index_file, write_index,
    write_index_file, BamIndex, BamIndexer, Bin, BinBuilder, Chunk, ReferenceIndex,
    ReferenceIndexBuilder, ReferenceMetadata,
};

/// Configuration for building and serializing indexes
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Emit the per-reference metadata pseudo-bin (bin 37450)
    pub write_metadata: bool,
    /// Emit the trailing count of reads without coordinates
    pub write_unmapped_count: bool,
    /// Verify the CRC32 of every BGZF block while reading the BAM
    pub verify_crc: bool,
    /// Number of threads for batch indexing (0 = auto, 1 = sequential)
    pub num_threads: usize,
    /// Buffer size for I/O operations
    pub buffer_size: usize,
}

impl IndexConfig {
    /// Resolve `num_threads` to a concrete worker count
    pub fn effective_threads(&self) -> usize {
        match self.num_threads {
            0 => num_cpus::get().clamp(1, 32),
            n => n.clamp(1, 32),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            write_metadata: true,
            write_unmapped_count: true,
            verify_crc: true,
            num_threads: 0,
            buffer_size: 128 * 1024,
        }
    }
}

/// Statistics from one indexing pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records: u64,
    pub mapped: u64,
    pub unmapped: u64,
    pub references: usize,
    pub bins: usize,
    pub chunks: usize,
}

/// An aligned read as seen by the indexer.
///
/// Any alignment reader can feed [`BamIndexer`] by implementing this.
pub trait AlignmentRecord {
    /// Whether the read has a placement on a reference
    fn is_mapped(&self) -> bool;

    /// Name of the reference the read is placed on, if any
    fn reference_name(&self) -> Option<&str>;

    /// 1-based leftmost reference position
    fn start_position(&self) -> u32;

    /// Number of reference bases consumed by the alignment
    fn reference_span(&self) -> u32;
}
