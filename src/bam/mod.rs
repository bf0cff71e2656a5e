//! Minimal BAM container support: enough to feed the indexer and to write
//! well-formed BAM streams.

pub mod header;
pub mod reader;
pub mod record;
pub mod writer;

pub use header::{ReferenceSequence, SamHeader};
pub use reader::{BamReader, IndexedRecord};
pub use record::{parse_cigar, BamRecord, CigarKind, CigarOp, RecordSpec};
pub use writer::BamWriter;

/// Magic bytes opening the uncompressed BAM stream
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// Flag bit marking a read as unmapped
pub const FLAG_UNMAPPED: u16 = 0x4;
