//! BAI index construction, querying and serialization.

pub mod bin;
pub mod chunk;
pub mod codec;
pub mod indexer;
pub mod reference;

pub use bin::{Bin, BinBuilder};
pub use chunk::Chunk;
pub use codec::{read_index, write_index, BAI_MAGIC};
pub use indexer::{BamIndex, BamIndexer};
pub use reference::{ReferenceIndex, ReferenceIndexBuilder, ReferenceMetadata};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use log::info;

use crate::bam::{BamReader, SamHeader};
use crate::bgzf::BgzfReader;
use crate::error::Result;
use crate::{AlignmentRecord, IndexConfig, IndexStats};

/// Conventional index location: the BAM path with `.bai` appended.
pub fn default_index_path(bam: &Path) -> PathBuf {
    let mut path = bam.as_os_str().to_owned();
    path.push(".bai");
    PathBuf::from(path)
}

/// Index a coordinate-sorted BAM stream in one pass.
pub fn index_bam<R: Read>(input: R, config: &IndexConfig) -> Result<(BamIndex, IndexStats)> {
    let bgzf = BgzfReader::new(input).with_crc_verification(config.verify_crc);
    let mut reader = BamReader::from_bgzf(bgzf);
    let header = reader.read_header()?;

    let mut indexer = BamIndexer::new(header.clone());
    let mut mapped = 0u64;
    while let Some(indexed) = reader.read_record(&header)? {
        if indexed.record.is_mapped() {
            mapped += 1;
        }
        indexer.add_record(Some(&indexed.record), indexed.start, indexed.end)?;
    }

    let records = indexer.records();
    let unmapped = indexer.unmapped();
    let index = indexer.create_bam_index();

    let stats = IndexStats {
        records,
        mapped,
        unmapped,
        references: index.references().len(),
        bins: index.references().iter().map(|r| r.bins().len()).sum(),
        chunks: index
            .references()
            .iter()
            .flat_map(ReferenceIndex::bins)
            .map(|b| b.chunks().len())
            .sum(),
    };
    Ok((index, stats))
}

/// Index a BAM file.
pub fn index_bam_file(path: &Path, config: &IndexConfig) -> Result<(BamIndex, IndexStats)> {
    let run = || {
        let file = File::open(path)?;
        index_bam(BufReader::with_capacity(config.buffer_size, file), config)
    };
    let (index, stats) = run().map_err(|e| e.with_path(path))?;
    info!("{}: {} records, {} bins", path.display(), stats.records, stats.bins);
    Ok((index, stats))
}

/// Load a `.bai` file for the BAM whose header is given.
pub fn read_index_file(path: &Path, header: &SamHeader) -> Result<BamIndex> {
    let run = || {
        let file = File::open(path)?;
        read_index(BufReader::new(file), header)
    };
    run().map_err(|e| e.with_path(path))
}

/// Write a `.bai` file.
pub fn write_index_file(path: &Path, index: &BamIndex, config: &IndexConfig) -> Result<()> {
    let run = || {
        let file = File::create(path)?;
        write_index(BufWriter::with_capacity(config.buffer_size, file), index, config)
    };
    run().map_err(|e| e.with_path(path))
}
