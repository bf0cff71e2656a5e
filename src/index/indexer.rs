//! Single-pass index construction and the assembled index.

use std::collections::HashMap;

use log::{debug, info};

use super::bin::region_to_bins;
use super::chunk::{merge_chunks, Chunk};
use super::reference::{ReferenceIndex, ReferenceIndexBuilder};
use crate::bam::SamHeader;
use crate::bgzf::VirtualFileOffset;
use crate::error::{Error, Result};
use crate::AlignmentRecord;

/// The complete index of one alignment file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BamIndex {
    header: SamHeader,
    references: Vec<ReferenceIndex>,
    unmapped_count: Option<u64>,
}

impl BamIndex {
    /// Pair a header with one reference index per header entry.
    pub fn new(
        header: SamHeader,
        references: Vec<ReferenceIndex>,
        unmapped_count: Option<u64>,
    ) -> Result<Self> {
        if header.len() != references.len() {
            return Err(Error::ReferenceCountMismatch {
                header: header.len(),
                index: references.len(),
            });
        }
        Ok(Self { header, references, unmapped_count })
    }

    pub fn header(&self) -> &SamHeader {
        &self.header
    }

    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    pub fn reference_index(&self, index: usize) -> Result<&ReferenceIndex> {
        self.references
            .get(index)
            .ok_or(Error::ReferenceOutOfRange { index, count: self.references.len() })
    }

    /// Reads without coordinates, if the count is known.
    pub fn total_unmapped_reads(&self) -> Option<u64> {
        self.unmapped_count
    }

    /// Chunks to scan for records overlapping 0-based `[start, end)`.
    ///
    /// Candidate bins at every level are collected, chunks ending at or
    /// before the linear index lower bound are dropped, and the rest are
    /// merged.
    pub fn query(&self, reference: usize, start: u32, end: u32) -> Result<Vec<Chunk>> {
        let index = self.reference_index(reference)?;
        let candidates = region_to_bins(start, end);

        let mut chunks: Vec<Chunk> = index
            .bins()
            .iter()
            .filter(|bin| candidates.binary_search(&bin.bin_number()).is_ok())
            .flat_map(|bin| bin.chunks().iter().copied())
            .collect();

        if let Some(min_offset) = index.min_offset(start) {
            chunks.retain(|chunk| chunk.end() > min_offset);
        }

        Ok(merge_chunks(chunks))
    }
}

/// Routes records of one pass over a coordinate-sorted stream into
/// per-reference builders.
pub struct BamIndexer {
    header: SamHeader,
    builders: Vec<ReferenceIndexBuilder>,
    name_to_index: HashMap<String, usize>,
    current: Option<usize>,
    unmapped: u64,
    records: u64,
}

impl BamIndexer {
    pub fn new(header: SamHeader) -> Self {
        let builders =
            header.references.iter().map(|r| ReferenceIndexBuilder::new(r.length)).collect();
        // First occurrence wins, as in `SamHeader::reference_index`
        let mut name_to_index = HashMap::with_capacity(header.references.len());
        for (i, reference) in header.references.iter().enumerate() {
            name_to_index.entry(reference.name.clone()).or_insert(i);
        }
        Self { header, builders, name_to_index, current: None, unmapped: 0, records: 0 }
    }

    /// Add the record whose bytes span `[chunk_start, chunk_end)`.
    ///
    /// Unmapped records only bump the global count, even when they are
    /// placed on a reference next to their mate. They never reach a bin or
    /// a reference's unaligned counter; htslib, by contrast, bins placed
    /// unmapped reads and credits them to their reference.
    pub fn add_record<T: AlignmentRecord + ?Sized>(
        &mut self,
        record: Option<&T>,
        chunk_start: VirtualFileOffset,
        chunk_end: VirtualFileOffset,
    ) -> Result<()> {
        let Some(record) = record else {
            return Ok(());
        };
        self.records += 1;

        if !record.is_mapped() {
            self.unmapped += 1;
            return Ok(());
        }

        let name = record.reference_name().ok_or_else(|| Error::UnknownReference("*".into()))?;
        let reference = self.resolve(name)?;

        let start = record.start_position().saturating_sub(1);
        let end = start.saturating_add(record.reference_span().max(1));
        self.builders[reference].add_alignment(start, end, chunk_start, chunk_end)
    }

    /// Number of records seen, including unmapped ones.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn unmapped(&self) -> u64 {
        self.unmapped
    }

    /// Finish every reference and assemble the index.
    pub fn create_bam_index(self) -> BamIndex {
        let references: Vec<ReferenceIndex> =
            self.builders.into_iter().map(ReferenceIndexBuilder::build).collect();
        info!(
            "indexed {} records over {} references ({} unmapped)",
            self.records,
            references.len(),
            self.unmapped
        );
        BamIndex { header: self.header, references, unmapped_count: Some(self.unmapped) }
    }

    /// Reuse the previous reference when consecutive records share it.
    fn resolve(&mut self, name: &str) -> Result<usize> {
        if let Some(current) = self.current {
            if self.header.references[current].name == name {
                return Ok(current);
            }
        }
        let index = *self
            .name_to_index
            .get(name)
            .ok_or_else(|| Error::UnknownReference(name.to_string()))?;
        debug!("switching to reference {} ({})", name, index);
        self.current = Some(index);
        Ok(index)
    }
}
