//! Per-reference index: hierarchical bins plus the linear index.

use log::debug;

use super::bin::{compute_bin, max_bin_for, Bin, BinBuilder, MIN_SHIFT};
use super::chunk::Chunk;
use crate::bgzf::VirtualFileOffset;
use crate::error::{Error, Result};

/// Aggregate counts stored in the metadata pseudo-bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Start of the first record placed on the reference
    pub first_offset: VirtualFileOffset,
    /// End of the last record placed on the reference
    pub last_offset: VirtualFileOffset,
    pub aligned_records: u64,
    pub unaligned_records: u64,
}

/// The finished index of one reference sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    bins: Vec<Bin>,
    intervals: Vec<VirtualFileOffset>,
    metadata: Option<ReferenceMetadata>,
}

impl ReferenceIndex {
    pub fn new(
        bins: Vec<Bin>,
        intervals: Vec<VirtualFileOffset>,
        metadata: Option<ReferenceMetadata>,
    ) -> Self {
        Self { bins, intervals, metadata }
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Linear index: smallest record offset touching each 16 Kbp window
    pub fn intervals(&self) -> &[VirtualFileOffset] {
        &self.intervals
    }

    pub fn metadata(&self) -> Option<&ReferenceMetadata> {
        self.metadata.as_ref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn number_of_aligned_reads(&self) -> u64 {
        self.metadata.map_or(0, |m| m.aligned_records)
    }

    pub fn number_of_unaligned_reads(&self) -> u64 {
        self.metadata.map_or(0, |m| m.unaligned_records)
    }

    pub fn lowest_start_offset(&self) -> Option<VirtualFileOffset> {
        self.metadata.map(|m| m.first_offset)
    }

    pub fn highest_end_offset(&self) -> Option<VirtualFileOffset> {
        self.metadata.map(|m| m.last_offset)
    }

    pub fn bin(&self, bin_number: u32) -> Option<&Bin> {
        self.bins.iter().find(|b| b.bin_number() == bin_number)
    }

    /// Lower bound on the offset of any record overlapping `start`.
    ///
    /// Positions past the end of the linear index fall back to its last
    /// entry.
    pub fn min_offset(&self, start: u32) -> Option<VirtualFileOffset> {
        let window = (start >> MIN_SHIFT) as usize;
        self.intervals.get(window).or_else(|| self.intervals.last()).copied()
    }
}

/// Accumulates one reference's index during a single pass.
///
/// Bin builders live in a dense table indexed by bin number, since records
/// visit bins in scattered order. The table is sized from the reference
/// length and released by `build`.
#[derive(Debug)]
pub struct ReferenceIndexBuilder {
    reference_length: u32,
    intervals: Vec<Option<VirtualFileOffset>>,
    largest_interval: Option<usize>,
    bin_builders: Vec<Option<BinBuilder>>,
    aligned_records: u64,
    unaligned_records: u64,
    lowest_start: Option<VirtualFileOffset>,
    highest_end: Option<VirtualFileOffset>,
}

impl ReferenceIndexBuilder {
    pub fn new(reference_length: u32) -> Self {
        let windows = (reference_length.saturating_sub(1) >> MIN_SHIFT) as usize + 1;
        let bins = max_bin_for(reference_length) as usize + 1;
        Self {
            reference_length,
            intervals: vec![None; windows],
            largest_interval: None,
            bin_builders: vec![None; bins],
            aligned_records: 0,
            unaligned_records: 0,
            lowest_start: None,
            highest_end: None,
        }
    }

    pub fn reference_length(&self) -> u32 {
        self.reference_length
    }

    /// Record one aligned read covering 0-based `[start, end)` whose bytes
    /// span `[chunk_start, chunk_end)` in the compressed stream.
    pub fn add_alignment(
        &mut self,
        start: u32,
        end: u32,
        chunk_start: VirtualFileOffset,
        chunk_end: VirtualFileOffset,
    ) -> Result<()> {
        if end <= start {
            return Err(Error::InvalidInterval { start, end });
        }
        let chunk = Chunk::try_new(chunk_start, chunk_end)?;

        // Linear index
        let first = (start >> MIN_SHIFT) as usize;
        let last = ((end - 1) >> MIN_SHIFT) as usize;
        if last >= self.intervals.len() {
            // Record hangs off the end of the reference
            self.intervals.resize(last + 1, None);
        }
        for slot in &mut self.intervals[first..=last] {
            if slot.map_or(true, |existing| chunk_start < existing) {
                *slot = Some(chunk_start);
            }
        }
        self.largest_interval = Some(self.largest_interval.map_or(last, |l| l.max(last)));

        // Bins
        let bin = compute_bin(start, end) as usize;
        if bin >= self.bin_builders.len() {
            self.bin_builders.resize(bin + 1, None);
        }
        self.bin_builders[bin].get_or_insert_with(|| BinBuilder::new(bin as u32)).add_chunk(chunk);
        self.aligned_records += 1;

        // Extrema
        self.lowest_start = Some(self.lowest_start.map_or(chunk_start, |o| o.min(chunk_start)));
        self.highest_end = Some(self.highest_end.map_or(chunk_end, |o| o.max(chunk_end)));

        Ok(())
    }

    /// Count an unmapped read placed on this reference.
    pub fn increment_unmapped_count(&mut self) {
        self.unaligned_records += 1;
    }

    pub fn aligned_records(&self) -> u64 {
        self.aligned_records
    }

    /// Compact the bins, trim and back-fill the linear index.
    pub fn build(self) -> ReferenceIndex {
        let bins: Vec<Bin> =
            self.bin_builders.into_iter().flatten().map(BinBuilder::build).collect();

        let used = self.largest_interval.map_or(0, |l| l + 1);
        let intervals = backfill_intervals(&self.intervals[..used]);

        let metadata = (self.aligned_records > 0 || self.unaligned_records > 0).then(|| {
            ReferenceMetadata {
                first_offset: self.lowest_start.unwrap_or_default(),
                last_offset: self.highest_end.unwrap_or_default(),
                aligned_records: self.aligned_records,
                unaligned_records: self.unaligned_records,
            }
        });

        debug!(
            "reference of length {}: {} bins, {} linear windows, {} aligned",
            self.reference_length,
            bins.len(),
            intervals.len(),
            self.aligned_records
        );

        ReferenceIndex { bins, intervals, metadata }
    }
}

/// Replace empty windows with the closest preceding offset (or zero).
fn backfill_intervals(slots: &[Option<VirtualFileOffset>]) -> Vec<VirtualFileOffset> {
    let mut previous = VirtualFileOffset::ZERO;
    slots
        .iter()
        .map(|slot| {
            if let Some(offset) = slot {
                previous = *offset;
            }
            previous
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::bin::LINEAR_WINDOW;

    fn vo(block: u64, within: u16) -> VirtualFileOffset {
        VirtualFileOffset::new(block, within)
    }

    #[test]
    fn test_empty_reference() {
        let index = ReferenceIndexBuilder::new(1_000_000).build();
        assert!(index.bins().is_empty());
        assert!(index.intervals().is_empty());
        assert!(!index.has_metadata());
        assert_eq!(index.number_of_aligned_reads(), 0);
        assert_eq!(index.min_offset(0), None);
    }

    #[test]
    fn test_intervals_trimmed_and_backfilled() {
        let mut builder = ReferenceIndexBuilder::new(1_000_000);
        // Windows 0 and 3 only; 1 and 2 are gaps
        builder.add_alignment(10, 20, vo(100, 0), vo(100, 50)).unwrap();
        let window3 = 3 * LINEAR_WINDOW;
        builder.add_alignment(window3 + 5, window3 + 60, vo(200, 0), vo(200, 80)).unwrap();
        let index = builder.build();

        assert_eq!(index.intervals(), &[vo(100, 0), vo(100, 0), vo(100, 0), vo(200, 0)]);
    }

    #[test]
    fn test_leading_gap_backfills_with_zero() {
        let mut builder = ReferenceIndexBuilder::new(100_000);
        let window2 = 2 * LINEAR_WINDOW;
        builder.add_alignment(window2, window2 + 10, vo(5, 0), vo(5, 9)).unwrap();
        let index = builder.build();
        let zero = VirtualFileOffset::ZERO;
        assert_eq!(index.intervals(), &[zero, zero, vo(5, 0)]);
    }

    #[test]
    fn test_spanning_record_updates_every_window() {
        let mut builder = ReferenceIndexBuilder::new(1_000_000);
        builder.add_alignment(LINEAR_WINDOW + 1, LINEAR_WINDOW + 2, vo(1, 0), vo(1, 1)).unwrap();
        // Earlier offset spanning windows 0..=2 lowers window 1
        builder.add_alignment(5, 2 * LINEAR_WINDOW + 5, vo(0, 10), vo(0, 20)).unwrap();
        let index = builder.build();
        assert_eq!(index.intervals(), &[vo(0, 10), vo(0, 10), vo(0, 10)]);
    }

    #[test]
    fn test_bins_compacted_in_number_order() {
        let mut builder = ReferenceIndexBuilder::new(1_000_000);
        builder.add_alignment(500_000, 500_100, vo(0, 0), vo(0, 10)).unwrap();
        builder.add_alignment(10, 200_000, vo(0, 10), vo(0, 20)).unwrap();
        builder.add_alignment(20, 30, vo(0, 20), vo(0, 30)).unwrap();
        let index = builder.build();

        let numbers: Vec<u32> = index.bins().iter().map(Bin::bin_number).collect();
        assert_eq!(numbers, vec![compute_bin(10, 200_000), 4681, compute_bin(500_000, 500_100)]);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_metadata_tracks_extrema_and_counts() {
        let mut builder = ReferenceIndexBuilder::new(1_000_000);
        builder.add_alignment(10, 20, vo(10, 0), vo(10, 40)).unwrap();
        builder.add_alignment(30, 40, vo(10, 40), vo(12, 3)).unwrap();
        builder.increment_unmapped_count();
        let index = builder.build();

        let metadata = index.metadata().unwrap();
        assert_eq!(metadata.first_offset, vo(10, 0));
        assert_eq!(metadata.last_offset, vo(12, 3));
        assert_eq!(metadata.aligned_records, 2);
        assert_eq!(metadata.unaligned_records, 1);
    }

    #[test]
    fn test_record_past_reference_end() {
        let mut builder = ReferenceIndexBuilder::new(20_000);
        builder.add_alignment(19_990, 40_000, vo(0, 0), vo(0, 10)).unwrap();
        let index = builder.build();
        assert_eq!(index.intervals().len(), 3);
        assert_eq!(index.bins().len(), 1);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut builder = ReferenceIndexBuilder::new(1_000);
        assert!(matches!(
            builder.add_alignment(10, 10, vo(0, 0), vo(0, 1)),
            Err(Error::InvalidInterval { .. })
        ));
        assert!(matches!(
            builder.add_alignment(10, 20, vo(5, 0), vo(4, 0)),
            Err(Error::InvalidChunk { .. })
        ));
        assert_eq!(builder.aligned_records(), 0);
    }

    #[test]
    fn test_min_offset() {
        let mut builder = ReferenceIndexBuilder::new(100_000);
        builder.add_alignment(0, 10, vo(1, 0), vo(1, 5)).unwrap();
        builder.add_alignment(LINEAR_WINDOW, LINEAR_WINDOW + 10, vo(2, 0), vo(2, 5)).unwrap();
        let index = builder.build();
        assert_eq!(index.min_offset(0), Some(vo(1, 0)));
        assert_eq!(index.min_offset(LINEAR_WINDOW + 3), Some(vo(2, 0)));
        assert_eq!(index.min_offset(90_000), Some(vo(2, 0)));
    }
}
