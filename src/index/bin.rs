//! Hierarchical binning (UCSC scheme, SAMv1 section 5.3).
//!
//! Six levels partition a reference of up to 2^29 bases:
//! - Level 0: bin 0 (512 Mbp)
//! - Level 1: bins 1-8 (64 Mbp each)
//! - Level 2: bins 9-72 (8 Mbp each)
//! - Level 3: bins 73-584 (1 Mbp each)
//! - Level 4: bins 585-4680 (128 Kbp each)
//! - Level 5: bins 4681-37448 (16 Kbp each)
//!
//! A record lands in the smallest bin that wholly contains it. Bin 37450
//! is never produced by this scheme and is used on disk as a metadata
//! pseudo-bin.

use super::chunk::Chunk;

/// log2 of the finest bin width, also the linear index window
pub const MIN_SHIFT: u32 = 14;

/// Width of one linear index window
pub const LINEAR_WINDOW: u32 = 1 << MIN_SHIFT;

/// Number of levels below the root
pub const DEPTH: u32 = 5;

/// Number of bins across all levels
pub const BIN_COUNT: u32 = first_bin_in_level(DEPTH + 1);

/// Highest bin number the scheme can produce
pub const MAX_BIN: u32 = BIN_COUNT - 1;

/// Pseudo-bin holding per-reference metadata in `.bai` files
pub const METADATA_BIN: u32 = BIN_COUNT + 1;

/// First bin of the finest level
pub const FIRST_LEAF_BIN: u32 = first_bin_in_level(DEPTH);

/// Bin stored in BAM records that have no position
pub const UNPLACED_BIN: u32 = FIRST_LEAF_BIN - 1;

/// First bin number of a level (0 = root)
pub const fn first_bin_in_level(level: u32) -> u32 {
    ((1 << (3 * level)) - 1) / 7
}

/// Smallest bin wholly containing the 0-based half-open interval `[start, end)`.
///
/// An empty interval is treated as covering the single base at `start`.
pub fn compute_bin(start: u32, end: u32) -> u32 {
    let last = end.max(start.saturating_add(1)) - 1;
    for level in (1..=DEPTH).rev() {
        let shift = MIN_SHIFT + 3 * (DEPTH - level);
        if start >> shift == last >> shift {
            return first_bin_in_level(level) + (start >> shift);
        }
    }
    0
}

/// Highest bin number a reference of `reference_length` bases can use.
pub fn max_bin_for(reference_length: u32) -> u32 {
    FIRST_LEAF_BIN + (reference_length >> MIN_SHIFT)
}

/// Level of a bin number (0 = root, 5 = finest).
pub fn bin_level(bin: u32) -> u32 {
    (0..=DEPTH).rev().find(|&level| bin >= first_bin_in_level(level)).unwrap_or(0)
}

/// Every bin that may hold records overlapping `[start, end)`.
pub fn region_to_bins(start: u32, end: u32) -> Vec<u32> {
    let limit = 1u32 << (MIN_SHIFT + 3 * DEPTH);
    let start = start.min(limit - 1);
    let last = end.max(start + 1).min(limit) - 1;

    let mut bins = vec![0];
    for level in 1..=DEPTH {
        let shift = MIN_SHIFT + 3 * (DEPTH - level);
        let offset = first_bin_in_level(level);
        bins.extend((offset + (start >> shift))..=(offset + (last >> shift)));
    }
    bins
}

/// Order bins by ascending bin number.
///
/// Bin number order is deterministic but is not genomic order.
pub fn sort_bins_by_number(bins: &mut [Bin]) {
    bins.sort_by_key(Bin::bin_number);
}

/// A numbered bin and its chunks, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bin {
    bin_number: u32,
    chunks: Vec<Chunk>,
}

impl Bin {
    pub fn new(bin_number: u32, chunks: Vec<Chunk>) -> Self {
        Self { bin_number, chunks }
    }

    pub fn bin_number(&self) -> u32 {
        self.bin_number
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// Accumulates the chunks of one bin during an indexing pass.
///
/// Chunks must arrive in non-decreasing file order. Only the most recent
/// chunk is considered for merging.
#[derive(Clone, Debug)]
pub struct BinBuilder {
    bin_number: u32,
    chunks: Vec<Chunk>,
}

impl BinBuilder {
    pub fn new(bin_number: u32) -> Self {
        Self { bin_number, chunks: Vec::new() }
    }

    pub fn bin_number(&self) -> u32 {
        self.bin_number
    }

    /// Append a chunk, folding it into the previous one when their
    /// compressed blocks are the same or consecutive.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        if let Some(last) = self.chunks.last_mut() {
            let last_block = last.end().block_offset();
            let next_block = chunk.begin().block_offset();
            if next_block == last_block || next_block == last_block + 1 {
                *last = Chunk::new(last.begin(), chunk.end());
                return;
            }
        }
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn build(self) -> Bin {
        Bin { bin_number: self.bin_number, chunks: self.chunks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::VirtualFileOffset;

    fn vo(block: u64, within: u16) -> VirtualFileOffset {
        VirtualFileOffset::new(block, within)
    }

    #[test]
    fn test_constants() {
        assert_eq!(BIN_COUNT, 37449);
        assert_eq!(MAX_BIN, 37448);
        assert_eq!(METADATA_BIN, 37450);
        assert_eq!(FIRST_LEAF_BIN, 4681);
        assert_eq!(UNPLACED_BIN, 4680);
        assert_eq!(first_bin_in_level(1), 1);
        assert_eq!(first_bin_in_level(2), 9);
        assert_eq!(first_bin_in_level(3), 73);
        assert_eq!(first_bin_in_level(4), 585);
    }

    /// Textbook reg2bin, kept verbatim for comparison
    fn reg2bin(beg: u32, end: u32) -> u32 {
        let end = end - 1;
        if beg >> 14 == end >> 14 {
            return ((1 << 15) - 1) / 7 + (beg >> 14);
        }
        if beg >> 17 == end >> 17 {
            return ((1 << 12) - 1) / 7 + (beg >> 17);
        }
        if beg >> 20 == end >> 20 {
            return ((1 << 9) - 1) / 7 + (beg >> 20);
        }
        if beg >> 23 == end >> 23 {
            return ((1 << 6) - 1) / 7 + (beg >> 23);
        }
        if beg >> 26 == end >> 26 {
            return ((1 << 3) - 1) / 7 + (beg >> 26);
        }
        0
    }

    #[test]
    fn test_compute_bin_matches_reg2bin() {
        let intervals = [
            (0, 1),
            (0, 16384),
            (0, 16385),
            (16383, 16385),
            (100, 200),
            (131_071, 131_073),
            (1_048_575, 1_048_577),
            (8_388_607, 8_388_609),
            (67_108_863, 67_108_865),
            (0, 1 << 29),
            (536_870_911, 536_870_912),
        ];
        for (start, end) in intervals {
            assert_eq!(compute_bin(start, end), reg2bin(start, end), "[{start}, {end})");
        }
        assert_eq!(compute_bin(100, 200), 4681);
        assert_eq!(compute_bin(0, 1 << 29), 0);
    }

    #[test]
    fn test_compute_bin_empty_interval() {
        assert_eq!(compute_bin(20_000, 20_000), compute_bin(20_000, 20_001));
    }

    #[test]
    fn test_bins_within_reference_bound() {
        let length = 1_000_000;
        let max = max_bin_for(length);
        for start in (0..length).step_by(9_973) {
            for span in [1, 150, 20_000, 300_000] {
                let end = (start + span).min(length);
                let bin = compute_bin(start, end);
                assert!(bin <= max, "bin {bin} > {max} for [{start}, {end})");
            }
        }
    }

    #[test]
    fn test_sub_interval_is_same_or_finer_level() {
        let outer = (100_000, 400_000);
        let outer_level = bin_level(compute_bin(outer.0, outer.1));
        for (start, end) in [(100_000, 100_001), (150_000, 300_000), (399_000, 400_000)] {
            assert!(bin_level(compute_bin(start, end)) >= outer_level);
        }
    }

    #[test]
    fn test_max_bin_for() {
        assert_eq!(max_bin_for(1_000_000), 4681 + 61);
        assert_eq!(max_bin_for(536_870_912), 37449);
        assert_eq!(max_bin_for(536_887_296), 37450);
    }

    #[test]
    fn test_bin_level() {
        assert_eq!(bin_level(0), 0);
        assert_eq!(bin_level(8), 1);
        assert_eq!(bin_level(9), 2);
        assert_eq!(bin_level(584), 3);
        assert_eq!(bin_level(585), 4);
        assert_eq!(bin_level(4681), 5);
        assert_eq!(bin_level(MAX_BIN), 5);
    }

    #[test]
    fn test_region_to_bins() {
        assert_eq!(region_to_bins(0, 1), vec![0, 1, 9, 73, 585, 4681]);

        let bins = region_to_bins(16_000, 17_000);
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681, 4682]);

        // Every bin a record could be assigned to is a candidate
        for (start, end) in [(100, 200), (16_000, 40_000), (130_000, 140_000)] {
            assert!(region_to_bins(start, end).contains(&compute_bin(start, end)));
        }
    }

    #[test]
    fn test_bin_builder_merges_touching_chunks() {
        let mut builder = BinBuilder::new(4681);
        builder.add_chunk(Chunk::new(vo(0, 10), vo(100, 5)));
        builder.add_chunk(Chunk::new(vo(100, 5), vo(100, 900)));
        assert_eq!(builder.len(), 1);

        // Consecutive block offset also merges
        builder.add_chunk(Chunk::new(vo(101, 0), vo(101, 40)));
        let bin = builder.build();
        assert_eq!(bin.chunks(), &[Chunk::new(vo(0, 10), vo(101, 40))]);
    }

    #[test]
    fn test_bin_builder_keeps_distant_chunks() {
        let mut builder = BinBuilder::new(4681);
        builder.add_chunk(Chunk::new(vo(0, 10), vo(100, 5)));
        builder.add_chunk(Chunk::new(vo(102, 0), vo(102, 50)));
        let bin = builder.build();
        assert_eq!(bin.chunks().len(), 2);
        assert_eq!(bin.chunks()[1], Chunk::new(vo(102, 0), vo(102, 50)));
    }

    #[test]
    fn test_sort_bins_by_number() {
        let mut bins = vec![Bin::new(4681, vec![]), Bin::new(0, vec![]), Bin::new(73, vec![])];
        sort_bins_by_number(&mut bins);
        let numbers: Vec<u32> = bins.iter().map(Bin::bin_number).collect();
        assert_eq!(numbers, vec![0, 73, 4681]);
    }
}
