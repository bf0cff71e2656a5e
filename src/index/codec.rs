//! `.bai` serialization.
//!
//! Format (little-endian):
//! - magic `BAI\1`
//! - n_ref: i32
//! - For each reference:
//!   - n_bin: i32
//!   - For each bin: bin: u32, n_chunk: i32, then n_chunk pairs of u64 offsets
//!   - n_intv: i32, then n_intv u64 offsets
//! - Optional trailing n_no_coor: u64
//!
//! Bin 37450 is not a real bin. When present (and the reference is short
//! enough that 37450 cannot be a real bin) it holds two pseudo-chunks:
//! `(first record offset, last record end)` and
//! `(aligned count, unaligned count)`.

use std::io::{self, Read, Write};

use log::{debug, warn};

use super::bin::{max_bin_for, Bin, METADATA_BIN};
use super::chunk::Chunk;
use super::indexer::BamIndex;
use super::reference::{ReferenceIndex, ReferenceMetadata};
use crate::bam::SamHeader;
use crate::bgzf::VirtualFileOffset;
use crate::error::{Error, Result};
use crate::IndexConfig;

/// Magic bytes opening a `.bai` file
pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";

/// Whether bin 37450 on this reference is the metadata pseudo-bin
/// rather than ordinary data.
pub fn is_metadata_bin(bin_number: u32, reference_length: u32) -> bool {
    bin_number == METADATA_BIN && METADATA_BIN > max_bin_for(reference_length)
}

/// Parse an index. The header supplies reference lengths, which decide
/// whether bin 37450 is metadata.
pub fn read_index<R: Read>(reader: R, header: &SamHeader) -> Result<BamIndex> {
    let mut reader = OffsetReader::new(reader);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic, "magic")?;
    if magic != BAI_MAGIC {
        return Err(Error::InvalidIndexMagic(magic));
    }

    let n_ref = reader.read_count("reference count")?;
    if n_ref != header.len() {
        return Err(Error::ReferenceCountMismatch { header: header.len(), index: n_ref });
    }

    let mut references = Vec::with_capacity(n_ref);
    for reference in &header.references {
        references.push(read_reference(&mut reader, reference.length)?);
    }

    let unmapped_count = reader.read_optional_u64()?;
    if unmapped_count.is_none() {
        warn!("index has no trailing unmapped read count");
    }

    BamIndex::new(header.clone(), references, unmapped_count)
}

fn read_reference<R: Read>(
    reader: &mut OffsetReader<R>,
    reference_length: u32,
) -> Result<ReferenceIndex> {
    let n_bin = reader.read_count("bin count")?;
    let mut bins = Vec::with_capacity(n_bin.min(METADATA_BIN as usize + 1));
    let mut metadata = None;

    for _ in 0..n_bin {
        let bin_number = reader.read_u32("bin number")?;
        let n_chunk = reader.read_i32("chunk count")?;
        if n_chunk < 0 {
            return Err(Error::NegativeCount { field: "chunk count", value: n_chunk });
        }

        if is_metadata_bin(bin_number, reference_length) {
            if n_chunk != 2 {
                return Err(Error::InvalidMetadataBin { chunks: n_chunk });
            }
            let first_offset = reader.read_offset("metadata offsets")?;
            let last_offset = reader.read_offset("metadata offsets")?;
            let aligned_records = reader.read_u64("metadata counts")?;
            let unaligned_records = reader.read_u64("metadata counts")?;
            metadata = Some(ReferenceMetadata {
                first_offset,
                last_offset,
                aligned_records,
                unaligned_records,
            });
            continue;
        }

        let mut chunks = Vec::with_capacity((n_chunk as usize).min(1 << 16));
        for _ in 0..n_chunk {
            let begin = reader.read_offset("chunk begin")?;
            let end = reader.read_offset("chunk end")?;
            chunks.push(Chunk::new(begin, end));
        }
        bins.push(Bin::new(bin_number, chunks));
    }

    let n_intv = reader.read_count("interval count")?;
    let mut intervals = Vec::with_capacity(n_intv.min(1 << 16));
    for _ in 0..n_intv {
        intervals.push(reader.read_offset("linear index")?);
    }

    Ok(ReferenceIndex::new(bins, intervals, metadata))
}

/// Serialize an index.
pub fn write_index<W: Write>(mut writer: W, index: &BamIndex, config: &IndexConfig) -> Result<()> {
    writer.write_all(&BAI_MAGIC)?;
    write_i32(&mut writer, index.references().len())?;

    for (reference, sequence) in index.references().iter().zip(&index.header().references) {
        write_reference(&mut writer, reference, sequence.length, config)?;
    }

    if config.write_unmapped_count {
        if let Some(count) = index.total_unmapped_reads() {
            writer.write_all(&count.to_le_bytes())?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn write_reference<W: Write>(
    writer: &mut W,
    reference: &ReferenceIndex,
    reference_length: u32,
    config: &IndexConfig,
) -> Result<()> {
    // The pseudo-bin is only written where a reader can tell it apart
    let metadata = reference.metadata().filter(|_| {
        config.write_metadata
            && !reference.bins().is_empty()
            && is_metadata_bin(METADATA_BIN, reference_length)
    });

    write_i32(writer, reference.bins().len() + usize::from(metadata.is_some()))?;
    for bin in reference.bins() {
        writer.write_all(&bin.bin_number().to_le_bytes())?;
        write_i32(writer, bin.chunks().len())?;
        for chunk in bin.chunks() {
            writer.write_all(&chunk.begin().raw().to_le_bytes())?;
            writer.write_all(&chunk.end().raw().to_le_bytes())?;
        }
    }

    if let Some(metadata) = metadata {
        writer.write_all(&METADATA_BIN.to_le_bytes())?;
        write_i32(writer, 2)?;
        writer.write_all(&metadata.first_offset.raw().to_le_bytes())?;
        writer.write_all(&metadata.last_offset.raw().to_le_bytes())?;
        writer.write_all(&metadata.aligned_records.to_le_bytes())?;
        writer.write_all(&metadata.unaligned_records.to_le_bytes())?;
    }

    write_i32(writer, reference.intervals().len())?;
    for offset in reference.intervals() {
        writer.write_all(&offset.raw().to_le_bytes())?;
    }

    debug!(
        "wrote {} bins and {} linear windows{}",
        reference.bins().len(),
        reference.intervals().len(),
        if metadata.is_some() { " with metadata" } else { "" }
    );
    Ok(())
}

fn write_i32<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let value = i32::try_from(value)
        .map_err(|_| Error::Internal(format!("count {value} does not fit in an int32")))?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Reader that remembers how far it has got, for error messages.
struct OffsetReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> OffsetReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        let offset = self.offset;
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Truncated { offset, context }
            } else {
                Error::Io(e)
            }
        })?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn read_i32(&mut self, context: &'static str) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, context)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, context)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, context: &'static str) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf, context)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_offset(&mut self, context: &'static str) -> Result<VirtualFileOffset> {
        self.read_u64(context).map(VirtualFileOffset::from_raw)
    }

    fn read_count(&mut self, field: &'static str) -> Result<usize> {
        let value = self.read_i32(field)?;
        if value < 0 {
            return Err(Error::NegativeCount { field, value });
        }
        Ok(value as usize)
    }

    /// Read a trailing u64 if any bytes remain; a clean EOF yields `None`.
    fn read_optional_u64(&mut self) -> Result<Option<u64>> {
        let mut buf = [0u8; 8];
        let first = loop {
            match self.inner.read(&mut buf[..1]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        };
        if first == 0 {
            return Ok(None);
        }
        self.offset += 1;
        self.read_exact(&mut buf[1..], "unmapped read count")?;
        Ok(Some(u64::from_le_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::ReferenceSequence;
    use crate::index::{BamIndexer, ReferenceIndexBuilder};
    use std::io::Cursor;

    fn vo(block: u64, within: u16) -> VirtualFileOffset {
        VirtualFileOffset::new(block, within)
    }

    fn header(lengths: &[u32]) -> SamHeader {
        SamHeader::from_references(
            lengths
                .iter()
                .enumerate()
                .map(|(i, &len)| ReferenceSequence::new(format!("ref{i}"), len))
                .collect(),
        )
    }

    fn sample_index() -> BamIndex {
        let header = header(&[1_000_000, 40_000]);
        let mut first = ReferenceIndexBuilder::new(1_000_000);
        first.add_alignment(100, 200, vo(0, 0), vo(0, 80)).unwrap();
        first.add_alignment(100, 250, vo(0, 80), vo(0, 160)).unwrap();
        first.add_alignment(40_000, 40_100, vo(300, 0), vo(300, 70)).unwrap();
        first.add_alignment(999_000, 999_050, vo(900, 0), vo(900, 90)).unwrap();
        let second = ReferenceIndexBuilder::new(40_000);
        BamIndex::new(header, vec![first.build(), second.build()], Some(7)).unwrap()
    }

    fn encode(index: &BamIndex, config: &IndexConfig) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_index(&mut bytes, index, config).unwrap();
        bytes
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        let bytes = encode(&index, &IndexConfig::default());
        let parsed = read_index(Cursor::new(&bytes), index.header()).unwrap();
        assert_eq!(parsed, index);

        let metadata = parsed.references()[0].metadata().unwrap();
        assert_eq!(metadata.aligned_records, 4);
        assert_eq!(metadata.first_offset, vo(0, 0));
        assert_eq!(metadata.last_offset, vo(900, 90));
        assert_eq!(parsed.total_unmapped_reads(), Some(7));
    }

    #[test]
    fn test_byte_layout() {
        let header = header(&[100_000]);
        let mut builder = ReferenceIndexBuilder::new(100_000);
        builder.add_alignment(10, 20, vo(1, 2), vo(1, 30)).unwrap();
        let index = BamIndex::new(header, vec![builder.build()], Some(3)).unwrap();
        let bytes = encode(&index, &IndexConfig::default());

        let i32_at = |at: usize| i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        let u32_at = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        let u64_at = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());

        assert_eq!(&bytes[0..4], b"BAI\x01");
        assert_eq!(i32_at(4), 1); // n_ref
        assert_eq!(i32_at(8), 2); // n_bin, including metadata
        assert_eq!(u32_at(12), 4681);
        assert_eq!(i32_at(16), 1);
        assert_eq!(u64_at(20), vo(1, 2).raw());
        assert_eq!(u64_at(28), vo(1, 30).raw());
        assert_eq!(u32_at(36), 37450);
        assert_eq!(i32_at(40), 2);
        assert_eq!(u64_at(44), vo(1, 2).raw());
        assert_eq!(u64_at(52), vo(1, 30).raw());
        assert_eq!(u64_at(60), 1); // aligned
        assert_eq!(u64_at(68), 0); // unaligned
        assert_eq!(i32_at(76), 1); // n_intv
        assert_eq!(u64_at(80), vo(1, 2).raw());
        assert_eq!(u64_at(88), 3); // n_no_coor
        assert_eq!(bytes.len(), 96);
    }

    #[test]
    fn test_empty_reference_has_no_metadata_bin() {
        let header = header(&[5_000]);
        let index = BamIndex::new(header, vec![ReferenceIndex::default()], None).unwrap();
        let bytes = encode(&index, &IndexConfig::default());
        // magic, n_ref, n_bin = 0, n_intv = 0
        assert_eq!(bytes, [b'B', b'A', b'I', 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_optional_sections_can_be_disabled() {
        let index = sample_index();
        let config = IndexConfig {
            write_metadata: false,
            write_unmapped_count: false,
            ..Default::default()
        };
        let bytes = encode(&index, &config);
        let parsed = read_index(Cursor::new(&bytes), index.header()).unwrap();
        assert!(!parsed.references()[0].has_metadata());
        assert_eq!(parsed.references()[0].bins(), index.references()[0].bins());
        assert_eq!(parsed.total_unmapped_reads(), None);
    }

    #[test]
    fn test_metadata_bin_boundary() {
        // max_bin_for = 37449: 37450 is the pseudo-bin
        assert!(is_metadata_bin(METADATA_BIN, 536_870_912));
        // max_bin_for = 37450: 37450 is an ordinary bin number
        assert!(!is_metadata_bin(METADATA_BIN, 536_887_296));
        assert!(!is_metadata_bin(4681, 1_000));

        let raw_bin = |reference_length: u32| {
            let mut bytes = BAI_MAGIC.to_vec();
            bytes.extend_from_slice(&1i32.to_le_bytes());
            bytes.extend_from_slice(&1i32.to_le_bytes());
            bytes.extend_from_slice(&METADATA_BIN.to_le_bytes());
            bytes.extend_from_slice(&2i32.to_le_bytes());
            for value in [10u64, 20, 5, 1] {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            bytes.extend_from_slice(&0i32.to_le_bytes());
            read_index(Cursor::new(bytes), &header(&[reference_length])).unwrap()
        };

        let as_metadata = raw_bin(536_870_912);
        let reference = &as_metadata.references()[0];
        assert!(reference.bins().is_empty());
        assert_eq!(reference.number_of_aligned_reads(), 5);
        assert_eq!(reference.number_of_unaligned_reads(), 1);
        assert_eq!(reference.lowest_start_offset(), Some(VirtualFileOffset::from_raw(10)));

        let as_data = raw_bin(536_887_296);
        let reference = &as_data.references()[0];
        assert!(!reference.has_metadata());
        assert_eq!(reference.bins().len(), 1);
        assert_eq!(
            reference.bins()[0].chunks(),
            &[
                Chunk::new(VirtualFileOffset::from_raw(10), VirtualFileOffset::from_raw(20)),
                Chunk::new(VirtualFileOffset::from_raw(5), VirtualFileOffset::from_raw(1)),
            ]
        );
    }

    #[test]
    fn test_long_reference_skips_metadata_on_write() {
        let header = header(&[536_887_296]);
        let mut builder = ReferenceIndexBuilder::new(536_887_296);
        builder.add_alignment(0, 10, vo(0, 0), vo(0, 10)).unwrap();
        let index = BamIndex::new(header, vec![builder.build()], Some(0)).unwrap();
        let bytes = encode(&index, &IndexConfig::default());
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), 1);
    }

    #[test]
    fn test_bad_magic() {
        let err = read_index(Cursor::new(b"BAM\x01\0\0\0\0".to_vec()), &header(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidIndexMagic(magic) if &magic == b"BAM\x01"));
    }

    #[test]
    fn test_reference_count_mismatch() {
        let index = sample_index();
        let bytes = encode(&index, &IndexConfig::default());
        let err = read_index(Cursor::new(&bytes), &header(&[1_000_000])).unwrap_err();
        assert!(matches!(err, Error::ReferenceCountMismatch { header: 1, index: 2 }));
    }

    #[test]
    fn test_truncated_stream_reports_offset() {
        let index = sample_index();
        let bytes = encode(&index, &IndexConfig::default());
        let err = read_index(Cursor::new(&bytes[..30]), index.header()).unwrap_err();
        assert!(matches!(err, Error::Truncated { offset, .. } if offset <= 30));

        // A partial trailing count is an error, not a missing count
        let err = read_index(Cursor::new(&bytes[..bytes.len() - 3]), index.header()).unwrap_err();
        assert!(matches!(err, Error::Truncated { context: "unmapped read count", .. }));
    }

    #[test]
    fn test_negative_count() {
        let mut bytes = BAI_MAGIC.to_vec();
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        let err = read_index(Cursor::new(bytes), &header(&[])).unwrap_err();
        assert!(matches!(err, Error::NegativeCount { field: "reference count", value: -1 }));
    }

    #[test]
    fn test_round_trip_from_indexer() {
        let header = header(&[200_000]);
        let mut indexer = BamIndexer::new(header.clone());
        struct Mapped(u32);
        impl crate::AlignmentRecord for Mapped {
            fn is_mapped(&self) -> bool {
                true
            }
            fn reference_name(&self) -> Option<&str> {
                Some("ref0")
            }
            fn start_position(&self) -> u32 {
                self.0
            }
            fn reference_span(&self) -> u32 {
                120
            }
        }
        for i in 0..50u32 {
            let block = u64::from(i / 10) * 5;
            let within = (i % 10) as u16 * 100;
            let record = Mapped(1 + i * 3_000);
            indexer.add_record(Some(&record), vo(block, within), vo(block, within + 100)).unwrap();
        }
        let index = indexer.create_bam_index();
        let bytes = encode(&index, &IndexConfig::default());
        assert_eq!(read_index(Cursor::new(bytes), &header).unwrap(), index);
    }
}
