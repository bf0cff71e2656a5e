use std::io::{Read, Seek};

use super::{BamRecord, SamHeader};
use crate::bgzf::{BgzfReader, VirtualFileOffset};
use crate::error::{Error, Result};

/// A record together with the virtual offsets bracketing its bytes.
#[derive(Clone, Debug)]
pub struct IndexedRecord<'h> {
    pub record: BamRecord<'h>,
    /// Offset of the record's block_size field
    pub start: VirtualFileOffset,
    /// Offset just past the record
    pub end: VirtualFileOffset,
}

/// Sequential BAM reader that reports where each record lives.
pub struct BamReader<R> {
    inner: BgzfReader<R>,
    buffer: Vec<u8>,
}

impl<R: Read> BamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::from_bgzf(BgzfReader::new(inner))
    }

    pub fn from_bgzf(inner: BgzfReader<R>) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read the header. Must be called once before any record.
    pub fn read_header(&mut self) -> Result<SamHeader> {
        SamHeader::read(&mut self.inner)
    }

    /// Read the next record, or `None` at the end of the stream.
    pub fn read_record<'h>(&mut self, header: &'h SamHeader) -> Result<Option<IndexedRecord<'h>>> {
        if self.inner.at_eof()? {
            return Ok(None);
        }
        let start = self.inner.virtual_position();

        let mut size = [0u8; 4];
        self.inner.read_exact_bytes(&mut size, "record length")?;
        let block_size = i32::from_le_bytes(size);
        if block_size < 0 {
            return Err(Error::InvalidRecord(format!(
                "negative block_size {block_size} at {start}"
            )));
        }

        self.inner.read_to_vec(&mut self.buffer, block_size as usize, "record body")?;
        let end = self.inner.virtual_position();

        let record = BamRecord::decode(&self.buffer, header)?;
        Ok(Some(IndexedRecord { record, start, end }))
    }

    pub fn virtual_position(&self) -> VirtualFileOffset {
        self.inner.virtual_position()
    }

    pub fn get_ref(&self) -> &BgzfReader<R> {
        &self.inner
    }
}

impl<R: Read + Seek> BamReader<R> {
    /// Jump to a record start taken from an index chunk.
    pub fn seek(&mut self, offset: VirtualFileOffset) -> Result<()> {
        self.inner.seek(offset)
    }
}
