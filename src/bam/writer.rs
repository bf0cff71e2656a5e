use std::io::Write;

use super::{RecordSpec, SamHeader};
use crate::bgzf::{BgzfWriter, VirtualFileOffset};
use crate::error::Result;

/// Writes a BAM stream and reports where every record landed.
pub struct BamWriter<W: Write> {
    inner: BgzfWriter<W>,
}

impl<W: Write> BamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::from_bgzf(BgzfWriter::new(inner))
    }

    pub fn from_bgzf(inner: BgzfWriter<W>) -> Self {
        Self { inner }
    }

    /// Write the header; records start in a fresh block, as htslib does.
    pub fn write_header(&mut self, header: &SamHeader) -> Result<()> {
        header.write(&mut self.inner)?;
        self.inner.flush_block()
    }

    /// Write one record, returning its `(start, end)` virtual offsets.
    pub fn write_record(
        &mut self,
        record: &RecordSpec,
    ) -> Result<(VirtualFileOffset, VirtualFileOffset)> {
        let start = self.inner.virtual_position();
        self.inner.write_all(&record.encode()?)?;
        Ok((start, self.inner.virtual_position()))
    }

    /// Force a block boundary after the records written so far.
    pub fn flush_block(&mut self) -> Result<()> {
        self.inner.flush_block()
    }

    pub fn virtual_position(&self) -> VirtualFileOffset {
        self.inner.virtual_position()
    }

    pub fn finish(self) -> Result<W> {
        self.inner.finish()
    }
}
