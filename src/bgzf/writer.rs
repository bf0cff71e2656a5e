use super::constants::*;
use super::offset::VirtualFileOffset;
use crate::error::{Error, Result};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Writes a BGZF stream, cutting blocks at `block_size` uncompressed bytes
pub struct BgzfWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
    block_size: usize,
    compression: Compression,
    /// Compressed bytes written so far (address of the next block)
    compressed_offset: u64,
}

impl<W: Write> BgzfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_block_size(writer, BGZF_BLOCK_SIZE)
    }

    /// Create a writer with a custom uncompressed block size (clamped to the BGZF default)
    pub fn with_block_size(writer: W, block_size: usize) -> Self {
        let block_size = block_size.clamp(1, BGZF_BLOCK_SIZE);
        Self {
            writer,
            buffer: Vec::with_capacity(block_size),
            block_size,
            compression: Compression::default(),
            compressed_offset: 0,
        }
    }

    /// Position the next written byte will occupy
    pub fn virtual_position(&self) -> VirtualFileOffset {
        VirtualFileOffset::new(self.compressed_offset, self.buffer.len() as u16)
    }

    /// Emit buffered bytes as a block, even if it is not full
    pub fn flush_block(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buffer);
        self.write_block(&data)?;
        self.buffer = data;
        self.buffer.clear();
        Ok(())
    }

    /// Flush remaining data, write the EOF marker and return the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.flush_block()?;
        self.writer.write_all(&BGZF_EOF)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Get a reference to the inner writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn append(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let room = self.block_size - self.buffer.len();
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            data = &data[n..];
            if self.buffer.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Compress and write one block
    fn write_block(&mut self, uncompressed: &[u8]) -> Result<()> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.compression);
        encoder.write_all(uncompressed)?;
        let deflate_data = encoder.finish()?;

        let block_size = BGZF_HEADER_SIZE + deflate_data.len() + BGZF_FOOTER_SIZE;
        if block_size > MAX_BGZF_BLOCK_SIZE {
            return Err(Error::BgzfBlockTooLarge { size: block_size, max: MAX_BGZF_BLOCK_SIZE });
        }

        let crc = crc32fast::hash(uncompressed);

        self.write_header(block_size - 1)?; // BSIZE is block_size - 1
        self.writer.write_all(&deflate_data)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.writer.write_all(&(uncompressed.len() as u32).to_le_bytes())?;

        self.compressed_offset += block_size as u64;
        Ok(())
    }

    /// Write the BGZF header (18 bytes)
    fn write_header(&mut self, bsize: usize) -> Result<()> {
        let header = [
            GZIP_MAGIC[0],
            GZIP_MAGIC[1],
            0x08,        // compression method (DEFLATE)
            FEXTRA_FLAG, // flags
            0x00,
            0x00,
            0x00,
            0x00, // mtime
            0x00, // extra flags
            0xff, // OS (unknown)
            0x06,
            0x00, // xlen = 6
            BGZF_SUBFIELD_ID[0],
            BGZF_SUBFIELD_ID[1],
            0x02,
            0x00,                        // subfield length = 2
            (bsize & 0xFF) as u8,        // BSIZE low byte
            ((bsize >> 8) & 0xFF) as u8, // BSIZE high byte
        ];
        self.writer.write_all(&header)?;
        Ok(())
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(|e| match e {
            Error::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::Other, other),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
