//! Block-at-a-time BGZF reader that tracks virtual file offsets.
//!
//! Each block is inflated in full (ISIZE is known from the footer), so the
//! reader always knows the compressed address of the block it is serving
//! bytes from. That is what makes `virtual_position` cheap.

use std::io::{self, Read, Seek, SeekFrom};

use libdeflater::Decompressor;
use log::debug;

use super::constants::*;
use super::offset::VirtualFileOffset;
use crate::error::{Error, Result};

/// BGZF reader over any byte source.
pub struct BgzfReader<R> {
    inner: R,
    decompressor: Decompressor,
    verify_crc: bool,
    /// Compressed offset of the block in `buffer`
    block_address: u64,
    /// Compressed offset of the block after it
    next_block_address: u64,
    buffer: Vec<u8>,
    position: usize,
    compressed: Vec<u8>,
    blocks_read: u64,
}

impl<R: Read> BgzfReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decompressor: Decompressor::new(),
            verify_crc: true,
            block_address: 0,
            next_block_address: 0,
            buffer: Vec::with_capacity(MAX_BGZF_BLOCK_SIZE),
            position: 0,
            compressed: Vec::with_capacity(MAX_BGZF_BLOCK_SIZE),
            blocks_read: 0,
        }
    }

    /// Enable or disable CRC32 verification of inflated blocks.
    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Current position in the stream.
    ///
    /// Once every byte of a block has been consumed the position is reported
    /// as the start of the following block, matching htslib's `bgzf_tell`.
    pub fn virtual_position(&self) -> VirtualFileOffset {
        if self.position >= self.buffer.len() {
            VirtualFileOffset::new(self.next_block_address, 0)
        } else {
            VirtualFileOffset::new(self.block_address, self.position as u16)
        }
    }

    /// Number of non-empty blocks inflated so far.
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Returns true when no more uncompressed bytes are available.
    pub fn at_eof(&mut self) -> Result<bool> {
        if self.position < self.buffer.len() {
            return Ok(false);
        }
        Ok(!self.load_next_block()?)
    }

    /// Fill `buf` completely, failing with `Truncated` if the stream ends first.
    pub fn read_exact_bytes(&mut self, mut buf: &mut [u8], context: &'static str) -> Result<()> {
        while !buf.is_empty() {
            if self.position >= self.buffer.len() && !self.load_next_block()? {
                return Err(Error::Truncated { offset: self.virtual_position().raw(), context });
            }
            let available = &self.buffer[self.position..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.position += n;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Replace the contents of `buf` with the next `len` bytes.
    ///
    /// `buf` grows only as inflated data arrives, so a corrupt length field
    /// fails with `Truncated` instead of allocating `len` bytes up front.
    pub fn read_to_vec(
        &mut self,
        buf: &mut Vec<u8>,
        len: usize,
        context: &'static str,
    ) -> Result<()> {
        buf.clear();
        while buf.len() < len {
            if self.position >= self.buffer.len() && !self.load_next_block()? {
                return Err(Error::Truncated { offset: self.virtual_position().raw(), context });
            }
            let available = &self.buffer[self.position..];
            let n = available.len().min(len - buf.len());
            buf.extend_from_slice(&available[..n]);
            self.position += n;
        }
        Ok(())
    }

    /// Consume the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Load the next non-empty block. Returns false on a clean end of stream.
    fn load_next_block(&mut self) -> Result<bool> {
        loop {
            match self.read_block()? {
                None => return Ok(false),
                Some(0) => continue,
                Some(_) => return Ok(true),
            }
        }
    }

    /// Read and inflate one block, returning its uncompressed size.
    fn read_block(&mut self) -> Result<Option<usize>> {
        let offset = self.next_block_address;
        let mut header = [0u8; BGZF_HEADER_SIZE];

        // A clean end of stream is only allowed on a block boundary
        let first = loop {
            match self.inner.read(&mut header[..1]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        };
        if first == 0 {
            self.block_address = offset;
            self.buffer.clear();
            self.position = 0;
            return Ok(None);
        }
        read_fully(&mut self.inner, &mut header[1..], offset, "BGZF block header")?;

        if !is_bgzf_header(&header) {
            return Err(Error::InvalidBgzfHeader { offset });
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let block_size = u16::from_le_bytes([header[16], header[17]]) as usize + 1;

        // Skip any extra subfields after BC
        let mut skip = xlen - 6;
        while skip > 0 {
            let mut scratch = [0u8; 64];
            let n = skip.min(scratch.len());
            read_fully(&mut self.inner, &mut scratch[..n], offset, "BGZF extra field")?;
            skip -= n;
        }

        let overhead = 12 + xlen + BGZF_FOOTER_SIZE;
        if block_size < overhead {
            return Err(Error::InvalidBgzfHeader { offset });
        }
        let cdata_len = block_size - overhead;

        self.compressed.resize(cdata_len, 0);
        read_fully(&mut self.inner, &mut self.compressed, offset, "BGZF block data")?;

        let mut footer = [0u8; BGZF_FOOTER_SIZE];
        read_fully(&mut self.inner, &mut footer, offset, "BGZF block footer")?;
        let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let isize = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);

        if isize as usize > MAX_BGZF_BLOCK_SIZE {
            return Err(Error::BgzfBlockTooLarge { size: isize as usize, max: MAX_BGZF_BLOCK_SIZE });
        }

        self.buffer.resize(isize as usize, 0);
        let inflated = self
            .decompressor
            .deflate_decompress(&self.compressed, &mut self.buffer)
            .map_err(|_| Error::Decompression { offset })?;
        if inflated != isize as usize {
            return Err(Error::SizeMismatch { expected: isize, found: inflated as u32 });
        }

        if self.verify_crc {
            let found = crc32fast::hash(&self.buffer);
            if found != expected_crc {
                return Err(Error::Crc32Mismatch { expected: expected_crc, found });
            }
        }

        self.block_address = offset;
        self.next_block_address = offset + block_size as u64;
        self.position = 0;
        if isize > 0 {
            self.blocks_read += 1;
        }

        Ok(Some(isize as usize))
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Position the reader at a virtual offset.
    pub fn seek(&mut self, target: VirtualFileOffset) -> Result<()> {
        let block_offset = target.block_offset();
        self.inner.seek(SeekFrom::Start(block_offset))?;
        self.next_block_address = block_offset;
        self.block_address = block_offset;
        self.buffer.clear();
        self.position = 0;

        let within = target.within_block() as usize;
        if within == 0 {
            return Ok(());
        }

        match self.read_block()? {
            Some(len) if within <= len => {
                self.position = within;
                debug!("seeked to {}", target);
                Ok(())
            }
            _ => Err(Error::Truncated { offset: target.raw(), context: "seek target" }),
        }
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position >= self.buffer.len() {
            let more = self.load_next_block().map_err(into_io_error)?;
            if !more {
                return Ok(0);
            }
        }
        let available = &self.buffer[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Check the fixed BGZF header markers.
fn is_bgzf_header(header: &[u8; BGZF_HEADER_SIZE]) -> bool {
    header[0..2] == GZIP_MAGIC
        && header[2] == 8
        && header[3] & FEXTRA_FLAG != 0
        && u16::from_le_bytes([header[10], header[11]]) >= 6
        && header[12..14] == BGZF_SUBFIELD_ID
        && u16::from_le_bytes([header[14], header[15]]) == 2
}

fn read_fully<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    offset: u64,
    context: &'static str,
) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated { offset, context }
        } else {
            Error::Io(e)
        }
    })
}

fn into_io_error(e: Error) -> io::Error {
    match e {
        Error::Io(inner) => inner,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
