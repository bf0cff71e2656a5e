/// Maximum total BGZF block size (header + deflate + footer)
pub const MAX_BGZF_BLOCK_SIZE: usize = 65536; // 64KB

/// Default uncompressed payload per block, leaving room for incompressible data
pub const BGZF_BLOCK_SIZE: usize = 65280;

/// BGZF header size (gzip header with the BC extra subfield)
pub const BGZF_HEADER_SIZE: usize = 18;

/// BGZF footer size (CRC32 + ISIZE)
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Gzip magic bytes
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extra subfield identifier carrying BSIZE
pub const BGZF_SUBFIELD_ID: [u8; 2] = [b'B', b'C'];

/// FEXTRA flag bit in the gzip header
pub const FEXTRA_FLAG: u8 = 0x04;

/// BGZF EOF block (28 bytes)
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, // gzip magic, method, flags (FEXTRA)
    0x00, 0x00, 0x00, 0x00, // mtime
    0x00, 0xff, // xfl, os
    0x06, 0x00, // xlen = 6
    0x42, 0x43, // subfield ID "BC"
    0x02, 0x00, // subfield length = 2
    0x1b, 0x00, // BSIZE = 27 (28 - 1)
    0x03, 0x00, // empty deflate block
    0x00, 0x00, 0x00, 0x00, // CRC32 = 0
    0x00, 0x00, 0x00, 0x00, // ISIZE = 0
];
