//! BAM alignment records, decoded only as far as indexing needs.
//!
//! Fixed fields of a record payload (after the 4-byte block_size):
//!
//! ```text
//! 0   refID        i32
//! 4   pos          i32  (0-based)
//! 8   l_read_name  u8
//! 9   mapq         u8
//! 10  bin          u16
//! 12  n_cigar_op   u16
//! 14  flag         u16
//! 16  l_seq        i32
//! 20  next_refID   i32
//! 24  next_pos     i32
//! 28  tlen         i32
//! 32  read_name, cigar (u32 each), seq, qual, tags
//! ```

use super::{SamHeader, FLAG_UNMAPPED};
use crate::error::{Error, Result};
use crate::index::bin::{compute_bin, UNPLACED_BIN};
use crate::AlignmentRecord;

const FIXED_FIELDS_LEN: usize = 32;

/// CIGAR operation kinds in BAM encoding order (`MIDNSHP=X`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Padding,
    SequenceMatch,
    SequenceMismatch,
}

impl CigarKind {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Match,
            1 => Self::Insertion,
            2 => Self::Deletion,
            3 => Self::Skip,
            4 => Self::SoftClip,
            5 => Self::HardClip,
            6 => Self::Padding,
            7 => Self::SequenceMatch,
            8 => Self::SequenceMismatch,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_char(c: u8) -> Option<Self> {
        b"MIDNSHP=X".iter().position(|&op| op == c).and_then(|i| Self::from_code(i as u32))
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Deletion | Self::Skip | Self::SequenceMatch | Self::SequenceMismatch
        )
    }

    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u32) -> Self {
        Self { kind, len }
    }

    fn encode(self) -> u32 {
        (self.len << 4) | self.kind.code()
    }

    fn decode(raw: u32) -> Result<Self> {
        let kind = CigarKind::from_code(raw & 0xf)
            .ok_or_else(|| Error::InvalidRecord(format!("unknown CIGAR op code {}", raw & 0xf)))?;
        Ok(Self { kind, len: raw >> 4 })
    }
}

/// Parse a textual CIGAR such as `10M2D5M`. `*` yields no operations.
pub fn parse_cigar(text: &str) -> Result<Vec<CigarOp>> {
    if text == "*" {
        return Ok(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut have_digits = false;
    for &c in text.as_bytes() {
        if c.is_ascii_digit() {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(u32::from(c - b'0')))
                .ok_or_else(|| Error::InvalidRecord(format!("CIGAR length overflow in {text}")))?;
            have_digits = true;
        } else {
            let kind = CigarKind::from_char(c)
                .filter(|_| have_digits)
                .ok_or_else(|| Error::InvalidRecord(format!("malformed CIGAR {text}")))?;
            ops.push(CigarOp::new(kind, len));
            len = 0;
            have_digits = false;
        }
    }
    if have_digits {
        return Err(Error::InvalidRecord(format!("malformed CIGAR {text}")));
    }
    Ok(ops)
}

/// A decoded BAM record. The reference name borrows from the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BamRecord<'h> {
    reference_id: i32,
    reference_name: Option<&'h str>,
    position: i32,
    mapq: u8,
    flags: u16,
    read_name: Vec<u8>,
    cigar: Vec<CigarOp>,
}

impl<'h> BamRecord<'h> {
    /// Decode a record payload (without its leading block_size).
    pub fn decode(data: &[u8], header: &'h SamHeader) -> Result<Self> {
        if data.len() < FIXED_FIELDS_LEN {
            return Err(Error::InvalidRecord(format!(
                "record of {} bytes is shorter than the fixed fields",
                data.len()
            )));
        }
        let i32_at =
            |at: usize| i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);

        let reference_id = i32_at(0);
        let position = i32_at(4);
        let l_read_name = data[8] as usize;
        let mapq = data[9];
        let n_cigar_op = u16_at(12) as usize;
        let flags = u16_at(14);

        let reference_name = match usize::try_from(reference_id) {
            Ok(id) => Some(
                header
                    .references
                    .get(id)
                    .map(|r| r.name.as_str())
                    .ok_or_else(|| Error::UnknownReference(format!("#{id}")))?,
            ),
            Err(_) => None,
        };

        let cigar_start = FIXED_FIELDS_LEN + l_read_name;
        let cigar_end = cigar_start + n_cigar_op * 4;
        if data.len() < cigar_end {
            return Err(Error::InvalidRecord(format!(
                "record of {} bytes cannot hold {} CIGAR operations",
                data.len(),
                n_cigar_op
            )));
        }

        let mut read_name = data[FIXED_FIELDS_LEN..cigar_start].to_vec();
        if read_name.last() == Some(&0) {
            read_name.pop();
        }

        let cigar = data[cigar_start..cigar_end]
            .chunks_exact(4)
            .map(|raw| CigarOp::decode(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { reference_id, reference_name, position, mapq, flags, read_name, cigar })
    }

    /// Reference id, -1 when the read has none
    pub fn reference_id(&self) -> i32 {
        self.reference_id
    }

    /// 0-based leftmost position, -1 when the read has none
    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn mapq(&self) -> u8 {
        self.mapq
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn read_name(&self) -> &[u8] {
        &self.read_name
    }

    pub fn cigar(&self) -> &[CigarOp] {
        &self.cigar
    }

    /// Half-open 0-based reference interval covered by a mapped read.
    pub fn alignment_interval(&self) -> Option<(u32, u32)> {
        if !self.is_mapped() {
            return None;
        }
        let start = self.position as u32;
        Some((start, start.saturating_add(self.reference_span().max(1))))
    }
}

impl AlignmentRecord for BamRecord<'_> {
    fn is_mapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED == 0 && self.reference_id >= 0 && self.position >= 0
    }

    fn reference_name(&self) -> Option<&str> {
        self.reference_name
    }

    fn start_position(&self) -> u32 {
        (self.position.max(-1) + 1) as u32
    }

    fn reference_span(&self) -> u32 {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .fold(0u32, |span, op| span.saturating_add(op.len))
    }
}

/// Everything needed to encode one record.
#[derive(Clone, Debug)]
pub struct RecordSpec {
    pub read_name: String,
    pub reference_id: i32,
    /// 0-based position, -1 for none
    pub position: i32,
    pub mapq: u8,
    pub flags: u16,
    pub cigar: Vec<CigarOp>,
    pub sequence: Vec<u8>,
}

impl RecordSpec {
    /// A mapped read whose sequence length follows its CIGAR.
    pub fn mapped(
        read_name: impl Into<String>,
        reference_id: i32,
        position: i32,
        cigar: Vec<CigarOp>,
    ) -> Self {
        let read_len: u32 =
            cigar.iter().filter(|op| op.kind.consumes_read()).map(|op| op.len).sum();
        Self {
            read_name: read_name.into(),
            reference_id,
            position,
            mapq: 60,
            flags: 0,
            cigar,
            sequence: b"ACGT".iter().cycle().take(read_len as usize).copied().collect(),
        }
    }

    /// An unmapped read, optionally placed next to its mate.
    pub fn unmapped(read_name: impl Into<String>, placement: Option<(i32, i32)>) -> Self {
        let (reference_id, position) = placement.unwrap_or((-1, -1));
        Self {
            read_name: read_name.into(),
            reference_id,
            position,
            mapq: 0,
            flags: FLAG_UNMAPPED,
            cigar: Vec::new(),
            sequence: b"ACGTACGTAC".to_vec(),
        }
    }

    fn bin(&self) -> u16 {
        if self.position < 0 {
            return UNPLACED_BIN as u16;
        }
        let span: u32 = if self.flags & FLAG_UNMAPPED != 0 {
            0
        } else {
            self.cigar.iter().filter(|op| op.kind.consumes_reference()).map(|op| op.len).sum()
        };
        let start = self.position as u32;
        compute_bin(start, start + span.max(1)) as u16
    }

    /// Encode as a complete record, including the leading block_size.
    ///
    /// Fails if the read name or CIGAR is too long for its BAM length field.
    pub fn encode(&self) -> Result<Vec<u8>> {
        const SEQ_CODES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

        let l_read_name = u8::try_from(self.read_name.len() + 1).map_err(|_| {
            Error::InvalidRecord(format!("read name of {} bytes", self.read_name.len()))
        })?;
        let n_cigar_op = u16::try_from(self.cigar.len()).map_err(|_| {
            Error::InvalidRecord(format!("{} CIGAR operations", self.cigar.len()))
        })?;
        let l_seq = self.sequence.len();
        let payload_len = FIXED_FIELDS_LEN
            + usize::from(l_read_name)
            + self.cigar.len() * 4
            + l_seq.div_ceil(2)
            + l_seq;
        let block_size = i32::try_from(payload_len)
            .map_err(|_| Error::InvalidRecord(format!("record of {payload_len} bytes")))?;

        let mut out = Vec::with_capacity(4 + payload_len);
        out.extend_from_slice(&block_size.to_le_bytes());
        out.extend_from_slice(&self.reference_id.to_le_bytes());
        out.extend_from_slice(&self.position.to_le_bytes());
        out.push(l_read_name);
        out.push(self.mapq);
        out.extend_from_slice(&self.bin().to_le_bytes());
        out.extend_from_slice(&n_cigar_op.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&(l_seq as i32).to_le_bytes());
        out.extend_from_slice(&(-1i32).to_le_bytes()); // next_refID
        out.extend_from_slice(&(-1i32).to_le_bytes()); // next_pos
        out.extend_from_slice(&0i32.to_le_bytes()); // tlen
        out.extend_from_slice(self.read_name.as_bytes());
        out.push(0);
        for op in &self.cigar {
            out.extend_from_slice(&op.encode().to_le_bytes());
        }
        let code = |b: u8| {
            SEQ_CODES.iter().position(|&c| c == b.to_ascii_uppercase()).unwrap_or(15) as u8
        };
        for pair in self.sequence.chunks(2) {
            let high = code(pair[0]) << 4;
            let low = pair.get(1).map_or(0, |&b| code(b));
            out.push(high | low);
        }
        out.resize(out.len() + l_seq, 0xff); // qualities absent
        Ok(out)
    }
}
