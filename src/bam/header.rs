//! Reference sequence dictionary and the binary BAM header.
//!
//! Layout (little-endian):
//! - magic `BAM\1`
//! - l_text: i32, followed by the SAM text header
//! - n_ref: i32
//! - For each reference: l_name: i32, NUL-terminated name, l_ref: i32

use std::io::{Read, Write};

use super::BAM_MAGIC;
use crate::bgzf::BgzfReader;
use crate::error::{Error, Result};

/// Name and length of one reference sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: u32,
}

impl ReferenceSequence {
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self { name: name.into(), length }
    }
}

/// The parts of a SAM/BAM header the index depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamHeader {
    /// Plain-text header, carried through untouched
    pub text: String,
    /// Reference sequences in header order
    pub references: Vec<ReferenceSequence>,
}

impl SamHeader {
    /// Build a header from a reference dictionary, generating `@SQ` lines.
    pub fn from_references(references: Vec<ReferenceSequence>) -> Self {
        let mut text = String::from("@HD\tVN:1.6\tSO:coordinate\n");
        for reference in &references {
            text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", reference.name, reference.length));
        }
        Self { text, references }
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Position of the named reference in the dictionary.
    pub fn reference_index(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }

    /// Decode the header from the start of a BAM stream.
    pub fn read<R: Read>(reader: &mut BgzfReader<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact_bytes(&mut magic, "BAM magic")?;
        if magic != BAM_MAGIC {
            return Err(Error::InvalidBamMagic(magic));
        }

        let l_text = read_count(reader, "header text length")?;
        let mut text = Vec::new();
        reader.read_to_vec(&mut text, l_text, "header text")?;
        // Text may be NUL padded
        while text.last() == Some(&0) {
            text.pop();
        }
        let text = String::from_utf8_lossy(&text).into_owned();

        let n_ref = read_count(reader, "reference count")?;
        let mut references = Vec::with_capacity(n_ref.min(1 << 16));
        for _ in 0..n_ref {
            let l_name = read_count(reader, "reference name length")?;
            let mut name = Vec::new();
            reader.read_to_vec(&mut name, l_name, "reference name")?;
            if name.last() == Some(&0) {
                name.pop();
            }
            let length = read_count(reader, "reference length")? as u32;
            references.push(ReferenceSequence {
                name: String::from_utf8_lossy(&name).into_owned(),
                length,
            });
        }

        Ok(Self { text, references })
    }

    /// Encode the header into an (uncompressed) BAM byte stream.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&BAM_MAGIC)?;
        writer.write_all(&(self.text.len() as i32).to_le_bytes())?;
        writer.write_all(self.text.as_bytes())?;
        writer.write_all(&(self.references.len() as i32).to_le_bytes())?;
        for reference in &self.references {
            writer.write_all(&(reference.name.len() as i32 + 1).to_le_bytes())?;
            writer.write_all(reference.name.as_bytes())?;
            writer.write_all(&[0])?;
            writer.write_all(&(reference.length as i32).to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_count<R: Read>(reader: &mut BgzfReader<R>, field: &'static str) -> Result<usize> {
    let mut buf = [0u8; 4];
    reader.read_exact_bytes(&mut buf, field)?;
    let value = i32::from_le_bytes(buf);
    if value < 0 {
        return Err(Error::NegativeCount { field, value });
    }
    Ok(value as usize)
}
