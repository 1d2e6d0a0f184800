//! Binary encodings for export blobs and stored records.
//!
//! # Export blob (format version 1)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | Format version |
//! | 1 | 1 | Flags (bit 0: signature present) |
//! | 2 | 8 | Remaining TTL in seconds (`i64`, LE) |
//! | 10 | 4 | Value count (`u32`, LE) |
//! | 14 | 4 × n | Signature values (`u32`, LE) |
//!
//! # Stored record (format version 1)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | Format version |
//! | 1 | 8 | Write version (`u64`, LE) |
//! | 9 | 8 | Expiry timestamp (`u64`, LE) |
//! | 17 | 4 | Value count (`u32`, LE) |
//! | 21 | 4 × n | Signature values (`u32`, LE) |

use crate::models::{Signature, SignatureRecord};
use crate::{Error, Result};

/// Current format version for both encodings.
pub const FORMAT_VERSION: u8 = 1;

const FLAG_SIGNATURE: u8 = 0b0000_0001;

/// Portable signature snapshot produced by `export`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSignature {
    /// The signature, or `None` when the exported key had no record.
    pub signature: Option<Signature>,
    /// Seconds of life left relative to the export timestamp.
    pub ttl: i64,
}

/// Encodes an export blob.
#[must_use]
pub fn encode_export(exported: &ExportedSignature) -> Vec<u8> {
    let values = exported.signature.as_ref().map_or(&[][..], Signature::values);
    let mut out = Vec::with_capacity(14 + values.len() * 4);
    out.push(FORMAT_VERSION);
    out.push(if exported.signature.is_some() {
        FLAG_SIGNATURE
    } else {
        0
    });
    out.extend_from_slice(&exported.ttl.to_le_bytes());
    write_values(&mut out, values);
    out
}

/// Decodes an export blob.
///
/// # Errors
///
/// Returns [`Error::Serialization`] for truncated input, trailing bytes, an
/// unknown format version, or unknown flags.
pub fn decode_export(bytes: &[u8]) -> Result<ExportedSignature> {
    let mut reader = Reader::new(bytes);
    check_version(reader.u8()?)?;
    let flags = reader.u8()?;
    if flags & !FLAG_SIGNATURE != 0 {
        return Err(Error::Serialization(format!("unknown flags {flags:#04x}")));
    }
    let ttl = i64::from_le_bytes(reader.array()?);
    let values = reader.values()?;
    reader.finish()?;

    let signature = if flags & FLAG_SIGNATURE == 0 {
        if !values.is_empty() {
            return Err(Error::Serialization(
                "values present without signature flag".to_string(),
            ));
        }
        None
    } else {
        Some(Signature::new(values))
    };

    Ok(ExportedSignature { signature, ttl })
}

/// Encodes a record for storage at rest.
#[must_use]
pub fn encode_record(record: &SignatureRecord) -> Vec<u8> {
    let values = record.signature.values();
    let mut out = Vec::with_capacity(21 + values.len() * 4);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&record.version.to_le_bytes());
    out.extend_from_slice(&record.expires_at.to_le_bytes());
    write_values(&mut out, values);
    out
}

/// Decodes a stored record.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the bytes are not a valid record.
pub fn decode_record(bytes: &[u8]) -> Result<SignatureRecord> {
    let mut reader = Reader::new(bytes);
    check_version(reader.u8()?)?;
    let version = u64::from_le_bytes(reader.array()?);
    let expires_at = u64::from_le_bytes(reader.array()?);
    let values = reader.values()?;
    reader.finish()?;
    Ok(SignatureRecord::new(
        version,
        expires_at,
        Signature::new(values),
    ))
}

fn check_version(version: u8) -> Result<()> {
    if version == FORMAT_VERSION {
        Ok(())
    } else {
        Err(Error::Serialization(format!(
            "unsupported format version {version}"
        )))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_values(out: &mut Vec<u8>, values: &[u32]) {
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Cursor over an input buffer.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "truncated input: needed {len} bytes at offset {}",
                    self.offset
                ))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn values(&mut self) -> Result<Vec<u32>> {
        let count = u32::from_le_bytes(self.array()?) as usize;
        let raw = self.take(count.saturating_mul(4))?;
        Ok(raw
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    fn finish(&self) -> Result<()> {
        if self.offset == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::Serialization(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )))
        }
    }
}
