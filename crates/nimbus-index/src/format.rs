//! On-disk envelope wrapped around every index payload.
//!
//! ## Format
//! A fixed 64-byte little-endian header followed by the builder's payload:
//!
//! | offset | size | field                                   |
//! |-------:|-----:|-----------------------------------------|
//! | 0      | 8    | magic `NIMBUSIX`                        |
//! | 8      | 4    | format version                          |
//! | 12     | 4    | index kind tag                          |
//! | 16     | 8    | payload length                          |
//! | 24     | 8    | payload hash (first 8 bytes of BLAKE3)  |
//! | 32     | 16   | producer version, NUL padded            |
//! | 48     | 16   | reserved (zero)                         |
//!
//! Anything that fails to decode counts as an unreadable index: it is rebuilt unless the
//! policy forbids rebuilding.

use nimbus_core::{IndexKind, NIMBUS_VERSION};

pub const INDEX_MAGIC: [u8; 8] = *b"NIMBUSIX";
pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 64;

const PRODUCER_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("truncated index: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("not an index file (bad magic)")]
    BadMagic,
    #[error("unsupported index format version {found}, expected {expected}")]
    UnsupportedVersion { expected: u32, found: u32 },
    #[error("index kind tag {found} does not match expected {expected:?}")]
    WrongKind { expected: IndexKind, found: u32 },
    #[error("payload length mismatch: header says {declared}, file holds {found}")]
    LengthMismatch { declared: u64, found: u64 },
    #[error("payload hash mismatch: expected {expected:#018x}, found {found:#018x}")]
    HashMismatch { expected: u64, found: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub format_version: u32,
    pub kind: IndexKind,
    pub payload_len: u64,
    pub content_hash: u64,
    /// Version of the software that wrote the index. Informational only.
    pub producer: String,
}

pub fn encode(kind: IndexKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&INDEX_MAGIC);
    out.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&kind.tag().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&content_hash(payload).to_le_bytes());

    let mut producer = [0u8; PRODUCER_LEN];
    let version = NIMBUS_VERSION.as_bytes();
    let n = version.len().min(PRODUCER_LEN);
    producer[..n].copy_from_slice(&version[..n]);
    out.extend_from_slice(&producer);

    out.resize(HEADER_LEN, 0);
    out.extend_from_slice(payload);
    out
}

pub fn read_header(bytes: &[u8], expected: IndexKind) -> Result<IndexHeader, FormatError> {
    if bytes.len() < HEADER_LEN {
        return Err(FormatError::Truncated {
            expected: HEADER_LEN,
            found: bytes.len(),
        });
    }
    if bytes[..8] != INDEX_MAGIC {
        return Err(FormatError::BadMagic);
    }

    let format_version = u32_at(bytes, 8);
    if format_version != INDEX_FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            expected: INDEX_FORMAT_VERSION,
            found: format_version,
        });
    }

    let tag = u32_at(bytes, 12);
    let kind = IndexKind::from_tag(tag)
        .filter(|kind| *kind == expected)
        .ok_or(FormatError::WrongKind { expected, found: tag })?;

    let producer = &bytes[32..32 + PRODUCER_LEN];
    let producer_len = producer.iter().position(|b| *b == 0).unwrap_or(PRODUCER_LEN);

    Ok(IndexHeader {
        format_version,
        kind,
        payload_len: u64_at(bytes, 16),
        content_hash: u64_at(bytes, 24),
        producer: String::from_utf8_lossy(&producer[..producer_len]).into_owned(),
    })
}

/// Validate the envelope and return the payload it carries.
pub fn decode(bytes: &[u8], expected: IndexKind) -> Result<&[u8], FormatError> {
    let header = read_header(bytes, expected)?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != header.payload_len {
        return Err(FormatError::LengthMismatch {
            declared: header.payload_len,
            found: payload.len() as u64,
        });
    }
    let found = content_hash(payload);
    if found != header.content_hash {
        return Err(FormatError::HashMismatch {
            expected: header.content_hash,
            found,
        });
    }
    Ok(payload)
}

fn content_hash(payload: &[u8]) -> u64 {
    let hash = blake3::hash(payload);
    let mut first = [0u8; 8];
    first.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(first)
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn u64_at(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}
