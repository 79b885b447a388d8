//! On-disk entry format
//!
//! ```text
//! offset 0  2 bytes  magic "MC"
//! offset 2  1 byte   format version
//! offset 3  1 byte   flags (bit 0: payload is gzip-compressed)
//! offset 4  1 byte   XOR of all URL bytes
//! offset 5  2 bytes  URL length, big-endian
//! offset 7  N bytes  URL
//!           rest     payload
//! ```
//!
//! Magic and version positions are fixed for good. A format change bumps
//! `FORMAT_VERSION`; entries with any other version read as absent.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

pub const MAGIC: [u8; 2] = *b"MC";
pub const FORMAT_VERSION: u8 = 1;
pub const FLAG_COMPRESSED: u8 = 0x01;
pub const HEADER_LEN: usize = 7;

/// Default size above which compression is attempted
pub const COMPRESSION_THRESHOLD: usize = 10 * 1024;

/// Why a stored entry cannot be used
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("entry truncated")]
    Truncated,

    #[error("invalid magic number")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("URL checksum mismatch")]
    ChecksumMismatch,

    #[error("entry belongs to a different URL")]
    UrlMismatch,

    #[error("stored URL is not UTF-8")]
    UrlEncoding,

    #[error("URL of {0} bytes does not fit the header")]
    UrlTooLong(usize),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),
}

/// Fixed-size entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub flags: u8,
    pub checksum: u8,
    pub url_len: u16,
}

impl Header {
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let len = self.url_len.to_be_bytes();
        [
            MAGIC[0],
            MAGIC[1],
            self.version,
            self.flags,
            self.checksum,
            len[0],
            len[1],
        ]
    }

    /// Parse and check magic and version
    pub fn parse(raw: &[u8]) -> Result<Self, EntryError> {
        if raw.len() < HEADER_LEN {
            return Err(EntryError::Truncated);
        }
        if raw[0..2] != MAGIC {
            return Err(EntryError::BadMagic);
        }
        if raw[2] != FORMAT_VERSION {
            return Err(EntryError::UnsupportedVersion(raw[2]));
        }
        Ok(Self {
            version: raw[2],
            flags: raw[3],
            checksum: raw[4],
            url_len: u16::from_be_bytes([raw[5], raw[6]]),
        })
    }
}

/// XOR of all bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Serialize `payload` for `url`.
///
/// Payloads larger than `threshold` are gzip-compressed, and the compressed
/// form is kept only when it is actually smaller.
pub fn encode(url: &str, payload: &[u8], threshold: usize) -> Result<Vec<u8>, EntryError> {
    let url_bytes = url.as_bytes();
    let url_len =
        u16::try_from(url_bytes.len()).map_err(|_| EntryError::UrlTooLong(url_bytes.len()))?;

    let mut flags = 0;
    let compressed = if payload.len() > threshold {
        let gz = gzip(payload)?;
        (gz.len() < payload.len()).then_some(gz)
    } else {
        None
    };
    if compressed.is_some() {
        flags |= FLAG_COMPRESSED;
    }
    let body = compressed.as_deref().unwrap_or(payload);

    let header = Header {
        version: FORMAT_VERSION,
        flags,
        checksum: checksum(url_bytes),
        url_len,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + url_bytes.len() + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(url_bytes);
    out.extend_from_slice(body);
    Ok(out)
}

/// Read the URL recorded in an entry, validating header and checksum.
///
/// `raw` only needs to cover the header and URL.
pub fn stored_url(raw: &[u8]) -> Result<(Header, &str), EntryError> {
    let header = Header::parse(raw)?;
    let end = HEADER_LEN + header.url_len as usize;
    let url_bytes = raw.get(HEADER_LEN..end).ok_or(EntryError::Truncated)?;
    if checksum(url_bytes) != header.checksum {
        return Err(EntryError::ChecksumMismatch);
    }
    let url = std::str::from_utf8(url_bytes).map_err(|_| EntryError::UrlEncoding)?;
    Ok((header, url))
}

/// Decode an entry, requiring it to belong to `url`
pub fn decode(url: &str, raw: &[u8]) -> Result<Vec<u8>, EntryError> {
    let header = Header::parse(raw)?;
    let end = HEADER_LEN + header.url_len as usize;
    let url_bytes = raw.get(HEADER_LEN..end).ok_or(EntryError::Truncated)?;
    if url_bytes != url.as_bytes() {
        return Err(EntryError::UrlMismatch);
    }
    if checksum(url_bytes) != header.checksum {
        return Err(EntryError::ChecksumMismatch);
    }

    let body = &raw[end..];
    if header.is_compressed() {
        let mut out = Vec::new();
        GzDecoder::new(body)
            .read_to_end(&mut out)
            .map_err(EntryError::Decompress)?;
        Ok(out)
    } else {
        Ok(body.to_vec())
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>, EntryError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(EntryError::Compress)?;
    encoder.finish().map_err(EntryError::Compress)
}
