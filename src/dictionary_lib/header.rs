//! Tagged header block at the front of every dictionary and frequency image.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ magic  "RKHD"                       4 bytes  │
//! │ triple (tag[4], len u32, off u32)   12 bytes │  × up to 42
//! │ ...                                          │
//! │ zero tag terminates the list                 │
//! ├──────────────────────────────────────────────┤  512 bytes
//! │ payloads of every len > 0 triple, tag order  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A triple with `len == 0` carries its value inline in `off`; otherwise
//! `off` is the payload offset relative to the header start.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{RkError, RkResult};
use crate::utils::{put_u32, read_u32};

pub const HEADER_SIZE: usize = 512;
pub const HEADER_MAGIC: [u8; 4] = *b"RKHD";
pub const HEADER_MAX_TAGS: usize = (HEADER_SIZE - 4) / 12;
const MAX_PAYLOAD: u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderTag {
    Version,
    Time,
    Revision,
    Comment,
    Dictionary,
    Grammar,
    WordCount,
    CandidateCount,
    DirLength,
    DirOffset,
    PageCount,
    PageSize,
    PageOffset,
    PageOrdinals,
    Size,
    FrequencyOffset,
    Sequence,
}

impl HeaderTag {
    pub const ALL: [HeaderTag; 17] = [
        HeaderTag::Version,
        HeaderTag::Time,
        HeaderTag::Revision,
        HeaderTag::Comment,
        HeaderTag::Dictionary,
        HeaderTag::Grammar,
        HeaderTag::WordCount,
        HeaderTag::CandidateCount,
        HeaderTag::DirLength,
        HeaderTag::DirOffset,
        HeaderTag::PageCount,
        HeaderTag::PageSize,
        HeaderTag::PageOffset,
        HeaderTag::PageOrdinals,
        HeaderTag::Size,
        HeaderTag::FrequencyOffset,
        HeaderTag::Sequence,
    ];

    pub fn code(self) -> [u8; 4] {
        match self {
            HeaderTag::Version => *b"#VER",
            HeaderTag::Time => *b"#TIM",
            HeaderTag::Revision => *b"#REV",
            HeaderTag::Comment => *b"#CMT",
            HeaderTag::Dictionary => *b"#DIC",
            HeaderTag::Grammar => *b"#GRM",
            HeaderTag::WordCount => *b"#TTL",
            HeaderTag::CandidateCount => *b"#CAN",
            HeaderTag::DirLength => *b"#LND",
            HeaderTag::DirOffset => *b"#LOF",
            HeaderTag::PageCount => *b"#PGS",
            HeaderTag::PageSize => *b"#PGZ",
            HeaderTag::PageOffset => *b"#POF",
            HeaderTag::PageOrdinals => *b"#PGO",
            HeaderTag::Size => *b"#SIZ",
            HeaderTag::FrequencyOffset => *b"#FRQ",
            HeaderTag::Sequence => *b"#SEQ",
        }
    }

    pub fn from_code(code: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Inline(u32),
    Bytes(Vec<u8>),
}

/// Decoded header: `(tag, value)` pairs in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(HeaderTag, HeaderValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, tag: HeaderTag, value: HeaderValue) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((tag, value)),
        }
    }

    pub fn set_int(&mut self, tag: HeaderTag, value: u32) -> &mut Self {
        self.set(tag, HeaderValue::Inline(value));
        self
    }

    pub fn set_bytes(&mut self, tag: HeaderTag, value: Vec<u8>) -> &mut Self {
        self.set(tag, HeaderValue::Bytes(value));
        self
    }

    pub fn set_str(&mut self, tag: HeaderTag, value: &str) -> &mut Self {
        self.set_bytes(tag, value.as_bytes().to_vec())
    }

    pub fn get(&self, tag: HeaderTag) -> Option<&HeaderValue> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    pub fn int(&self, tag: HeaderTag) -> Option<u32> {
        match self.get(tag)? {
            HeaderValue::Inline(v) => Some(*v),
            HeaderValue::Bytes(_) => None,
        }
    }

    pub fn bytes(&self, tag: HeaderTag) -> Option<&[u8]> {
        match self.get(tag)? {
            HeaderValue::Bytes(b) => Some(b),
            HeaderValue::Inline(_) => None,
        }
    }

    pub fn text(&self, tag: HeaderTag) -> Option<String> {
        self.bytes(tag).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Inline value that must be present.
    pub fn require_int(&self, tag: HeaderTag) -> RkResult<u32> {
        self.int(tag)
            .ok_or_else(|| RkError::parse(format!("header tag {:?} missing", tag)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &(HeaderTag, HeaderValue)> {
        self.entries.iter()
    }

    /// Block plus payload bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + self
                .entries
                .iter()
                .map(|(_, v)| match v {
                    HeaderValue::Bytes(b) => b.len(),
                    HeaderValue::Inline(_) => 0,
                })
                .sum::<usize>()
    }

    /// Serializes the block followed by its payloads.
    pub fn to_bytes(&self) -> RkResult<Vec<u8>> {
        if self.entries.len() > HEADER_MAX_TAGS {
            return Err(RkError::invalid(format!(
                "{} header tags exceed the limit of {}",
                self.entries.len(),
                HEADER_MAX_TAGS
            )));
        }
        let mut out = vec![0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&HEADER_MAGIC);
        let mut payload_at = HEADER_SIZE;
        for (i, (tag, value)) in self.entries.iter().enumerate() {
            let at = 4 + i * 12;
            out[at..at + 4].copy_from_slice(&tag.code());
            match value {
                HeaderValue::Inline(v) => {
                    put_u32(&mut out, at + 4, 0);
                    put_u32(&mut out, at + 8, *v);
                }
                HeaderValue::Bytes(b) => {
                    if b.is_empty() || b.len() as u64 >= u64::from(MAX_PAYLOAD) {
                        return Err(RkError::invalid(format!(
                            "payload of {:?} has unsupported length {}",
                            tag,
                            b.len()
                        )));
                    }
                    put_u32(&mut out, at + 4, b.len() as u32);
                    put_u32(&mut out, at + 8, payload_at as u32);
                    payload_at += b.len();
                }
            }
        }
        for (_, value) in &self.entries {
            if let HeaderValue::Bytes(b) = value {
                out.extend_from_slice(b);
            }
        }
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> RkResult<usize> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Reads a header whose block starts at `base`.
    ///
    /// Unknown or repeated tags and payload ranges the reader cannot satisfy
    /// are a [`RkError::ParseError`].
    pub fn read_from<R: Read + Seek>(r: &mut R, base: u64) -> RkResult<Header> {
        let mut block = [0u8; HEADER_SIZE];
        r.seek(SeekFrom::Start(base))?;
        r.read_exact(&mut block)
            .map_err(|e| RkError::parse(format!("truncated header block: {e}")))?;
        if block[..4] != HEADER_MAGIC {
            return Err(RkError::parse("bad header magic"));
        }
        let mut header = Header::new();
        for i in 0..HEADER_MAX_TAGS {
            let at = 4 + i * 12;
            let code = [block[at], block[at + 1], block[at + 2], block[at + 3]];
            if code == [0; 4] {
                break;
            }
            let tag = HeaderTag::from_code(code).ok_or_else(|| {
                RkError::parse(format!("unknown header tag {:?}", String::from_utf8_lossy(&code)))
            })?;
            if header.get(tag).is_some() {
                return Err(RkError::parse(format!("repeated header tag {:?}", tag)));
            }
            let len = read_u32(&block, at + 4);
            let off = read_u32(&block, at + 8);
            let value = if len == 0 {
                HeaderValue::Inline(off)
            } else {
                if len >= MAX_PAYLOAD {
                    return Err(RkError::parse(format!("payload of {:?} too large", tag)));
                }
                let mut payload = vec![0u8; len as usize];
                r.seek(SeekFrom::Start(base + u64::from(off)))?;
                r.read_exact(&mut payload).map_err(|e| {
                    RkError::parse(format!("payload of {:?} outside the file: {e}", tag))
                })?;
                HeaderValue::Bytes(payload)
            };
            header.entries.push((tag, value));
        }
        Ok(header)
    }

    pub fn from_bytes(bytes: &[u8]) -> RkResult<Header> {
        Self::read_from(&mut Cursor::new(bytes), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        let mut h = Header::new();
        h.set_int(HeaderTag::Version, 3)
            .set_str(HeaderTag::Dictionary, "iroha.mwd")
            .set_int(HeaderTag::PageCount, 0)
            .set_bytes(HeaderTag::PageOrdinals, vec![0, 0, 0, 0, 0, 0, 0, 7]);
        h
    }

    #[test]
    fn round_trip_keeps_tags_flags_and_values() {
        let h = sample();
        let bytes = h.to_bytes().unwrap();
        assert_eq!(bytes.len(), h.encoded_len());
        let back = Header::from_bytes(&bytes).unwrap();
        assert_eq!(back, h);
        assert_eq!(back.int(HeaderTag::PageCount), Some(0));
        assert_eq!(back.text(HeaderTag::Dictionary).as_deref(), Some("iroha.mwd"));
    }

    #[test]
    fn read_at_offset() {
        let mut file = vec![0xAAu8; 100];
        file.extend(sample().to_bytes().unwrap());
        let back = Header::read_from(&mut Cursor::new(&file), 100).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn rejects_unknown_and_repeated_tags() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(b"#XYZ");
        assert!(matches!(Header::from_bytes(&bytes), Err(RkError::ParseError(_))));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[16..20].copy_from_slice(b"#VER");
        assert!(matches!(Header::from_bytes(&bytes), Err(RkError::ParseError(_))));
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(Header::from_bytes(cut).is_err());
    }

    #[test]
    fn rejects_bad_magic_and_empty_payload() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(Header::from_bytes(&bytes).is_err());

        let mut h = Header::new();
        h.set_bytes(HeaderTag::Comment, Vec::new());
        assert!(h.to_bytes().is_err());
    }
}
