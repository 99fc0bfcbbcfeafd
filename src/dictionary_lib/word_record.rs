//! Packed binary word records and their text form.
//!
//! ```text
//! basic     [0 len:7][00000 cnt:3] reading×u16 (code:u16 spelling×u16)×cnt
//! extended  [1 len:7][0000 cnt:12 ] reading×u16 (code:u16 spelling×u16)×cnt
//! code      row:9 | spelling_len:7
//! ```
//!
//! The text form used by temporary dictionaries is
//! `reading #row spelling spelling #row spelling ...`.

use crate::dictionary_lib::grammar::GrammarTable;
use crate::error::{RkError, RkResult};
use crate::utils::{char_to_unit, put_u16, read_u16, unit_to_char};

pub const MAX_READING: usize = 127;
pub const MAX_SPELLING: usize = 127;
pub const MAX_BASIC_CANDIDATES: usize = 7;
pub const MAX_CANDIDATES: usize = 4095;
pub const MAX_ROW: u16 = 511;

const EXTENDED_FLAG: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub spelling: Vec<char>,
    pub row: u16,
}

impl Candidate {
    pub fn new(spelling: &str, row: u16) -> Self {
        Self {
            spelling: spelling.chars().collect(),
            row,
        }
    }

    pub fn spelling_string(&self) -> String {
        self.spelling.iter().collect()
    }

    fn encodable(&self) -> bool {
        self.spelling.len() <= MAX_SPELLING
            && self.row <= MAX_ROW
            && self.spelling.iter().all(|&c| char_to_unit(c).is_ok())
    }

    fn encoded_len(&self) -> usize {
        2 + 2 * self.spelling.len()
    }
}

/// A reading with its ordered candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordRecord {
    pub reading: Vec<char>,
    pub candidates: Vec<Candidate>,
}

/// What [`WordRecord::encode_into`] actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub bytes: usize,
    pub candidates: usize,
}

impl WordRecord {
    pub fn new(reading: &str) -> Self {
        Self {
            reading: reading.chars().collect(),
            candidates: Vec::new(),
        }
    }

    /// Convenience constructor: `WordRecord::with_candidates("あめ", &[("雨", 1)])`.
    pub fn with_candidates(reading: &str, candidates: &[(&str, u16)]) -> Self {
        Self {
            reading: reading.chars().collect(),
            candidates: candidates.iter().map(|&(s, r)| Candidate::new(s, r)).collect(),
        }
    }

    pub fn reading_string(&self) -> String {
        self.reading.iter().collect()
    }

    pub fn position(&self, spelling: &[char], row: u16) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.row == row && c.spelling == spelling)
    }

    /// Appends candidates of `other` that are not present yet. Returns the
    /// number added.
    pub fn merge(&mut self, other: &WordRecord) -> usize {
        let mut added = 0;
        for cand in &other.candidates {
            if self.position(&cand.spelling, cand.row).is_none() {
                self.candidates.push(cand.clone());
                added += 1;
            }
        }
        added
    }

    /// Moves candidate `index` to the front, keeping the order of the rest.
    pub fn promote(&mut self, index: usize) -> bool {
        if index >= self.candidates.len() {
            return false;
        }
        if index > 0 {
            let cand = self.candidates.remove(index);
            self.candidates.insert(0, cand);
        }
        true
    }

    fn check_reading(&self) -> RkResult<()> {
        if self.reading.len() > MAX_READING {
            return Err(RkError::invalid(format!(
                "reading of {} characters exceeds {}",
                self.reading.len(),
                MAX_READING
            )));
        }
        for &c in &self.reading {
            char_to_unit(c)?;
        }
        Ok(())
    }

    fn encodable_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.encodable())
            .take(MAX_CANDIDATES)
    }

    /// Size of the full encoding, after dropping candidates the format
    /// cannot represent.
    pub fn encoded_len(&self) -> usize {
        let cands: Vec<&Candidate> = self.encodable_candidates().collect();
        let head = if cands.len() <= MAX_BASIC_CANDIDATES { 2 } else { 3 };
        head + 2 * self.reading.len() + cands.iter().map(|c| c.encoded_len()).sum::<usize>()
    }

    /// Encodes into a pre-sized buffer.
    ///
    /// Candidates with an over-long spelling, an out-of-range row or a
    /// non-BMP character are skipped; the list stops at [`MAX_CANDIDATES`]
    /// or at the first candidate that no longer fits in `dst`. The number of
    /// candidates actually written is returned, never an error. Only a
    /// reading that cannot be encoded, or a buffer too small for the record
    /// head, is an error.
    pub fn encode_into(&self, dst: &mut [u8]) -> RkResult<EncodeOutcome> {
        self.check_reading()?;
        let cands: Vec<&Candidate> = self.encodable_candidates().collect();
        let planned_head = if cands.len() <= MAX_BASIC_CANDIDATES { 2 } else { 3 };
        let fixed = planned_head + 2 * self.reading.len();
        if dst.len() < fixed {
            return Err(RkError::invalid(format!(
                "buffer of {} bytes cannot hold a {}-character reading",
                dst.len(),
                self.reading.len()
            )));
        }

        let mut used = fixed;
        let mut taken = 0;
        for cand in &cands {
            if used + cand.encoded_len() > dst.len() {
                break;
            }
            used += cand.encoded_len();
            taken += 1;
        }
        // Falling back to the basic head frees a byte; the candidate set
        // chosen above is kept as is.
        let extended = taken > MAX_BASIC_CANDIDATES;
        let head = if extended { 3 } else { 2 };
        if !extended && planned_head == 3 {
            used -= 1;
        }

        let len = self.reading.len() as u8;
        if extended {
            dst[0] = EXTENDED_FLAG | len;
            put_u16(dst, 1, taken as u16);
        } else {
            dst[0] = len;
            dst[1] = taken as u8;
        }
        let mut at = head;
        for &c in &self.reading {
            put_u16(dst, at, char_to_unit(c)?);
            at += 2;
        }
        for cand in cands.iter().take(taken) {
            let code = (cand.row << 7) | cand.spelling.len() as u16;
            put_u16(dst, at, code);
            at += 2;
            for &c in &cand.spelling {
                put_u16(dst, at, char_to_unit(c)?);
                at += 2;
            }
        }
        debug_assert_eq!(at, used);
        Ok(EncodeOutcome {
            bytes: used,
            candidates: taken,
        })
    }

    pub fn encode(&self) -> RkResult<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_len()];
        let outcome = self.encode_into(&mut buf)?;
        buf.truncate(outcome.bytes);
        Ok(buf)
    }

    /// Decodes one record from the front of `bytes`, returning it with its
    /// byte length.
    pub fn decode(bytes: &[u8]) -> RkResult<(WordRecord, usize)> {
        let size = record_size(bytes)?;
        let (reading_len, count, mut at) = record_head(bytes)?;
        let mut reading = Vec::with_capacity(reading_len);
        for _ in 0..reading_len {
            reading.push(unit_to_char(read_u16(bytes, at))?);
            at += 2;
        }
        let mut candidates = Vec::with_capacity(count);
        for _ in 0..count {
            let code = read_u16(bytes, at);
            at += 2;
            let row = code >> 7;
            let n = (code & 0x7f) as usize;
            let mut spelling = Vec::with_capacity(n);
            for _ in 0..n {
                spelling.push(unit_to_char(read_u16(bytes, at))?);
                at += 2;
            }
            candidates.push(Candidate { spelling, row });
        }
        debug_assert_eq!(at, size);
        Ok((WordRecord { reading, candidates }, size))
    }

    /// Renders `reading #row spelling ...`, emitting a row token whenever the
    /// row changes.
    pub fn to_text(&self, grammar: &GrammarTable) -> String {
        let mut out = self.reading_string();
        let mut last_row = None;
        for cand in &self.candidates {
            if last_row != Some(cand.row) {
                out.push(' ');
                out.push_str(&grammar.row_name(cand.row));
                last_row = Some(cand.row);
            }
            out.push(' ');
            out.push_str(&cand.spelling_string());
        }
        out
    }

    /// Parses one text line. Blank lines and `#` comment lines yield `None`.
    pub fn parse_text(line: &str, grammar: &GrammarTable) -> RkResult<Option<WordRecord>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut tokens = line.split_whitespace();
        let Some(reading) = tokens.next() else {
            return Ok(None);
        };
        let mut record = WordRecord::new(reading);
        if record.reading.len() > MAX_READING {
            return Err(RkError::parse(format!("reading {reading} too long")));
        }
        let mut row: Option<u16> = None;
        for token in tokens {
            if token.starts_with('#') {
                row = Some(
                    grammar
                        .parse_row_token(token)
                        .ok_or_else(|| RkError::parse(format!("unknown grammar row {token}")))?,
                );
                continue;
            }
            let row = row.ok_or_else(|| {
                RkError::parse(format!("spelling {token} of {reading} has no grammar row"))
            })?;
            let cand = Candidate::new(token, row);
            if cand.spelling.len() > MAX_SPELLING {
                return Err(RkError::parse(format!("spelling {token} too long")));
            }
            if record.position(&cand.spelling, row).is_none() {
                record.candidates.push(cand);
            }
        }
        Ok(Some(record))
    }
}

/// `(reading length, candidate count, offset of the reading)`.
fn record_head(bytes: &[u8]) -> RkResult<(usize, usize, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| RkError::parse("empty word record"))?;
    let reading_len = (first & 0x7f) as usize;
    if first & EXTENDED_FLAG != 0 {
        if bytes.len() < 3 {
            return Err(RkError::parse("truncated extended record head"));
        }
        let raw = read_u16(bytes, 1);
        if raw & 0xf000 != 0 {
            return Err(RkError::parse("reserved bits set in record count"));
        }
        Ok((reading_len, (raw & 0x0fff) as usize, 3))
    } else {
        let second = *bytes
            .get(1)
            .ok_or_else(|| RkError::parse("truncated record head"))?;
        if second & 0xf8 != 0 {
            return Err(RkError::parse("reserved bits set in record count"));
        }
        Ok((reading_len, (second & 0x07) as usize, 2))
    }
}

/// Byte length of the record at the front of `bytes`, from the bytes alone.
pub fn record_size(bytes: &[u8]) -> RkResult<usize> {
    let (reading_len, count, head) = record_head(bytes)?;
    let mut at = head + 2 * reading_len;
    for _ in 0..count {
        if at + 2 > bytes.len() {
            return Err(RkError::parse("truncated word record"));
        }
        at += 2 + 2 * (read_u16(bytes, at) & 0x7f) as usize;
    }
    if at > bytes.len() {
        return Err(RkError::parse("truncated word record"));
    }
    Ok(at)
}
