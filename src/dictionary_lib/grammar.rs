//! Part-of-speech connection table.
//!
//! A [`GrammarTable`] is a square bit matrix over grammar rows plus the row
//! names. Bit `(a, b)` set means "a word of row `a` may be directly followed
//! by a word of row `b` inside one phrase". Row 0 (`#_`) is the phrase
//! boundary: `(#_, x)` lets `x` start a phrase and `(x, #_)` lets a phrase end
//! after `x`.
//!
//! Compiled tables are stored as CBOR compressed with zstd (`.cbp` files);
//! the human-editable source format is parsed by [`GrammarTable::from_source`]:
//!
//! ```text
//! # comment
//! rows: #_ #T35 #P
//! #_   > #T35
//! #T35 > #_ #P
//! #P   > #_ #P
//! ```

use std::borrow::Cow;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::error::{RkError, RkResult};
use crate::dictionary_lib::word_record::MAX_ROW;

pub const BOUNDARY_ROW: u16 = 0;
pub const BOUNDARY_NAME: &str = "#_";

/// Grammar shipped with the crate; used when no grammar member is mounted.
pub const BUILTIN_SOURCE: &str = "\
# rows: boundary, nouns, single kanji, names, places, adverbs, conjunctions,
# verb stems (godan / ichidan), adjective stems, verb and adjective endings,
# prefixes, suffixes, numerals, counters, katakana, latin, punctuation,
# kana literals, particles, auxiliaries.
rows: #_ #T35 #KJ #JN #CN #F #CJ #K5 #KS #KY #VE #ADJE #PRE #SUC #NUM #JS #KK #ALP #PUNC #KANA #P #AUX
#_    > #T35 #KJ #JN #CN #F #CJ #K5 #KS #KY #PRE #NUM #KK #ALP #PUNC #KANA #P
#T35  > #_ #P #SUC #AUX
#KJ   > #_ #P #SUC
#JN   > #_ #P #SUC
#CN   > #_ #P #SUC
#F    > #_ #P
#CJ   > #_
#K5   > #VE
#KS   > #VE #AUX
#KY   > #ADJE
#VE   > #_ #P #AUX
#ADJE > #_ #P #AUX
#PRE  > #T35 #KJ #NUM #CN #JN
#SUC  > #_ #P #SUC
#NUM  > #_ #JS #P #SUC
#JS   > #_ #P
#KK   > #_ #P #SUC #AUX
#ALP  > #_ #P
#PUNC > #_
#KANA > #_ #P #AUX
#P    > #_ #P
#AUX  > #_ #P #AUX
";

static BUILTIN: Lazy<Arc<GrammarTable>> = Lazy::new(|| {
    Arc::new(GrammarTable::from_source(BUILTIN_SOURCE).unwrap_or_else(|err| {
        // The source is a constant checked by the unit tests below.
        tracing::error!("built-in grammar failed to parse: {err}");
        GrammarTable::boundary_only()
    }))
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarTable {
    names: Vec<String>,
    /// `rows × ceil(rows / 8)` bytes, MSB-first within each byte.
    matrix: Vec<u8>,
    #[serde(skip)]
    index: FxHashMap<String, u16>,
}

impl GrammarTable {
    /// Table with the given row names and no connections. The first name must
    /// be the boundary row `#_`.
    pub fn new(names: Vec<String>) -> RkResult<Self> {
        if names.first().map(String::as_str) != Some(BOUNDARY_NAME) {
            return Err(RkError::parse("grammar row 0 must be #_"));
        }
        if names.len() > MAX_ROW as usize + 1 {
            return Err(RkError::parse(format!("{} grammar rows exceed {}", names.len(), MAX_ROW + 1)));
        }
        let rows = names.len();
        let mut table = Self {
            names,
            matrix: vec![0u8; rows * ((rows + 7) / 8)],
            index: FxHashMap::default(),
        };
        table.rebuild_index()?;
        Ok(table)
    }

    fn boundary_only() -> Self {
        Self {
            names: vec![BOUNDARY_NAME.to_string()],
            matrix: vec![0],
            index: [(BOUNDARY_NAME.to_string(), 0)].into_iter().collect(),
        }
    }

    /// The shared built-in grammar.
    pub fn builtin() -> Arc<GrammarTable> {
        Arc::clone(&BUILTIN)
    }

    fn rebuild_index(&mut self) -> RkResult<()> {
        self.index.clear();
        for (row, name) in self.names.iter().enumerate() {
            if self.index.insert(name.clone(), row as u16).is_some() {
                return Err(RkError::parse(format!("duplicate grammar row {name}")));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.names.len()
    }

    #[inline]
    fn stride(&self) -> usize {
        (self.rows() + 7) / 8
    }

    pub fn allow(&mut self, left: u16, right: u16) {
        let (l, r) = (left as usize, right as usize);
        if l < self.rows() && r < self.rows() {
            let stride = self.stride();
            self.matrix[l * stride + r / 8] |= 0x80 >> (r % 8);
        }
    }

    /// May a word of row `left` be followed by a word of row `right`?
    /// Rows outside the table never connect.
    #[inline]
    pub fn connects(&self, left: u16, right: u16) -> bool {
        let (l, r) = (left as usize, right as usize);
        if l >= self.rows() || r >= self.rows() {
            return false;
        }
        self.matrix[l * self.stride() + r / 8] & (0x80 >> (r % 8)) != 0
    }

    /// Row-name lookup; names carry their leading `#`.
    pub fn row_of(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    /// Row name, or `#<decimal>` when the table has no such row.
    pub fn row_name(&self, row: u16) -> Cow<'_, str> {
        match self.names.get(row as usize) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("#{row}")),
        }
    }

    /// Resolves a `#name` or `#<decimal>` token to a row number.
    pub fn parse_row_token(&self, token: &str) -> Option<u16> {
        if let Some(row) = self.row_of(token) {
            return Some(row);
        }
        let digits = token.strip_prefix('#')?;
        let row: u16 = digits.parse().ok()?;
        (row <= MAX_ROW).then_some(row)
    }

    /// Parses the grammar source format described in the module docs.
    pub fn from_source(text: &str) -> RkResult<Self> {
        let mut table: Option<GrammarTable> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || (line.starts_with('#') && !line.contains('>')) {
                continue;
            }
            if let Some(rest) = line.strip_prefix("rows:") {
                if table.is_some() {
                    return Err(RkError::parse(format!("line {}: rows declared twice", lineno + 1)));
                }
                let names = rest.split_whitespace().map(str::to_string).collect();
                table = Some(GrammarTable::new(names)?);
                continue;
            }
            let t = table.as_mut().ok_or_else(|| {
                RkError::parse(format!("line {}: rule before rows declaration", lineno + 1))
            })?;
            let (left, rights) = line.split_once('>').ok_or_else(|| {
                RkError::parse(format!("line {}: expected `LEFT > RIGHT ...`", lineno + 1))
            })?;
            let left = left.trim();
            let l = t
                .row_of(left)
                .ok_or_else(|| RkError::parse(format!("line {}: unknown row {left}", lineno + 1)))?;
            for right in rights.split_whitespace() {
                if right == "*" {
                    for r in 0..t.rows() as u16 {
                        t.allow(l, r);
                    }
                    continue;
                }
                let r = t.row_of(right).ok_or_else(|| {
                    RkError::parse(format!("line {}: unknown row {right}", lineno + 1))
                })?;
                t.allow(l, r);
            }
        }
        table.ok_or_else(|| RkError::parse("grammar source declares no rows"))
    }

    /// Renders the table back into source form.
    pub fn to_source(&self) -> String {
        let mut out = String::from("rows:");
        for name in &self.names {
            out.push(' ');
            out.push_str(name);
        }
        out.push('\n');
        for l in 0..self.rows() as u16 {
            let rights: Vec<&str> = (0..self.rows() as u16)
                .filter(|&r| self.connects(l, r))
                .map(|r| self.names[r as usize].as_str())
                .collect();
            if !rights.is_empty() {
                out.push_str(&format!("{} > {}\n", self.names[l as usize], rights.join(" ")));
            }
        }
        out
    }

    /// Decodes a compiled (CBOR + zstd) table.
    pub fn from_compressed_bytes(bytes: &[u8]) -> RkResult<Self> {
        let raw = decode_all(Cursor::new(bytes))
            .map_err(|err| RkError::parse(format!("Failed to decompress grammar: {err}")))?;
        let mut table: GrammarTable = serde_cbor::from_slice(&raw)?;
        let rows = table.rows();
        if rows == 0 || table.matrix.len() != rows * ((rows + 7) / 8) {
            return Err(RkError::parse("grammar matrix size does not match its rows"));
        }
        table.rebuild_index()?;
        Ok(table)
    }

    pub fn to_compressed_bytes(&self) -> RkResult<Vec<u8>> {
        let raw = serde_cbor::to_vec(self)?;
        encode_all(Cursor::new(raw), 19)
            .map_err(|err| RkError::parse(format!("Failed to compress grammar: {err}")))
    }

    pub fn load_compressed<P: AsRef<Path>>(path: P) -> RkResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_compressed_bytes(&bytes)
    }

    pub fn save_compressed<P: AsRef<Path>>(&self, path: P) -> RkResult<()> {
        fs::write(path, self.to_compressed_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_parses() {
        let g = GrammarTable::builtin();
        assert_eq!(g.row_of("#_"), Some(BOUNDARY_ROW));
        let noun = g.row_of("#T35").unwrap();
        let particle = g.row_of("#P").unwrap();
        assert!(g.connects(BOUNDARY_ROW, noun));
        assert!(g.connects(noun, particle));
        assert!(g.connects(noun, BOUNDARY_ROW));
        assert!(!g.connects(particle, noun));
        let godan = g.row_of("#K5").unwrap();
        assert!(!g.connects(godan, BOUNDARY_ROW));
    }

    #[test]
    fn row_names_fall_back_to_numerals() {
        let g = GrammarTable::builtin();
        assert_eq!(g.row_name(1), "#T35");
        assert_eq!(g.row_name(400), "#400");
        assert_eq!(g.parse_row_token("#400"), Some(400));
        assert_eq!(g.parse_row_token("#T35"), Some(1));
        assert_eq!(g.parse_row_token("#NOPE"), None);
        assert_eq!(g.parse_row_token("#9999"), None);
    }

    #[test]
    fn source_round_trip() {
        let g = GrammarTable::from_source("rows: #_ #A #B\n#_ > #A\n#A > *\n").unwrap();
        assert!(g.connects(1, 0) && g.connects(1, 1) && g.connects(1, 2));
        assert!(!g.connects(2, 1));
        let again = GrammarTable::from_source(&g.to_source()).unwrap();
        assert_eq!(again, g);
    }

    #[test]
    fn compressed_round_trip() {
        let g = GrammarTable::builtin();
        let bytes = g.to_compressed_bytes().unwrap();
        let back = GrammarTable::from_compressed_bytes(&bytes).unwrap();
        assert_eq!(&back, g.as_ref());
        assert_eq!(back.row_of("#KANA"), g.row_of("#KANA"));
    }

    #[test]
    fn source_errors() {
        assert!(GrammarTable::from_source("#A > #B\n").is_err());
        assert!(GrammarTable::from_source("rows: #A\n").is_err());
        assert!(GrammarTable::from_source("rows: #_ #A\n#A > #Z\n").is_err());
        assert!(GrammarTable::from_source("rows: #_ #A #A\n").is_err());
    }
}
