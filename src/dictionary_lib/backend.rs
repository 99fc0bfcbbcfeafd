//! Closed set of dictionary backends behind one lookup interface.

use crate::dictionary_lib::permanent::PermanentDic;
use crate::dictionary_lib::temporary::TemporaryDic;
use crate::dictionary_lib::word_record::WordRecord;
use crate::error::RkResult;

/// A word whose reading is the first `len` characters of the search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub len: usize,
    pub address: u32,
}

/// Matches of one prefix search, shortest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    /// The budget ran out before the walk finished.
    pub truncated: bool,
    /// A longer reading could still match: either the key ran out while the
    /// trie continues, or the budget was exhausted.
    pub open_ended: bool,
}

#[derive(Debug)]
pub enum Backend {
    Permanent(PermanentDic),
    Temporary(TemporaryDic),
}

impl Backend {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Backend::Permanent(_))
    }

    pub fn member(&self) -> &str {
        match self {
            Backend::Permanent(d) => d.member(),
            Backend::Temporary(d) => d.member(),
        }
    }

    pub fn search(&mut self, reading: &[char], budget: usize) -> RkResult<SearchResult> {
        match self {
            Backend::Permanent(d) => d.search(reading, budget),
            Backend::Temporary(d) => Ok(d.search(reading, budget)),
        }
    }

    pub fn read_record(&mut self, address: u32) -> RkResult<WordRecord> {
        match self {
            Backend::Permanent(d) => d.read_record(address),
            Backend::Temporary(d) => d.read_record(address),
        }
    }

    /// Key under which learning data of the record at `address` is kept:
    /// the record ordinal for permanent dictionaries, the address itself for
    /// temporary ones.
    pub fn sequence(&mut self, address: u32) -> RkResult<u32> {
        match self {
            Backend::Permanent(d) => d.ordinal(address),
            Backend::Temporary(_) => Ok(address),
        }
    }

    /// Records the frequency data is sized for; zero when it is not tied to
    /// a fixed record set.
    pub fn record_count(&self) -> u32 {
        match self {
            Backend::Permanent(d) => d.record_count(),
            Backend::Temporary(_) => 0,
        }
    }

    pub fn as_temporary_mut(&mut self) -> Option<&mut TemporaryDic> {
        match self {
            Backend::Temporary(d) => Some(d),
            Backend::Permanent(_) => None,
        }
    }

    pub fn sync(&mut self) -> RkResult<()> {
        match self {
            Backend::Permanent(_) => Ok(()),
            Backend::Temporary(d) => d.sync(),
        }
    }
}
