//! Read-write text dictionaries (`.ctd`).
//!
//! The whole file is parsed into an in-memory tree with one level per
//! reading character; children are kept sorted so lookups and the rewrite
//! order are deterministic. A node carries at most one word record, which
//! holds every candidate of that reading whatever its grammar row.
//!
//! Record addresses handed to the record cache are slot numbers in the
//! record arena and stay stable while the word exists.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dictionary_lib::backend::{SearchHit, SearchResult};
use crate::dictionary_lib::grammar::GrammarTable;
use crate::dictionary_lib::word_record::{WordRecord, MAX_READING};
use crate::error::{RkError, RkResult};

/// First line of every file written by this module.
pub const TEXT_MAGIC: &str = "#*RKTEXT";

const ROOT: u32 = 0;

#[derive(Debug, Default)]
struct TreeNode {
    ch: char,
    children: Vec<u32>,
    record: Option<u32>,
}

/// Result of [`TemporaryDic::define`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defined {
    pub address: u32,
    /// Candidates newly added to the reading.
    pub added: usize,
    /// The merged record now stored under the reading.
    pub record: WordRecord,
}

/// Result of [`TemporaryDic::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub address: u32,
    pub removed: usize,
    /// What is left of the reading, `None` when the word is gone.
    pub remaining: Option<WordRecord>,
}

#[derive(Debug)]
pub struct TemporaryDic {
    path: PathBuf,
    member: String,
    grammar: Arc<GrammarTable>,
    nodes: Vec<TreeNode>,
    free_nodes: Vec<u32>,
    records: Vec<Option<WordRecord>>,
    free_records: Vec<u32>,
    word_count: usize,
    modified: bool,
}

impl TemporaryDic {
    fn empty(path: PathBuf, member: &str, grammar: Arc<GrammarTable>) -> Self {
        Self {
            path,
            member: member.to_string(),
            grammar,
            nodes: vec![TreeNode::default()],
            free_nodes: Vec::new(),
            records: Vec::new(),
            free_records: Vec::new(),
            word_count: 0,
            modified: false,
        }
    }

    /// Parses the text file at `path`. Lines that do not parse are skipped
    /// with a warning.
    pub fn open<P: AsRef<Path>>(path: P, member: &str, grammar: Arc<GrammarTable>) -> RkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path)?;
        let mut dic = Self::empty(path, member, grammar);
        let mut skipped = 0;
        for (lineno, line) in text.lines().enumerate() {
            match WordRecord::parse_text(line, &dic.grammar) {
                Ok(Some(record)) => {
                    dic.insert(&record)?;
                }
                Ok(None) => {}
                Err(err) => {
                    skipped += 1;
                    tracing::warn!("{}:{}: {}", dic.path.display(), lineno + 1, err);
                }
            }
        }
        dic.modified = false;
        tracing::debug!(
            "opened temporary dictionary {member}: {} words, {} lines skipped",
            dic.word_count,
            skipped
        );
        Ok(dic)
    }

    /// Creates an empty dictionary file and opens it.
    pub fn create<P: AsRef<Path>>(path: P, member: &str, grammar: Arc<GrammarTable>) -> RkResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(RkError::AlreadyExists(path.display().to_string()));
        }
        fs::write(path, format!("{TEXT_MAGIC}\n"))?;
        Self::open(path, member, grammar)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn child(&self, node: u32, ch: char) -> Result<u32, usize> {
        let children = &self.nodes[node as usize].children;
        children
            .binary_search_by_key(&ch, |&c| self.nodes[c as usize].ch)
            .map(|i| children[i])
    }

    fn alloc_node(&mut self, ch: char) -> u32 {
        let node = TreeNode {
            ch,
            children: Vec::new(),
            record: None,
        };
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn alloc_record(&mut self, record: WordRecord) -> u32 {
        match self.free_records.pop() {
            Some(id) => {
                self.records[id as usize] = Some(record);
                id
            }
            None => {
                self.records.push(Some(record));
                (self.records.len() - 1) as u32
            }
        }
    }

    /// Node path from the root for `reading`, without the root itself.
    fn walk(&self, reading: &[char]) -> Option<Vec<u32>> {
        let mut path = Vec::with_capacity(reading.len());
        let mut at = ROOT;
        for &ch in reading {
            at = self.child(at, ch).ok()?;
            path.push(at);
        }
        Some(path)
    }

    /// Address of the record stored under exactly `reading`.
    pub fn find(&self, reading: &[char]) -> Option<u32> {
        let path = self.walk(reading)?;
        self.nodes[*path.last()? as usize].record
    }

    fn validate(record: &WordRecord) -> RkResult<()> {
        if record.reading.is_empty() || record.reading.len() > MAX_READING {
            return Err(RkError::invalid(format!(
                "reading length {} outside 1..={}",
                record.reading.len(),
                MAX_READING
            )));
        }
        if record.candidates.is_empty() {
            return Err(RkError::invalid("word without candidates"));
        }
        Ok(())
    }

    fn insert(&mut self, record: &WordRecord) -> RkResult<Defined> {
        Self::validate(record)?;
        let mut at = ROOT;
        for &ch in &record.reading {
            at = match self.child(at, ch) {
                Ok(next) => next,
                Err(pos) => {
                    let next = self.alloc_node(ch);
                    self.nodes[at as usize].children.insert(pos, next);
                    next
                }
            };
        }
        self.modified = true;
        match self.nodes[at as usize].record {
            Some(address) => {
                let stored = self.records[address as usize]
                    .as_mut()
                    .ok_or_else(|| RkError::Inconsistent(format!("dangling record {address}")))?;
                let added = stored.merge(record);
                Ok(Defined {
                    address,
                    added,
                    record: stored.clone(),
                })
            }
            None => {
                let mut fresh = WordRecord {
                    reading: record.reading.clone(),
                    candidates: Vec::new(),
                };
                let added = fresh.merge(record);
                let address = self.alloc_record(fresh.clone());
                self.nodes[at as usize].record = Some(address);
                self.word_count += 1;
                Ok(Defined {
                    address,
                    added,
                    record: fresh,
                })
            }
        }
    }

    /// Adds the candidates of `record` under its reading, merging with the
    /// candidates already there.
    pub fn define(&mut self, record: &WordRecord) -> RkResult<Defined> {
        let defined = self.insert(record)?;
        tracing::debug!(
            "defined {} in {} ({} new candidates)",
            record.reading_string(),
            self.member,
            defined.added
        );
        Ok(defined)
    }

    /// Removes the candidates of `record` from its reading. The word and any
    /// tree nodes left empty are dropped once no candidate remains.
    pub fn delete(&mut self, record: &WordRecord) -> RkResult<Deleted> {
        Self::validate(record)?;
        let path = self
            .walk(&record.reading)
            .ok_or_else(|| RkError::NotFound(record.reading_string()))?;
        let leaf = *path
            .last()
            .ok_or_else(|| RkError::invalid("empty reading"))?;
        let address = self.nodes[leaf as usize]
            .record
            .ok_or_else(|| RkError::NotFound(record.reading_string()))?;
        let stored = self.records[address as usize]
            .as_mut()
            .ok_or_else(|| RkError::Inconsistent(format!("dangling record {address}")))?;
        let before = stored.candidates.len();
        stored
            .candidates
            .retain(|c| !record.candidates.iter().any(|d| d.row == c.row && d.spelling == c.spelling));
        let removed = before - stored.candidates.len();
        if removed == 0 {
            return Err(RkError::NotFound(format!(
                "no matching candidate under {}",
                record.reading_string()
            )));
        }
        self.modified = true;
        if !stored.candidates.is_empty() {
            return Ok(Deleted {
                address,
                removed,
                remaining: Some(stored.clone()),
            });
        }

        self.records[address as usize] = None;
        self.free_records.push(address);
        self.nodes[leaf as usize].record = None;
        self.word_count -= 1;
        // Collapse empty nodes bottom-up.
        for depth in (0..path.len()).rev() {
            let node = path[depth];
            let n = &self.nodes[node as usize];
            if n.record.is_some() || !n.children.is_empty() {
                break;
            }
            let parent = if depth == 0 { ROOT } else { path[depth - 1] };
            self.nodes[parent as usize].children.retain(|&c| c != node);
            self.free_nodes.push(node);
        }
        Ok(Deleted {
            address,
            removed,
            remaining: None,
        })
    }

    pub fn search(&self, reading: &[char], budget: usize) -> SearchResult {
        let mut result = SearchResult::default();
        let mut at = ROOT;
        for (depth, &ch) in reading.iter().enumerate() {
            match self.child(at, ch) {
                Ok(next) => at = next,
                Err(_) => return result,
            }
            if let Some(address) = self.nodes[at as usize].record {
                if result.hits.len() >= budget {
                    result.truncated = true;
                    result.open_ended = true;
                    return result;
                }
                result.hits.push(SearchHit {
                    len: depth + 1,
                    address,
                });
            }
        }
        result.open_ended = !self.nodes[at as usize].children.is_empty();
        result
    }

    pub fn read_record(&self, address: u32) -> RkResult<WordRecord> {
        self.records
            .get(address as usize)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or_else(|| RkError::NotFound(format!("record {address} in {}", self.member)))
    }

    /// Writes back a record edited through the cache. The reading must be
    /// unchanged.
    pub fn store_record(&mut self, address: u32, record: WordRecord) -> RkResult<()> {
        let slot = self
            .records
            .get_mut(address as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| RkError::NotFound(format!("record {address} in {}", self.member)))?;
        if slot.reading != record.reading {
            return Err(RkError::invalid(format!(
                "write-back of {} over {}",
                record.reading_string(),
                slot.reading_string()
            )));
        }
        if *slot != record {
            *slot = record;
            self.modified = true;
        }
        Ok(())
    }

    /// Records in reading order.
    pub fn records(&self) -> Vec<&WordRecord> {
        let mut out = Vec::with_capacity(self.word_count);
        let mut stack = vec![ROOT];
        while let Some(node) = stack.pop() {
            let n = &self.nodes[node as usize];
            if let Some(address) = n.record {
                if let Some(record) = self.records[address as usize].as_ref() {
                    out.push(record);
                }
            }
            stack.extend(n.children.iter().rev());
        }
        out
    }

    pub fn to_text(&self) -> String {
        let mut out = String::from(TEXT_MAGIC);
        out.push('\n');
        for record in self.records() {
            out.push_str(&record.to_text(&self.grammar));
            out.push('\n');
        }
        out
    }

    /// Rewrites the file if anything changed: the new text goes to a
    /// side file first and is renamed over the original.
    pub fn sync(&mut self) -> RkResult<()> {
        if !self.modified {
            return Ok(());
        }
        let mut side = self.path.clone().into_os_string();
        side.push(".new");
        let side = PathBuf::from(side);
        {
            let mut f = fs::File::create(&side)?;
            f.write_all(self.to_text().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&side, &self.path)?;
        self.modified = false;
        tracing::debug!("rewrote {} ({} words)", self.path.display(), self.word_count);
        Ok(())
    }

    pub fn close(mut self) -> RkResult<()> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> Arc<GrammarTable> {
        GrammarTable::builtin()
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn line(text: &str) -> WordRecord {
        WordRecord::parse_text(text, &grammar()).unwrap().unwrap()
    }

    #[test]
    fn define_merges_and_search_finds_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut dic = TemporaryDic::create(dir.path().join("user.ctd"), "user.ctd", grammar()).unwrap();
        let a = dic.define(&line("あめ #T35 雨")).unwrap();
        let b = dic.define(&line("あめ #T35 飴 雨 #KJ 天")).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(b.added, 2);
        assert_eq!(b.record.to_text(&grammar()), "あめ #T35 雨 飴 #KJ 天");
        dic.define(&line("あ #KJ 亜")).unwrap();
        dic.define(&line("あめりか #KK アメリカ")).unwrap();

        let r = dic.search(&chars("あめり"), 8);
        assert_eq!(r.hits.iter().map(|h| h.len).collect::<Vec<_>>(), vec![1, 2]);
        assert!(r.open_ended);
        let r = dic.search(&chars("あめりか"), 2);
        assert!(r.truncated);
        assert_eq!(dic.word_count(), 3);
    }

    #[test]
    fn delete_collapses_nodes() {
        let mut dic = TemporaryDic::empty(PathBuf::from("mem.ctd"), "mem.ctd", grammar());
        dic.define(&line("あめ #T35 雨 飴")).unwrap();
        dic.define(&line("あ #KJ 亜")).unwrap();
        let d = dic.delete(&line("あめ #T35 雨")).unwrap();
        assert_eq!(d.remaining.unwrap().candidates.len(), 1);
        let d = dic.delete(&line("あめ #T35 飴")).unwrap();
        assert!(d.remaining.is_none());
        assert!(dic.find(&chars("あめ")).is_none());
        assert!(dic.find(&chars("あ")).is_some());
        assert!(!dic.search(&chars("あめ"), 8).open_ended);
        assert!(matches!(dic.delete(&line("あめ #T35 雨")), Err(RkError::NotFound(_))));
        assert!(matches!(dic.delete(&line("あ #KJ 阿")), Err(RkError::NotFound(_))));
        assert!(dic.read_record(d.address).is_err());
    }

    #[test]
    fn sync_rewrites_and_reopen_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.ctd");
        let mut dic = TemporaryDic::create(&path, "user.ctd", grammar()).unwrap();
        dic.define(&line("いぬ #T35 犬 狗")).unwrap();
        dic.define(&line("あめ #T35 雨")).unwrap();
        dic.define(&line("ねこ #T35 猫")).unwrap();
        dic.delete(&line("ねこ #T35 猫")).unwrap();
        dic.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "#*RKTEXT\nあめ #T35 雨\nいぬ #T35 犬 狗\n");
        assert!(!dir.path().join("user.ctd.new").exists());

        let dic = TemporaryDic::open(&path, "user.ctd", grammar()).unwrap();
        assert_eq!(dic.word_count(), 2);
        let address = dic.find(&chars("いぬ")).unwrap();
        assert_eq!(dic.read_record(address).unwrap(), line("いぬ #T35 犬 狗"));
        assert!(!dic.is_modified());
    }

    #[test]
    fn bad_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.ctd");
        fs::write(&path, "#*RKTEXT\nあめ 雨\nいぬ #T35 犬\nかさ #BOGUS 傘\n").unwrap();
        let dic = TemporaryDic::open(&path, "user.ctd", grammar()).unwrap();
        assert_eq!(dic.word_count(), 1);
    }

    #[test]
    fn store_record_checks_reading() {
        let mut dic = TemporaryDic::empty(PathBuf::from("mem.ctd"), "mem.ctd", grammar());
        let d = dic.define(&line("あめ #T35 雨 飴")).unwrap();
        dic.sync_flag_reset();
        let mut promoted = d.record.clone();
        promoted.promote(1);
        dic.store_record(d.address, promoted.clone()).unwrap();
        assert!(dic.is_modified());
        assert_eq!(dic.read_record(d.address).unwrap(), promoted);
        assert!(dic.store_record(d.address, line("いぬ #T35 犬")).is_err());
    }

    impl TemporaryDic {
        fn sync_flag_reset(&mut self) {
            self.modified = false;
        }
    }
}
