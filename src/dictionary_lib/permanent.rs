//! Read-only paged trie dictionaries (`.cbd`).
//!
//! ```text
//! member image
//! ┌────────┬──────────┬──────────────────┬──────┬──────┬─────┐
//! │ header │ payloads │ directory block  │ page │ page │ ... │
//! └────────┴──────────┴──────────────────┴──────┴──────┴─────┘
//!                      #LOF               #POF
//!
//! trie node (6 bytes)   char:u16  flags:u8  target:u24
//! page (4096 bytes)     items ... │ link[n]:u16 │ n:u16 │ used:u16 │
//! ```
//!
//! The directory block holds the root node list and the lists of depth-1
//! nodes and is kept in memory. Deeper lists and every word record live in
//! pages that are read on demand and kept in a small page cache.
//!
//! A node whose `char` is zero marks a word: its target is the page-area
//! offset of the record, which doubles as the record address handed to the
//! record cache.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::dictionary_lib::backend::{SearchHit, SearchResult};
use crate::dictionary_lib::header::{Header, HeaderTag};
use crate::dictionary_lib::word_record::WordRecord;
use crate::error::{RkError, RkResult};
use crate::utils::{char_to_unit, read_u16, read_u24, read_u32};

pub mod builder;

pub use builder::PermanentBuilder;

pub const PAGE_SIZE: usize = 4096;
pub const NODE_SIZE: usize = 6;
pub const FLAG_LAST: u8 = 0x01;
pub const FLAG_IN_PAGE: u8 = 0x02;
/// `n` and `used` trailing every page.
pub const PAGE_FOOTER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Loc {
    Dir(u32),
    Page(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrieNode {
    pub ch: u16,
    pub flags: u8,
    pub target: u32,
}

impl TrieNode {
    fn decode(b: &[u8]) -> Self {
        Self {
            ch: read_u16(b, 0),
            flags: b[2],
            target: read_u24(b, 3),
        }
    }

    fn child(&self) -> Loc {
        if self.flags & FLAG_IN_PAGE != 0 {
            Loc::Page(self.target)
        } else {
            Loc::Dir(self.target)
        }
    }
}

/// One record found by [`PermanentDic::dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpEntry {
    pub ordinal: u32,
    pub address: u32,
    pub record: WordRecord,
}

#[derive(Debug)]
pub struct PermanentDic {
    path: PathBuf,
    member: String,
    file: File,
    header: Header,
    directory: Vec<u8>,
    page_area: u64,
    page_size: usize,
    page_count: u32,
    ordinals: Vec<u32>,
    record_count: u32,
    pages: FxHashMap<u32, Vec<u8>>,
    page_order: VecDeque<u32>,
    page_capacity: usize,
}

impl PermanentDic {
    /// Opens member `member` of the dictionary file at `path`. Several member
    /// images may be concatenated in one file; they are scanned through
    /// their `#SIZ` tags.
    pub fn open<P: AsRef<Path>>(path: P, member: &str, page_capacity: usize) -> RkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut base = 0u64;
        let header = loop {
            if base >= file_len {
                return Err(RkError::NotFound(format!(
                    "member {member} in {}",
                    path.display()
                )));
            }
            let header = Header::read_from(&mut file, base)?;
            if header.text(HeaderTag::Dictionary).as_deref() == Some(member) {
                break header;
            }
            let size = header.require_int(HeaderTag::Size)?;
            if size == 0 {
                return Err(RkError::parse("member image with zero size"));
            }
            base += u64::from(size);
        };

        let dir_len = header.require_int(HeaderTag::DirLength)? as usize;
        let dir_off = header.require_int(HeaderTag::DirOffset)?;
        let page_off = header.require_int(HeaderTag::PageOffset)?;
        let page_count = header.require_int(HeaderTag::PageCount)?;
        let page_size = header.require_int(HeaderTag::PageSize)? as usize;
        let record_count = header.require_int(HeaderTag::WordCount)?;
        if !(64..=65_536).contains(&page_size) {
            return Err(RkError::parse(format!("unsupported page size {page_size}")));
        }
        if dir_len % NODE_SIZE != 0 {
            return Err(RkError::parse("directory length is not a whole number of nodes"));
        }
        let page_area = base + u64::from(page_off);
        if page_area + u64::from(page_count) * page_size as u64 > file_len {
            return Err(RkError::parse(format!(
                "{} pages declared past the end of {}",
                page_count,
                path.display()
            )));
        }

        let mut directory = vec![0u8; dir_len];
        file.seek(SeekFrom::Start(base + u64::from(dir_off)))?;
        file.read_exact(&mut directory)
            .map_err(|e| RkError::parse(format!("truncated directory block: {e}")))?;

        let ordinals = match header.bytes(HeaderTag::PageOrdinals) {
            Some(raw) => {
                if raw.len() != 4 * page_count as usize {
                    return Err(RkError::parse("page ordinal table does not match page count"));
                }
                (0..page_count as usize).map(|i| read_u32(raw, 4 * i)).collect()
            }
            None if page_count == 0 => Vec::new(),
            None => return Err(RkError::parse("page ordinal table missing")),
        };

        tracing::debug!(
            "opened permanent dictionary {member} ({} records, {} pages) from {}",
            record_count,
            page_count,
            path.display()
        );
        Ok(Self {
            path,
            member: member.to_string(),
            file,
            header,
            directory,
            page_area,
            page_size,
            page_count,
            ordinals,
            record_count,
            pages: FxHashMap::default(),
            page_order: VecDeque::new(),
            page_capacity: page_capacity.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// Member name of the grammar the dictionary was compiled against.
    pub fn grammar_name(&self) -> Option<String> {
        self.header.text(HeaderTag::Grammar)
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&mut self, n: u32) -> RkResult<()> {
        if self.pages.contains_key(&n) {
            return Ok(());
        }
        if n >= self.page_count {
            return Err(RkError::parse(format!("page {n} out of range")));
        }
        let mut page = vec![0u8; self.page_size];
        self.file
            .seek(SeekFrom::Start(self.page_area + u64::from(n) * self.page_size as u64))?;
        self.file
            .read_exact(&mut page)
            .map_err(|e| RkError::parse(format!("truncated page {n}: {e}")))?;
        let links = read_u16(&page, self.page_size - 4) as usize;
        let used = read_u16(&page, self.page_size - 2) as usize;
        if used + 2 * links + PAGE_FOOTER > self.page_size {
            return Err(RkError::parse(format!("corrupt footer in page {n}")));
        }
        while self.pages.len() >= self.page_capacity {
            match self.page_order.pop_front() {
                Some(old) => {
                    self.pages.remove(&old);
                }
                None => break,
            }
        }
        self.pages.insert(n, page);
        self.page_order.push_back(n);
        Ok(())
    }

    /// `(page bytes, used)` of a loaded page.
    fn page_data(&self, n: u32) -> RkResult<(&[u8], usize)> {
        let page = self
            .pages
            .get(&n)
            .ok_or_else(|| RkError::Inconsistent(format!("page {n} not loaded")))?;
        Ok((page.as_slice(), read_u16(page, self.page_size - 2) as usize))
    }

    /// `(page bytes, used, link table)` of a loaded page.
    fn page_parts(&self, n: u32) -> RkResult<(&[u8], usize, Vec<u16>)> {
        let (page, used) = self.page_data(n)?;
        let links = read_u16(page, self.page_size - 4) as usize;
        let table_at = self.page_size - PAGE_FOOTER - 2 * links;
        let table = (0..links).map(|i| read_u16(page, table_at + 2 * i)).collect();
        Ok((page, used, table))
    }

    pub(crate) fn read_list(&mut self, loc: Loc) -> RkResult<Vec<TrieNode>> {
        let (bytes, start, end) = match loc {
            Loc::Dir(off) => (self.directory.as_slice(), off as usize, self.directory.len()),
            Loc::Page(off) => {
                let n = off / self.page_size as u32;
                self.load_page(n)?;
                let (page, used) = self.page_data(n)?;
                (page, off as usize % self.page_size, used)
            }
        };
        let mut list = Vec::new();
        let mut at = start;
        loop {
            if at + NODE_SIZE > end {
                return Err(RkError::parse(format!("corrupt trie offset {loc:?}")));
            }
            let node = TrieNode::decode(&bytes[at..at + NODE_SIZE]);
            list.push(node);
            if node.flags & FLAG_LAST != 0 {
                break;
            }
            at += NODE_SIZE;
        }
        Ok(list)
    }

    /// Finds every word whose reading is a prefix of `reading`, shortest
    /// first, stopping after `budget` hits.
    pub fn search(&mut self, reading: &[char], budget: usize) -> RkResult<SearchResult> {
        let mut result = SearchResult::default();
        if self.directory.is_empty() {
            return Ok(result);
        }
        let mut loc = Loc::Dir(0);
        let mut depth = 0;
        loop {
            let list = self.read_list(loc)?;
            if depth > 0 {
                for node in list.iter().filter(|n| n.ch == 0) {
                    if result.hits.len() >= budget {
                        result.truncated = true;
                        result.open_ended = true;
                        return Ok(result);
                    }
                    result.hits.push(SearchHit {
                        len: depth,
                        address: node.target,
                    });
                }
            }
            if depth == reading.len() {
                result.open_ended = list.iter().any(|n| n.ch != 0);
                return Ok(result);
            }
            let Ok(unit) = char_to_unit(reading[depth]) else {
                return Ok(result);
            };
            match list.iter().find(|n| n.ch == unit) {
                Some(node) => {
                    loc = node.child();
                    depth += 1;
                }
                None => return Ok(result),
            }
        }
    }

    pub fn read_record(&mut self, address: u32) -> RkResult<WordRecord> {
        let n = address / self.page_size as u32;
        let off = address as usize % self.page_size;
        self.load_page(n)?;
        let (page, used) = self.page_data(n)?;
        if off >= used {
            return Err(RkError::parse(format!("record address {address:#x} past page data")));
        }
        WordRecord::decode(&page[off..used]).map(|(record, _)| record)
    }

    /// Sequence number of the record at `address`.
    pub fn ordinal(&mut self, address: u32) -> RkResult<u32> {
        let n = address / self.page_size as u32;
        let off = (address as usize % self.page_size) as u16;
        self.load_page(n)?;
        let (_, _, links) = self.page_parts(n)?;
        let index = links
            .binary_search(&off)
            .map_err(|_| RkError::parse(format!("no record starts at {address:#x}")))?;
        let first = self
            .ordinals
            .get(n as usize)
            .copied()
            .ok_or_else(|| RkError::parse(format!("page {n} has no ordinal")))?;
        Ok(first + index as u32)
    }

    /// Every record of the dictionary, in ordinal order.
    pub fn dump(&mut self) -> RkResult<Vec<DumpEntry>> {
        let mut out = Vec::with_capacity(self.record_count as usize);
        for n in 0..self.page_count {
            self.load_page(n)?;
            let first = self.ordinals.get(n as usize).copied().unwrap_or_default();
            let (page, used, links) = self.page_parts(n)?;
            for (i, &off) in links.iter().enumerate() {
                let off = off as usize;
                if off >= used {
                    return Err(RkError::parse(format!("link {i} of page {n} past page data")));
                }
                let (record, _) = WordRecord::decode(&page[off..used])?;
                out.push(DumpEntry {
                    ordinal: first + i as u32,
                    address: n * self.page_size as u32 + off as u32,
                    record,
                });
            }
        }
        Ok(out)
    }
}
