//! Compiles word records into a permanent member image.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;

use super::{FLAG_IN_PAGE, FLAG_LAST, NODE_SIZE, PAGE_FOOTER, PAGE_SIZE};
use crate::dictionary_lib::header::{Header, HeaderTag};
use crate::dictionary_lib::word_record::{WordRecord, MAX_READING};
use crate::error::{RkError, RkResult};
use crate::utils::{char_to_unit, put_u16, put_u24};

/// Largest item a page can hold next to its footer and one link.
const MAX_ITEM: usize = PAGE_SIZE - PAGE_FOOTER - 2;
const MAX_TARGET: u32 = (1 << 24) - 1;
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct BuildNode {
    children: BTreeMap<u16, usize>,
    record: Option<usize>,
    list_at: Option<Place>,
}

#[derive(Debug, Clone, Copy)]
enum Place {
    Dir(u32),
    Page(u32),
}

#[derive(Debug, Default)]
struct PageFill {
    used: usize,
    links: Vec<u16>,
}

/// Sequential page allocator: items never straddle a page boundary.
#[derive(Debug, Default)]
struct PageLayout {
    pages: Vec<PageFill>,
}

impl PageLayout {
    fn alloc(&mut self, size: usize, is_record: bool) -> RkResult<u32> {
        if size > MAX_ITEM {
            return Err(RkError::invalid(format!("item of {size} bytes does not fit a page")));
        }
        let fits = |p: &PageFill| {
            p.used + size + 2 * (p.links.len() + usize::from(is_record)) + PAGE_FOOTER <= PAGE_SIZE
        };
        if !self.pages.last().is_some_and(fits) {
            self.pages.push(PageFill::default());
        }
        let n = self.pages.len() - 1;
        let page = &mut self.pages[n];
        let off = page.used;
        page.used += size;
        if is_record {
            page.links.push(off as u16);
        }
        let at = (n * PAGE_SIZE + off) as u32;
        if at > MAX_TARGET {
            return Err(RkError::invalid("dictionary exceeds the 16 MiB page area"));
        }
        Ok(at)
    }
}

/// Collects word records and lays them out as a paged trie.
///
/// Records sharing a reading are merged. Encoding runs in parallel; the
/// layout itself is sequential and deterministic.
#[derive(Debug)]
pub struct PermanentBuilder {
    member: String,
    grammar: Option<String>,
    comment: Option<String>,
    records: BTreeMap<Vec<u16>, WordRecord>,
}

impl PermanentBuilder {
    pub fn new(member: &str) -> Self {
        Self {
            member: member.to_string(),
            grammar: None,
            comment: None,
            records: BTreeMap::new(),
        }
    }

    pub fn grammar(mut self, name: &str) -> Self {
        self.grammar = Some(name.to_string());
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comment = Some(text.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add(&mut self, record: WordRecord) -> RkResult<()> {
        if record.reading.is_empty() || record.reading.len() > MAX_READING {
            return Err(RkError::invalid(format!(
                "reading length {} outside 1..={}",
                record.reading.len(),
                MAX_READING
            )));
        }
        let key = record
            .reading
            .iter()
            .map(|&c| char_to_unit(c))
            .collect::<RkResult<Vec<u16>>>()?;
        if key.contains(&0) {
            return Err(RkError::invalid("reading contains U+0000"));
        }
        match self.records.get_mut(&key) {
            Some(existing) => {
                existing.merge(&record);
            }
            None => {
                self.records.insert(key, record);
            }
        }
        Ok(())
    }

    /// Produces the complete member image.
    pub fn build(&self) -> RkResult<Vec<u8>> {
        let keys: Vec<&Vec<u16>> = self.records.keys().collect();
        let records: Vec<&WordRecord> = self.records.values().collect();

        let encoded = records
            .par_iter()
            .map(|r| {
                let mut buf = vec![0u8; r.encoded_len().min(MAX_ITEM)];
                let out = r.encode_into(&mut buf)?;
                if out.candidates < r.candidates.len() {
                    tracing::warn!(
                        "record {} truncated to {} of {} candidates",
                        r.reading_string(),
                        out.candidates,
                        r.candidates.len()
                    );
                }
                buf.truncate(out.bytes);
                Ok(buf)
            })
            .collect::<RkResult<Vec<Vec<u8>>>>()?;

        // Trie over code units.
        let mut nodes = vec![BuildNode::default()];
        for (i, key) in keys.iter().enumerate() {
            let mut at = 0;
            for &unit in key.iter() {
                at = match nodes[at].children.get(&unit) {
                    Some(&next) => next,
                    None => {
                        nodes.push(BuildNode::default());
                        let next = nodes.len() - 1;
                        nodes[at].children.insert(unit, next);
                        next
                    }
                };
            }
            nodes[at].record = Some(i);
        }

        let list_len = |n: &BuildNode| NODE_SIZE * (n.children.len() + usize::from(n.record.is_some()));

        // Directory: root list, then the depth-1 lists.
        let mut dir_len = 0usize;
        if !nodes[0].children.is_empty() {
            nodes[0].list_at = Some(Place::Dir(0));
            dir_len = list_len(&nodes[0]);
        }
        let depth1: Vec<usize> = nodes[0].children.values().copied().collect();
        for &n in &depth1 {
            nodes[n].list_at = Some(Place::Dir(dir_len as u32));
            dir_len += list_len(&nodes[n]);
        }
        if dir_len as u64 > u64::from(MAX_TARGET) {
            return Err(RkError::invalid("directory block exceeds 16 MiB"));
        }

        // Pages: depth-first, each list before the records and lists below it.
        let mut layout = PageLayout::default();
        let mut record_at = vec![0u32; records.len()];
        let mut stack: Vec<(usize, usize)> = depth1.iter().rev().map(|&n| (n, 1)).collect();
        while let Some((n, depth)) = stack.pop() {
            if depth >= 2 {
                let at = layout.alloc(list_len(&nodes[n]), false)?;
                nodes[n].list_at = Some(Place::Page(at));
            }
            if let Some(r) = nodes[n].record {
                record_at[r] = layout.alloc(encoded[r].len(), true)?;
            }
            for &child in nodes[n].children.values().rev() {
                stack.push((child, depth + 1));
            }
        }

        let mut directory = vec![0u8; dir_len];
        let mut pages = vec![0u8; layout.pages.len() * PAGE_SIZE];
        for node in &nodes {
            let Some(place) = node.list_at else {
                continue;
            };
            let mut entries: Vec<(u16, u8, u32)> = Vec::new();
            if let Some(r) = node.record {
                entries.push((0, FLAG_IN_PAGE, record_at[r]));
            }
            for (&unit, &child) in &node.children {
                let (flags, target) = match nodes[child].list_at {
                    Some(Place::Dir(at)) => (0, at),
                    Some(Place::Page(at)) => (FLAG_IN_PAGE, at),
                    None => {
                        return Err(RkError::Inconsistent(format!("trie node for {unit:#x} unplaced")));
                    }
                };
                entries.push((unit, flags, target));
            }
            let (buf, base) = match place {
                Place::Dir(at) => (&mut directory, at as usize),
                Place::Page(at) => (&mut pages, at as usize),
            };
            let last = entries.len() - 1;
            for (i, (unit, flags, target)) in entries.into_iter().enumerate() {
                let at = base + i * NODE_SIZE;
                put_u16(buf, at, unit);
                buf[at + 2] = if i == last { flags | FLAG_LAST } else { flags };
                put_u24(buf, at + 3, target);
            }
        }
        for (r, bytes) in encoded.iter().enumerate() {
            let at = record_at[r] as usize;
            pages[at..at + bytes.len()].copy_from_slice(bytes);
        }
        let mut ordinals = Vec::with_capacity(4 * layout.pages.len());
        let mut seen = 0u32;
        for (n, fill) in layout.pages.iter().enumerate() {
            let page = &mut pages[n * PAGE_SIZE..(n + 1) * PAGE_SIZE];
            let table_at = PAGE_SIZE - PAGE_FOOTER - 2 * fill.links.len();
            for (i, &link) in fill.links.iter().enumerate() {
                put_u16(page, table_at + 2 * i, link);
            }
            put_u16(page, PAGE_SIZE - 4, fill.links.len() as u16);
            put_u16(page, PAGE_SIZE - 2, fill.used as u16);
            ordinals.extend_from_slice(&seen.to_be_bytes());
            seen += fill.links.len() as u32;
        }

        let candidates: usize = records.iter().map(|r| r.candidates.len()).sum();
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let mut header = Header::new();
        header
            .set_int(HeaderTag::Version, FORMAT_VERSION)
            .set_int(HeaderTag::Time, stamp)
            .set_str(HeaderTag::Dictionary, &self.member)
            .set_int(HeaderTag::WordCount, records.len() as u32)
            .set_int(HeaderTag::CandidateCount, candidates as u32)
            .set_int(HeaderTag::DirLength, dir_len as u32)
            .set_int(HeaderTag::DirOffset, 0)
            .set_int(HeaderTag::PageCount, layout.pages.len() as u32)
            .set_int(HeaderTag::PageSize, PAGE_SIZE as u32)
            .set_int(HeaderTag::PageOffset, 0)
            .set_int(HeaderTag::Size, 0);
        if let Some(g) = &self.grammar {
            header.set_str(HeaderTag::Grammar, g);
        }
        if let Some(c) = &self.comment {
            header.set_str(HeaderTag::Comment, c);
        }
        if !ordinals.is_empty() {
            header.set_bytes(HeaderTag::PageOrdinals, ordinals);
        }
        let header_len = header.encoded_len();
        let page_off = header_len + dir_len;
        let total = page_off + pages.len();
        header
            .set_int(HeaderTag::DirOffset, header_len as u32)
            .set_int(HeaderTag::PageOffset, page_off as u32)
            .set_int(HeaderTag::Size, total as u32);

        let mut image = header.to_bytes()?;
        image.extend_from_slice(&directory);
        image.extend_from_slice(&pages);
        debug_assert_eq!(image.len(), total);
        tracing::debug!(
            "built {}: {} records, {} pages",
            self.member,
            records.len(),
            layout.pages.len()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary_lib::header::Header;
    use crate::utils::read_u16;

    #[test]
    fn empty_builder_yields_empty_dictionary() {
        let image = PermanentBuilder::new("empty.mwd").build().unwrap();
        let h = Header::from_bytes(&image).unwrap();
        assert_eq!(h.int(HeaderTag::WordCount), Some(0));
        assert_eq!(h.int(HeaderTag::PageCount), Some(0));
        assert_eq!(h.int(HeaderTag::Size), Some(image.len() as u32));
    }

    #[test]
    fn duplicate_readings_merge() {
        let mut b = PermanentBuilder::new("m.mwd");
        b.add(WordRecord::with_candidates("あめ", &[("雨", 1)])).unwrap();
        b.add(WordRecord::with_candidates("あめ", &[("飴", 1), ("雨", 1)])).unwrap();
        assert_eq!(b.len(), 1);
        assert!(b.add(WordRecord::new("")).is_err());
    }

    #[test]
    fn root_list_is_sorted_and_terminated() {
        let mut b = PermanentBuilder::new("m.mwd").grammar("default.gram");
        b.add(WordRecord::with_candidates("い", &[("胃", 1)])).unwrap();
        b.add(WordRecord::with_candidates("あ", &[("亜", 1)])).unwrap();
        let image = b.build().unwrap();
        let h = Header::from_bytes(&image).unwrap();
        assert_eq!(h.text(HeaderTag::Grammar).as_deref(), Some("default.gram"));
        let dir = h.int(HeaderTag::DirOffset).unwrap() as usize;
        assert_eq!(read_u16(&image, dir), 'あ' as u16);
        assert_eq!(image[dir + 2] & FLAG_LAST, 0);
        assert_eq!(read_u16(&image, dir + NODE_SIZE), 'い' as u16);
        assert_eq!(image[dir + NODE_SIZE + 2] & FLAG_LAST, FLAG_LAST);
    }
}
