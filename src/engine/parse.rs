//! Candidate forests: every phrase that can start at one reading offset.
//!
//! The forest at offset `yy` is built bottom-up over increasing length.
//! For each length `clen` already reached by some node, the words starting
//! at `yy + clen` are looked up and every predecessor/word pair the class
//! masks and the grammar accept becomes a new node of length
//! `clen + word length`.

use crate::char_class::{classify, run_length, CharClass};
use crate::dictionary_lib::cache::{RecordCache, RecordHandle, RecordKey};
use crate::dictionary_lib::grammar::{GrammarTable, BOUNDARY_ROW};
use crate::error::RkResult;
use crate::utils::{for_each_len_desc, len_bit};

use super::mount::{Mount, MountId};
use super::nword::{NodeArena, NodeId, WordClass, WordNode, WordSource};
use super::session::Resources;

#[derive(Debug)]
pub(crate) struct Forest {
    /// Nodes by total reading length; index 0 stays empty.
    pub heads: Vec<Vec<NodeId>>,
    /// Lengths holding at least one node that may end a phrase.
    pub len_mask: u64,
    /// Reading characters the build looked at.
    pub reach: usize,
    /// Appending input could still add nodes.
    pub needs_more: bool,
    /// The node arena ran out while building.
    pub exhausted: bool,
}

impl Forest {
    pub fn max_len(&self) -> usize {
        self.heads.len().saturating_sub(1)
    }

    pub fn nodes_at(&self, len: usize) -> &[NodeId] {
        self.heads.get(len).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn can_end_at(&self, arena: &NodeArena, len: usize) -> bool {
        self.nodes_at(len)
            .iter()
            .any(|&id| arena.get(id).is_some_and(|n| n.can_end))
    }

    /// Highest priority of a phrase-ending node of length `len`.
    pub fn best_prio(&self, arena: &NodeArena, len: usize) -> Option<u64> {
        self.nodes_at(len)
            .iter()
            .filter_map(|&id| arena.get(id))
            .filter(|n| n.can_end)
            .map(|n| n.prio)
            .max()
    }

    /// Lengths a phrase starting here may have, longest first.
    pub fn end_lengths(&self, arena: &NodeArena) -> Vec<usize> {
        let mut out = Vec::new();
        for_each_len_desc(self.len_mask, self.max_len(), |len| {
            if self.can_end_at(arena, len) {
                out.push(len);
            }
            false
        });
        out
    }

    pub fn release(self, arena: &mut NodeArena, cache: &mut RecordCache) {
        for id in self.heads.into_iter().flatten() {
            arena.release(id, cache);
        }
    }
}

/// A word found at one position, before it is attached to a predecessor.
struct Word {
    source: WordSource,
    ylen: usize,
    class: WordClass,
    row: u16,
    prio: u64,
}

fn release_words(words: Vec<Word>, cache: &mut RecordCache) {
    for w in words {
        if let WordSource::Cached { handle, .. } = w.source {
            cache.deref(handle);
        }
    }
}

fn starts_phrase(grammar: &GrammarTable, row: u16) -> bool {
    row == BOUNDARY_ROW || grammar.connects(BOUNDARY_ROW, row)
}

fn ends_phrase(grammar: &GrammarTable, row: u16) -> bool {
    row == BOUNDARY_ROW || grammar.connects(row, BOUNDARY_ROW)
}

fn joins(grammar: &GrammarTable, left: u16, right: u16) -> bool {
    left == BOUNDARY_ROW || right == BOUNDARY_ROW || grammar.connects(left, right)
}

fn row_or_boundary(grammar: &GrammarTable, name: &str) -> u16 {
    grammar.row_of(name).unwrap_or(BOUNDARY_ROW)
}

/// Reads the record at `address` through the cache, applying the learned
/// candidate order on a miss. Returns the handle and the record's sequence
/// number.
pub(crate) fn read_word(
    cache: &mut RecordCache,
    mount: &mut Mount,
    address: u32,
) -> RkResult<(RecordHandle, u32)> {
    let seq = mount.backend.sequence(address)?;
    let key = RecordKey {
        member: mount.cache_id,
        address,
    };
    let Mount { backend, freq, .. } = mount;
    let handle = cache.read(key, || {
        let mut record = backend.read_record(address)?;
        freq.apply(seq, &mut record);
        Ok(record)
    })?;
    Ok((handle, seq))
}

fn unique(spellings: Vec<Vec<char>>) -> Vec<Vec<char>> {
    let mut out: Vec<Vec<char>> = Vec::with_capacity(spellings.len());
    for s in spellings {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

/// Dictionary words and literal runs starting at `p`, at most `limit`
/// characters long. The flag reports that a longer word could appear once
/// more input arrives.
fn words_at(
    buffer: &[char],
    p: usize,
    limit: usize,
    res: &mut Resources<'_>,
    mounts: &[MountId],
) -> (Vec<Word>, bool) {
    let slice = &buffer[p..p + limit];
    let at_end = p + limit == buffer.len();
    let mut words = Vec::new();
    let mut needs_more = false;

    for &mid in mounts {
        let Some(mount) = res.mounts.get_mut(mid).and_then(Option::as_mut) else {
            continue;
        };
        let result = match mount.backend.search(slice, res.config.search_budget) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("lookup in {} failed: {err}", mount.nickname);
                continue;
            }
        };
        if at_end && (result.open_ended || result.truncated) {
            needs_more = true;
        }
        for hit in result.hits {
            let (handle, seq) = match read_word(res.cache, mount, hit.address) {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!("record {:#x} of {} skipped: {err}", hit.address, mount.nickname);
                    continue;
                }
            };
            let mut rows: Vec<u16> = Vec::new();
            if let Some(record) = res.cache.record(handle) {
                for cand in &record.candidates {
                    if !rows.contains(&cand.row) {
                        rows.push(cand.row);
                    }
                }
            }
            if rows.is_empty() {
                res.cache.deref(handle);
                continue;
            }
            let prio = u64::from(mount.freq.tick(seq));
            for (i, &row) in rows.iter().enumerate() {
                if i > 0 {
                    res.cache.retain(handle);
                }
                words.push(Word {
                    source: WordSource::Cached { mount: mid, handle },
                    ylen: hit.len,
                    class: mount.class,
                    row,
                    prio,
                });
            }
        }
    }

    if res.config.literal_words {
        if let Some((word, open)) = literal_word(slice, at_end, res) {
            needs_more |= open;
            words.push(word);
        }
    }

    if !words
        .iter()
        .any(|w| matches!(w.class, WordClass::Main | WordClass::Punct))
    {
        words.push(kana_word(slice[0], res));
    }
    (words, needs_more)
}

/// Pseudo-word for a digit, Latin, katakana or punctuation run.
fn literal_word(slice: &[char], at_end: bool, res: &Resources<'_>) -> Option<(Word, bool)> {
    let script = res.script;
    let class = classify(slice[0]);
    let (run, row_name, word_class) = match class {
        CharClass::Digit => (run_length(slice, class), "#NUM", WordClass::Main),
        CharClass::Latin => (run_length(slice, class), "#ALP", WordClass::Main),
        CharClass::Katakana => (run_length(slice, class), "#KK", WordClass::Main),
        CharClass::Punctuation => (1, "#PUNC", WordClass::Punct),
        CharClass::Hiragana | CharClass::Other => return None,
    };
    let typed = &slice[..run];
    let mut spellings = vec![typed.to_vec()];
    match class {
        CharClass::Digit => {
            spellings.push(script.to_zenkaku(typed));
            spellings.push(script.to_hankaku(typed));
            spellings.push(script.to_numeral_text(typed));
        }
        CharClass::Katakana => spellings.push(script.to_hiragana(typed)),
        _ => {
            spellings.push(script.to_zenkaku(typed));
            spellings.push(script.to_hankaku(typed));
        }
    }
    let open = at_end && run == slice.len() && class != CharClass::Punctuation;
    Some((
        Word {
            source: WordSource::Literal(unique(spellings)),
            ylen: run,
            class: word_class,
            row: row_or_boundary(res.grammar, row_name),
            prio: 0,
        },
        open,
    ))
}

/// One-character word used where no dictionary has a main word.
fn kana_word(c: char, res: &Resources<'_>) -> Word {
    let spellings = unique(vec![vec![c], res.script.to_katakana(&[c])]);
    Word {
        source: WordSource::Literal(spellings),
        ylen: 1,
        class: WordClass::Main,
        row: row_or_boundary(res.grammar, "#KANA"),
        prio: 0,
    }
}

/// Builds the forest of phrases starting at `yy`.
pub(crate) fn build_forest(
    buffer: &[char],
    yy: usize,
    res: &mut Resources<'_>,
    mounts: &[MountId],
) -> Forest {
    let max = res.config.max_phrase_len.min(buffer.len().saturating_sub(yy));
    let mut forest = Forest {
        heads: vec![Vec::new(); max + 1],
        len_mask: 0,
        reach: max,
        needs_more: false,
        exhausted: false,
    };

    for clen in 0..max {
        let preds: Vec<Option<NodeId>> = if clen == 0 {
            vec![None]
        } else {
            forest.heads[clen].iter().copied().map(Some).collect()
        };
        if preds.is_empty() {
            continue;
        }
        let (words, needs_more) = words_at(buffer, yy + clen, max - clen, res, mounts);
        forest.needs_more |= needs_more;

        let mut full = false;
        'preds: for pred in preds {
            let (pclass, prow, pprio) = match pred.and_then(|id| res.arena.get(id)) {
                Some(n) => (n.class, n.row, n.prio),
                None if pred.is_some() => continue,
                None => (WordClass::Empty, BOUNDARY_ROW, 0),
            };
            for w in &words {
                if !w.class.may_follow(pclass) {
                    continue;
                }
                let connected = if pred.is_none() {
                    starts_phrase(res.grammar, w.row)
                } else {
                    joins(res.grammar, prow, w.row)
                };
                if !connected {
                    continue;
                }
                if let WordSource::Cached { handle, .. } = &w.source {
                    if !res.cache.retain(*handle) {
                        continue;
                    }
                }
                let total = clen + w.ylen;
                let can_end = w.class != WordClass::Prefix && ends_phrase(res.grammar, w.row);
                let node = WordNode {
                    source: w.source.clone(),
                    ylen: w.ylen,
                    total,
                    class: w.class,
                    row: w.row,
                    prio: pprio + w.prio,
                    left: pred,
                    can_end,
                };
                match res.arena.alloc(node) {
                    Some(id) => {
                        forest.heads[total].push(id);
                        if can_end {
                            forest.len_mask |= len_bit(total);
                        }
                    }
                    None => {
                        if let WordSource::Cached { handle, .. } = &w.source {
                            res.cache.deref(*handle);
                        }
                        full = true;
                        break 'preds;
                    }
                }
            }
        }
        release_words(words, res.cache);
        if full {
            tracing::debug!("node arena full at offset {yy}; parse truncated");
            forest.exhausted = true;
            break;
        }
    }

    ensure_progress(&mut forest, buffer, yy, res);
    forest
}

/// Guarantees a one-character phrase when nothing else may end one.
fn ensure_progress(forest: &mut Forest, buffer: &[char], yy: usize, res: &mut Resources<'_>) {
    if forest.len_mask != 0 || forest.max_len() == 0 {
        return;
    }
    let w = kana_word(buffer[yy], res);
    let node = WordNode {
        source: w.source,
        ylen: 1,
        total: 1,
        class: w.class,
        row: w.row,
        prio: 0,
        left: None,
        can_end: true,
    };
    match res.arena.alloc(node) {
        Some(id) => {
            forest.heads[1].push(id);
            forest.len_mask |= len_bit(1);
        }
        None => forest.exhausted = true,
    }
}
