//! Phrase candidate lists.
//!
//! Every phrase-ending node of the chosen length contributes the product
//! of its words' spellings, highest priority node first; the reading in
//! hiragana and katakana closes the list.

use rustc_hash::FxHashSet;

use crate::dictionary_lib::cache::RecordKey;

use super::mount::MountId;
use super::nword::{NodeId, WordNode, WordSource};
use super::parse::Forest;
use super::session::Resources;

/// A dictionary word inside a phrase candidate, kept for learning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WordPart {
    pub mount: MountId,
    pub key: RecordKey,
    pub spelling: Vec<char>,
    pub row: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PhraseCandidate {
    pub text: Vec<char>,
    pub parts: Vec<WordPart>,
}

/// Spellings one word offers, each with its learning handle.
fn word_options(node: &WordNode, res: &Resources<'_>) -> Vec<(Vec<char>, Option<WordPart>)> {
    match &node.source {
        WordSource::Literal(spellings) => spellings.iter().map(|s| (s.clone(), None)).collect(),
        WordSource::Cached { mount, handle } => {
            let (Some(record), Some(key)) = (res.cache.record(*handle), res.cache.key(*handle)) else {
                return Vec::new();
            };
            record
                .candidates
                .iter()
                .filter(|c| c.row == node.row)
                .map(|c| {
                    let part = WordPart {
                        mount: *mount,
                        key,
                        spelling: c.spelling.clone(),
                        row: c.row,
                    };
                    (c.spelling.clone(), Some(part))
                })
                .collect()
        }
    }
}

fn expand(
    id: NodeId,
    res: &Resources<'_>,
    limit: usize,
    seen: &mut FxHashSet<Vec<char>>,
    out: &mut Vec<PhraseCandidate>,
) {
    let options: Vec<_> = res
        .arena
        .chain(id)
        .into_iter()
        .map(|node| word_options(node, res))
        .collect();
    if options.is_empty() || options.iter().any(Vec::is_empty) {
        return;
    }
    // Odometer over the per-word choices, last word fastest.
    let mut picks = vec![0usize; options.len()];
    loop {
        if out.len() >= limit {
            return;
        }
        let mut text = Vec::new();
        let mut parts = Vec::new();
        for (opts, &k) in options.iter().zip(&picks) {
            let (spelling, part) = &opts[k];
            text.extend_from_slice(spelling);
            if let Some(part) = part {
                parts.push(part.clone());
            }
        }
        if seen.insert(text.clone()) {
            out.push(PhraseCandidate { text, parts });
        }
        let mut i = picks.len();
        loop {
            if i == 0 {
                return;
            }
            i -= 1;
            picks[i] += 1;
            if picks[i] < options[i].len() {
                break;
            }
            picks[i] = 0;
        }
    }
}

/// Candidates for the phrase `reading` of length `len` at the root of
/// `forest`.
pub(crate) fn build_candidates(
    forest: Option<&Forest>,
    reading: &[char],
    len: usize,
    res: &Resources<'_>,
) -> Vec<PhraseCandidate> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    if let Some(forest) = forest {
        let mut nodes: Vec<(NodeId, u64)> = forest
            .nodes_at(len)
            .iter()
            .filter_map(|&id| res.arena.get(id).map(|n| (id, n)))
            .filter(|(_, n)| n.can_end)
            .map(|(id, n)| (id, n.prio))
            .collect();
        nodes.sort_by(|a, b| b.1.cmp(&a.1));
        for (id, _) in nodes {
            expand(id, res, res.config.max_candidates, &mut seen, &mut out);
        }
    }
    for text in [res.script.to_hiragana(reading), res.script.to_katakana(reading)] {
        if seen.insert(text.clone()) {
            out.push(PhraseCandidate {
                text,
                parts: Vec::new(),
            });
        }
    }
    out
}
