//! Candidate nodes and the arena they live in.
//!
//! A node is one word placed at some span of the reading, chained through
//! `left` to the word it was concatenated onto. Following `left` from any
//! node walks back to the start of its phrase.

use crate::dictionary_lib::cache::{RecordCache, RecordHandle};

use super::mount::MountId;

pub(crate) type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordClass {
    Empty,
    Prefix,
    Main,
    Suffix,
    Sub,
    Punct,
}

impl WordClass {
    /// Classes allowed to follow a word of this class inside one phrase.
    /// `Empty` stands for the start of a phrase.
    pub fn successors(self) -> &'static [WordClass] {
        match self {
            WordClass::Empty => &[WordClass::Prefix, WordClass::Main, WordClass::Punct],
            WordClass::Prefix => &[WordClass::Main],
            WordClass::Main | WordClass::Suffix => &[WordClass::Suffix, WordClass::Sub],
            WordClass::Sub => &[WordClass::Sub],
            WordClass::Punct => &[],
        }
    }

    pub fn may_follow(self, pred: WordClass) -> bool {
        pred.successors().contains(&self)
    }
}

/// Where the spellings of a node come from.
#[derive(Debug, Clone)]
pub(crate) enum WordSource {
    /// Candidates of one grammar row of a cached record.
    Cached { mount: MountId, handle: RecordHandle },
    /// Synthesized spellings of a run no dictionary covers.
    Literal(Vec<Vec<char>>),
}

#[derive(Debug, Clone)]
pub(crate) struct WordNode {
    pub source: WordSource,
    /// Reading characters of this word alone.
    pub ylen: usize,
    /// Reading characters from the phrase start to the end of this word.
    pub total: usize,
    pub class: WordClass,
    pub row: u16,
    /// Sum of word priorities along the `left` chain.
    pub prio: u64,
    pub left: Option<NodeId>,
    pub can_end: bool,
}

/// Fixed-capacity slot arena. Allocation fails softly when full.
#[derive(Debug)]
pub(crate) struct NodeArena {
    slots: Vec<Option<WordNode>>,
    free: Vec<NodeId>,
    capacity: usize,
    live: usize,
}

impl NodeArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn alloc(&mut self, node: WordNode) -> Option<NodeId> {
        if self.live >= self.capacity {
            return None;
        }
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                (self.slots.len() - 1) as NodeId
            }
        };
        self.live += 1;
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&WordNode> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Returns the node to the free list and drops its record reference.
    pub fn release(&mut self, id: NodeId, cache: &mut RecordCache) {
        let Some(node) = self.slots.get_mut(id as usize).and_then(Option::take) else {
            return;
        };
        if let WordSource::Cached { handle, .. } = node.source {
            cache.deref(handle);
        }
        self.free.push(id);
        self.live -= 1;
    }

    /// Nodes from the phrase start up to and including `id`.
    pub fn chain(&self, id: NodeId) -> Vec<&WordNode> {
        let mut out = Vec::new();
        let mut at = Some(id);
        while let Some(n) = at.and_then(|i| self.get(i)) {
            out.push(n);
            at = n.left;
        }
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(total: usize, left: Option<NodeId>) -> WordNode {
        WordNode {
            source: WordSource::Literal(vec![vec!['x']]),
            ylen: 1,
            total,
            class: WordClass::Main,
            row: 0,
            prio: 0,
            left,
            can_end: true,
        }
    }

    #[test]
    fn successor_masks() {
        assert!(WordClass::Main.may_follow(WordClass::Empty));
        assert!(WordClass::Main.may_follow(WordClass::Prefix));
        assert!(!WordClass::Prefix.may_follow(WordClass::Main));
        assert!(WordClass::Sub.may_follow(WordClass::Suffix));
        assert!(!WordClass::Suffix.may_follow(WordClass::Sub));
        assert!(WordClass::Punct.successors().is_empty());
    }

    #[test]
    fn alloc_reuses_slots_and_respects_capacity() {
        let mut cache = RecordCache::new(4);
        let mut arena = NodeArena::new(2);
        let a = arena.alloc(literal(1, None)).unwrap();
        let b = arena.alloc(literal(2, Some(a))).unwrap();
        assert!(arena.alloc(literal(3, Some(b))).is_none());
        assert_eq!(arena.chain(b).iter().map(|n| n.total).collect::<Vec<_>>(), vec![1, 2]);
        arena.release(b, &mut cache);
        assert_eq!(arena.live(), 1);
        let c = arena.alloc(literal(2, Some(a))).unwrap();
        assert_eq!(c, b);
        arena.release(a, &mut cache);
        arena.release(a, &mut cache);
        assert_eq!(arena.live(), 1);
    }
}
