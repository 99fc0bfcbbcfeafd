//! Phrase boundary choice and the stability test used while typing.

use super::session::{Resources, Session};

/// `(first + second length, first + second priority, second length)`.
type SplitScore = (usize, u64, usize);

impl Session {
    /// Longest phrase-boundary reading learned at `yy`, over every mounted
    /// dictionary's learning data.
    fn learned_boundary(&self, res: &Resources<'_>, yy: usize) -> Option<usize> {
        let text = &self.buffer[yy..];
        self.mounts
            .iter()
            .filter_map(|&mid| res.mounts.get(mid).and_then(Option::as_ref))
            .filter_map(|m| m.freq.boundaries.longest_prefix(text))
            .max()
    }

    fn boundary_pending(&self, res: &Resources<'_>, yy: usize) -> bool {
        let text = &self.buffer[yy..];
        self.mounts
            .iter()
            .filter_map(|&mid| res.mounts.get(mid).and_then(Option::as_ref))
            .any(|m| m.freq.boundaries.pending(text))
    }

    /// Longest second phrase at `yy` and its best priority.
    fn best_follower(&mut self, res: &mut Resources<'_>, yy: usize) -> (usize, u64) {
        if yy >= self.buffer.len() {
            return (0, 0);
        }
        self.ensure_forest(res, yy);
        let Some(forest) = self.forest(yy) else {
            return (0, 0);
        };
        match forest.end_lengths(res.arena).first() {
            Some(&len) => (len, forest.best_prio(res.arena, len).unwrap_or(0)),
            None => (0, 0),
        }
    }

    /// Chooses the length of the phrase starting at `yy` by looking one
    /// phrase ahead: the first length maximizing the combined length wins,
    /// then the combined priority, then the second length. Remaining ties
    /// keep the longer first phrase. A learned boundary overrides the score
    /// when the parse allows it.
    pub fn calc_split(&mut self, res: &mut Resources<'_>, yy: usize) -> usize {
        self.ensure_forest(res, yy);
        let (lengths, prios): (Vec<usize>, Vec<u64>) = match self.forest(yy) {
            Some(forest) => forest
                .end_lengths(res.arena)
                .into_iter()
                .map(|len| (len, forest.best_prio(res.arena, len).unwrap_or(0)))
                .unzip(),
            None => return 1,
        };
        if lengths.is_empty() {
            return 1;
        }
        if let Some(learned) = self.learned_boundary(res, yy) {
            if lengths.contains(&learned) {
                return learned;
            }
        }
        let mut best: Option<(SplitScore, usize)> = None;
        for (len, prio) in lengths.into_iter().zip(prios) {
            let (len2, prio2) = self.best_follower(res, yy + len);
            let score = (len + len2, prio + prio2, len2);
            // Equal lengths and priorities prefer the longer second phrase,
            // so "はしる" splits as はし + る. Lengths arrive longest first
            // and the strict `>` keeps the longer first phrase on a full tie.
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, len));
            }
        }
        best.map_or(1, |(_, len)| len)
    }

    /// `true` when no further input can change the phrase chosen at `yy`.
    ///
    /// Neither the forest at `yy` nor the forest after any of its phrase
    /// lengths may still grow, and neither may hold a node ending exactly
    /// at the end of the reading, since input appended there could extend
    /// it.
    pub fn is_stable(&mut self, res: &mut Resources<'_>, yy: usize) -> bool {
        if yy < self.committed_end() {
            return true;
        }
        let len = self.buffer.len();
        if yy >= len || self.boundary_pending(res, yy) {
            return false;
        }
        self.ensure_forest(res, yy);
        let lengths = match self.forest(yy) {
            Some(f) if !f.needs_more && f.nodes_at(len - yy).is_empty() => f.end_lengths(res.arena),
            _ => return false,
        };
        for l in lengths {
            let next = yy + l;
            self.ensure_forest(res, next);
            match self.forest(next) {
                Some(g) if !g.needs_more && g.nodes_at(len - next).is_empty() => {}
                _ => return false,
            }
        }
        true
    }
}
