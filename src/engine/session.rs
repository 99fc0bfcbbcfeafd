//! Conversion state of one context.
//!
//! A session holds the reading buffer, one optional forest per reading
//! offset (both always the same length) and the committed phrases, which
//! cover a prefix of the buffer without gaps.

use crate::config::EngineConfig;
use crate::dictionary_lib::cache::RecordCache;
use crate::dictionary_lib::grammar::GrammarTable;
use crate::error::{RkError, RkResult};
use crate::script::ScriptCodec;

use super::candidates::{build_candidates, PhraseCandidate};
use super::mount::{Mount, MountId};
use super::nword::NodeArena;
use super::parse::{build_forest, Forest};
use super::ConversionMode;

/// Engine state a session operation may touch, borrowed field by field.
pub(crate) struct Resources<'a> {
    pub config: &'a EngineConfig,
    pub grammar: &'a GrammarTable,
    pub script: &'a dyn ScriptCodec,
    pub cache: &'a mut RecordCache,
    pub arena: &'a mut NodeArena,
    pub mounts: &'a mut Vec<Option<Mount>>,
}

#[derive(Debug)]
pub(crate) struct PhraseSlot {
    pub offset: usize,
    pub len: usize,
    pub candidates: Vec<PhraseCandidate>,
    pub selected: usize,
    /// The caller changed the length chosen by the splitter.
    pub user_sized: bool,
}

#[derive(Debug)]
pub(crate) struct Session {
    pub mode: ConversionMode,
    pub mounts: Vec<MountId>,
    pub buffer: Vec<char>,
    pub forests: Vec<Option<Forest>>,
    pub phrases: Vec<PhraseSlot>,
    pub current: usize,
    /// Everything typed so far must be committed, stable or not.
    pub flushed: bool,
}

impl Session {
    pub fn new(mode: ConversionMode, mounts: Vec<MountId>) -> Self {
        Self {
            mode,
            mounts,
            buffer: Vec::new(),
            forests: Vec::new(),
            phrases: Vec::new(),
            current: 0,
            flushed: false,
        }
    }

    /// Reading offset up to which phrases are committed.
    pub fn committed_end(&self) -> usize {
        self.phrases.last().map_or(0, |p| p.offset + p.len)
    }

    pub fn ensure_forest(&mut self, res: &mut Resources<'_>, yy: usize) {
        if yy >= self.buffer.len() || self.forests[yy].is_some() {
            return;
        }
        let forest = build_forest(&self.buffer, yy, res, &self.mounts);
        self.forests[yy] = Some(forest);
    }

    pub fn forest(&self, yy: usize) -> Option<&Forest> {
        self.forests.get(yy).and_then(Option::as_ref)
    }

    fn drop_forest(&mut self, res: &mut Resources<'_>, yy: usize) {
        if let Some(forest) = self.forests.get_mut(yy).and_then(Option::take) {
            forest.release(res.arena, res.cache);
        }
    }

    /// Frees every forest; the session keeps its phrases.
    pub fn release(&mut self, res: &mut Resources<'_>) {
        for yy in 0..self.forests.len() {
            self.drop_forest(res, yy);
        }
    }

    /// Replaces `buffer[start..end]` with `text`. Forests that looked at
    /// the edited range, or stopped at it only because the buffer ended
    /// there, are discarded.
    pub fn subst(
        &mut self,
        res: &mut Resources<'_>,
        start: usize,
        end: usize,
        text: &[char],
    ) -> RkResult<()> {
        let len = self.buffer.len();
        if start > end || end > len {
            return Err(RkError::invalid(format!(
                "edit range {start}..{end} outside reading of {len}"
            )));
        }
        let committed = self.committed_end();
        if start < committed {
            return Err(RkError::invalid(format!(
                "edit at {start} inside committed phrases ending at {committed}"
            )));
        }
        let max = res.config.max_phrase_len;
        for p in 0..len {
            let stale = self.forests[p].as_ref().is_some_and(|f| {
                p >= start || p + f.reach > start || (p + f.reach == start && f.reach < max)
            });
            if stale {
                self.drop_forest(res, p);
            }
        }
        self.buffer.splice(start..end, text.iter().copied()).for_each(drop);
        self.forests
            .splice(start..end, std::iter::repeat_with(|| None).take(text.len()))
            .for_each(drop);
        if start != end || !text.is_empty() {
            self.flushed = false;
        }
        Ok(())
    }

    /// Commits phrases from the committed end onwards while the split
    /// point is stable, or unconditionally once flushed.
    pub fn commit(&mut self, res: &mut Resources<'_>) {
        while self.committed_end() < self.buffer.len() {
            let yy = self.committed_end();
            if !self.flushed && !self.is_stable(res, yy) {
                break;
            }
            let len = self.calc_split(res, yy);
            self.push_phrase(res, yy, len, false);
        }
    }

    pub fn flush(&mut self, res: &mut Resources<'_>) {
        self.flushed = true;
        self.commit(res);
    }

    fn push_phrase(&mut self, res: &mut Resources<'_>, yy: usize, len: usize, user_sized: bool) {
        let len = len.clamp(1, self.buffer.len() - yy);
        self.ensure_forest(res, yy);
        let candidates = build_candidates(
            self.forest(yy),
            &self.buffer[yy..yy + len],
            len,
            res,
        );
        self.phrases.push(PhraseSlot {
            offset: yy,
            len,
            candidates,
            selected: 0,
            user_sized,
        });
    }

    pub fn phrase(&self) -> RkResult<&PhraseSlot> {
        self.phrases
            .get(self.current)
            .ok_or_else(|| RkError::invalid("no phrase is committed yet"))
    }

    fn phrase_mut(&mut self) -> RkResult<&mut PhraseSlot> {
        self.phrases
            .get_mut(self.current)
            .ok_or_else(|| RkError::invalid("no phrase is committed yet"))
    }

    pub fn goto(&mut self, index: usize) -> RkResult<usize> {
        if index >= self.phrases.len() {
            return Err(RkError::invalid(format!(
                "phrase {index} of {}",
                self.phrases.len()
            )));
        }
        self.current = index;
        Ok(index)
    }

    pub fn left(&mut self) -> RkResult<usize> {
        let n = self.phrases.len();
        if n == 0 {
            return Err(RkError::invalid("no phrase is committed yet"));
        }
        self.current = (self.current + n - 1) % n;
        Ok(self.current)
    }

    pub fn right(&mut self) -> RkResult<usize> {
        let n = self.phrases.len();
        if n == 0 {
            return Err(RkError::invalid("no phrase is committed yet"));
        }
        self.current = (self.current + 1) % n;
        Ok(self.current)
    }

    pub fn select(&mut self, index: usize) -> RkResult<usize> {
        let phrase = self.phrase_mut()?;
        if index >= phrase.candidates.len() {
            return Err(RkError::invalid(format!(
                "candidate {index} of {}",
                phrase.candidates.len()
            )));
        }
        phrase.selected = index;
        Ok(index)
    }

    /// Moves the selection by `step`, wrapping at either end.
    pub fn step_candidate(&mut self, step: isize) -> RkResult<usize> {
        let phrase = self.phrase_mut()?;
        let n = phrase.candidates.len() as isize;
        if n == 0 {
            return Err(RkError::Inconsistent("phrase without candidates".into()));
        }
        phrase.selected = (phrase.selected as isize + step).rem_euclid(n) as usize;
        Ok(phrase.selected)
    }

    /// Gives the current phrase `len` reading characters and splits the
    /// rest of the reading again. Returns the number of phrases.
    pub fn resize(&mut self, res: &mut Resources<'_>, len: usize) -> RkResult<usize> {
        let (index, yy) = {
            let phrase = self.phrase()?;
            (self.current, phrase.offset)
        };
        let limit = res.config.max_phrase_len.min(self.buffer.len() - yy);
        if len == 0 || len > limit {
            return Err(RkError::invalid(format!(
                "phrase length {len} outside 1..={limit}"
            )));
        }
        self.phrases.truncate(index);
        self.push_phrase(res, yy, len, true);
        self.commit(res);
        Ok(self.phrases.len())
    }

    /// Spelling of the selected candidate of every phrase.
    pub fn converted(&self) -> String {
        self.phrases
            .iter()
            .filter_map(|p| p.candidates.get(p.selected))
            .flat_map(|c| c.text.iter())
            .collect()
    }

    /// Checks the bookkeeping every operation must preserve.
    pub fn check_invariants(&self) -> RkResult<()> {
        if self.forests.len() != self.buffer.len() {
            return Err(RkError::Inconsistent(format!(
                "{} forests for a reading of {}",
                self.forests.len(),
                self.buffer.len()
            )));
        }
        let mut offset = 0;
        for (i, p) in self.phrases.iter().enumerate() {
            if p.offset != offset || p.len == 0 {
                return Err(RkError::Inconsistent(format!(
                    "phrase {i} at {}+{} after {offset}",
                    p.offset, p.len
                )));
            }
            if p.candidates.is_empty() || p.selected >= p.candidates.len() {
                return Err(RkError::Inconsistent(format!("phrase {i} selection out of range")));
            }
            offset += p.len;
        }
        if offset > self.buffer.len() || (self.flushed && offset != self.buffer.len()) {
            return Err(RkError::Inconsistent(format!(
                "phrases cover {offset} of {} reading characters",
                self.buffer.len()
            )));
        }
        if !self.phrases.is_empty() && self.current >= self.phrases.len() {
            return Err(RkError::Inconsistent(format!("current phrase {}", self.current)));
        }
        Ok(())
    }
}
