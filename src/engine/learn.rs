//! Learning from finished conversions.

use crate::dictionary_lib::backend::Backend;
use crate::error::{RkError, RkResult};

use super::candidates::WordPart;
use super::nword::WordClass;
use super::session::{Resources, Session};

/// Moves the spelling of `part` to the front of its record and ticks the
/// record's recency.
///
/// Permanent dictionaries keep the new order in their learning data and
/// the cached copy is replaced in place; temporary dictionaries reorder the
/// record itself, written back on the next sync.
fn learn_word(res: &mut Resources<'_>, part: &WordPart) -> RkResult<()> {
    let mount = res
        .mounts
        .get_mut(part.mount)
        .and_then(Option::as_mut)
        .filter(|m| m.cache_id == part.key.member)
        .ok_or_else(|| RkError::NotFound(format!("dictionary of record {:?}", part.key)))?;
    let address = part.key.address;
    let seq = mount.backend.sequence(address)?;

    match res.cache.lookup(part.key) {
        Some(handle) => {
            let Some(record) = res.cache.record(handle) else {
                return Ok(());
            };
            let Some(k) = record.position(&part.spelling, part.row) else {
                return Ok(());
            };
            if k > 0 {
                if mount.backend.is_permanent() {
                    let mut promoted = record.clone();
                    mount.freq.promote(seq, promoted.candidates.len(), k)?;
                    promoted.promote(k);
                    res.cache.replace_record(part.key, promoted);
                } else {
                    res.cache.modify(handle, |r| r.promote(k));
                }
            }
        }
        None => {
            let mut record = mount.backend.read_record(address)?;
            mount.freq.apply(seq, &mut record);
            if let Some(k) = record.position(&part.spelling, part.row).filter(|&k| k > 0) {
                match &mut mount.backend {
                    Backend::Permanent(_) => mount.freq.promote(seq, record.candidates.len(), k)?,
                    Backend::Temporary(temp) => {
                        record.promote(k);
                        temp.store_record(address, record)?;
                    }
                }
            }
        }
    }
    mount.freq.touch(seq);
    Ok(())
}

impl Session {
    /// Records the selections of every committed phrase.
    ///
    /// Phrases left on their first candidate teach nothing; a phrase whose
    /// length the caller changed teaches its boundary either way.
    pub fn learn(&self, res: &mut Resources<'_>) {
        for phrase in &self.phrases {
            if phrase.user_sized {
                let reading = &self.buffer[phrase.offset..phrase.offset + phrase.len];
                self.learn_boundary(res, reading);
            }
            if phrase.selected == 0 {
                continue;
            }
            let Some(candidate) = phrase.candidates.get(phrase.selected) else {
                continue;
            };
            for part in &candidate.parts {
                if let Err(err) = learn_word(res, part) {
                    tracing::warn!("learning {:?} skipped: {err}", part.key);
                }
            }
        }
    }

    /// Stores a boundary with the first main dictionary of the session,
    /// preferring one whose learning data is kept on disk.
    fn learn_boundary(&self, res: &mut Resources<'_>, reading: &[char]) {
        let mains: Vec<(usize, bool)> = self
            .mounts
            .iter()
            .filter_map(|&mid| {
                let m = res.mounts.get(mid)?.as_ref()?;
                (m.class == WordClass::Main).then_some((mid, m.freq.is_persistent()))
            })
            .collect();
        let pick = mains
            .iter()
            .find(|&&(_, persistent)| persistent)
            .or_else(|| mains.first())
            .map(|&(mid, _)| mid);
        if let Some(mount) = pick.and_then(|mid| res.mounts.get_mut(mid)).and_then(Option::as_mut) {
            mount.freq.record_boundary(reading);
        }
    }
}
