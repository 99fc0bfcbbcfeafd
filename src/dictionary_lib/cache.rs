//! Reference-counted cache of decoded word records.
//!
//! The cache is the single point of truth for "is this record in use". Every
//! candidate node of a live phrase holds one reference on the record it was
//! built from; records with no references stay cached until [`RecordCache::reclaim`]
//! needs their slot.
//!
//! ## Handles
//!
//! Entries live in a slot map. A [`RecordHandle`] carries the slot index and
//! the generation the slot had when the handle was issued, so a handle to a
//! purged entry is detected instead of silently aliasing a newer record.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::dictionary_lib::word_record::WordRecord;
use crate::error::{RkError, RkResult};

/// Identity of a mounted dictionary member inside one engine.
pub type MemberId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub member: MemberId,
    pub address: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle {
    slot: u32,
    generation: u32,
}

#[derive(Debug)]
struct CacheEntry {
    key: RecordKey,
    record: WordRecord,
    refs: u32,
    dirty: bool,
    /// Stamp under which the entry sits in the idle set, when unreferenced.
    idle_since: Option<u64>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<CacheEntry>,
}

#[derive(Debug)]
pub struct RecordCache {
    capacity: usize,
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: FxHashMap<RecordKey, u32>,
    /// Unreferenced clean entries, oldest first.
    idle: BTreeMap<u64, u32>,
    stamp: u64,
    live: usize,
}

impl RecordCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            idle: BTreeMap::new(),
            stamp: 0,
            live: 0,
        }
    }

    /// Number of cached records, referenced or not.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    fn entry(&self, h: RecordHandle) -> Option<&CacheEntry> {
        let slot = self.slots.get(h.slot as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, h: RecordHandle) -> Option<&mut CacheEntry> {
        let slot = self.slots.get_mut(h.slot as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn handle_of(&self, slot: u32) -> RecordHandle {
        RecordHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn leave_idle(&mut self, slot: u32) {
        if let Some(entry) = self.slots[slot as usize].entry.as_mut() {
            if let Some(stamp) = entry.idle_since.take() {
                self.idle.remove(&stamp);
            }
        }
    }

    fn enter_idle(&mut self, slot: u32) {
        self.stamp += 1;
        let stamp = self.stamp;
        if let Some(entry) = self.slots[slot as usize].entry.as_mut() {
            if entry.refs == 0 && !entry.dirty && entry.idle_since.is_none() {
                entry.idle_since = Some(stamp);
                self.idle.insert(stamp, slot);
            }
        }
    }

    /// Returns a handle on the record for `key`, loading it with `load` on a
    /// miss. Each successful call adds one reference.
    ///
    /// When `load` fails nothing is cached and the error is returned. When
    /// the cache is full of referenced or dirty records the result is
    /// [`RkError::ResourceExhausted`].
    pub fn read<F>(&mut self, key: RecordKey, load: F) -> RkResult<RecordHandle>
    where
        F: FnOnce() -> RkResult<WordRecord>,
    {
        if let Some(&slot) = self.index.get(&key) {
            self.leave_idle(slot);
            if let Some(entry) = self.slots[slot as usize].entry.as_mut() {
                entry.refs += 1;
            }
            return Ok(self.handle_of(slot));
        }
        if self.live >= self.capacity {
            self.reclaim(self.capacity - 1);
            if self.live >= self.capacity {
                return Err(RkError::ResourceExhausted(format!(
                    "record cache holds {} records in use",
                    self.live
                )));
            }
        }
        let record = load()?;
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        self.slots[slot as usize].entry = Some(CacheEntry {
            key,
            record,
            refs: 1,
            dirty: false,
            idle_since: None,
        });
        self.index.insert(key, slot);
        self.live += 1;
        Ok(self.handle_of(slot))
    }

    /// Adds a reference to an entry already held through `h`.
    pub fn retain(&mut self, h: RecordHandle) -> bool {
        match self.entry_mut(h) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drops one reference. At zero the entry becomes reclaimable.
    pub fn deref(&mut self, h: RecordHandle) {
        let Some(entry) = self.entry_mut(h) else {
            return;
        };
        if entry.refs == 0 {
            tracing::error!("record {:?} released more often than read", entry.key);
            debug_assert!(false, "record cache reference underflow");
            return;
        }
        entry.refs -= 1;
        if entry.refs == 0 {
            self.enter_idle(h.slot);
        }
    }

    pub fn record(&self, h: RecordHandle) -> Option<&WordRecord> {
        self.entry(h).map(|e| &e.record)
    }

    pub fn key(&self, h: RecordHandle) -> Option<RecordKey> {
        self.entry(h).map(|e| e.key)
    }

    #[cfg(test)]
    fn refs(&self, h: RecordHandle) -> u32 {
        self.entry(h).map_or(0, |e| e.refs)
    }

    #[cfg(test)]
    fn is_dirty(&self, h: RecordHandle) -> bool {
        self.entry(h).is_some_and(|e| e.dirty)
    }

    pub fn lookup(&self, key: RecordKey) -> Option<RecordHandle> {
        self.index.get(&key).map(|&slot| self.handle_of(slot))
    }

    fn evict(&mut self, slot: u32) -> Option<CacheEntry> {
        self.leave_idle(slot);
        let s = &mut self.slots[slot as usize];
        let entry = s.entry.take()?;
        s.generation = s.generation.wrapping_add(1);
        self.index.remove(&entry.key);
        self.free.push(slot);
        self.live -= 1;
        Some(entry)
    }

    /// Evicts the entry under `key` regardless of its reference count.
    /// Outstanding handles become stale.
    pub fn purge_key(&mut self, key: RecordKey) -> bool {
        match self.index.get(&key).copied() {
            Some(slot) => self.evict(slot).is_some(),
            None => false,
        }
    }

    /// Evicts every entry of `member`, returning how many were dropped.
    pub fn invalidate(&mut self, member: MemberId) -> usize {
        let slots: Vec<u32> = self
            .index
            .iter()
            .filter(|(k, _)| k.member == member)
            .map(|(_, &slot)| slot)
            .collect();
        for &slot in &slots {
            if let Some(entry) = self.evict(slot) {
                if entry.refs > 0 {
                    tracing::debug!("invalidated {:?} with {} references", entry.key, entry.refs);
                }
            }
        }
        slots.len()
    }

    /// Replaces the cached copy of `key` in place, keeping its references.
    /// Returns `false` when the key is not cached.
    pub fn replace_record(&mut self, key: RecordKey, record: WordRecord) -> bool {
        let Some(&slot) = self.index.get(&key) else {
            return false;
        };
        match self.slots[slot as usize].entry.as_mut() {
            Some(entry) => {
                entry.record = record;
                true
            }
            None => false,
        }
    }

    /// Edits the record behind `h` and marks it dirty; dirty records are never
    /// reclaimed until [`RecordCache::take_dirty`] hands them back.
    pub fn modify<F>(&mut self, h: RecordHandle, f: F) -> bool
    where
        F: FnOnce(&mut WordRecord) -> bool,
    {
        let Some(entry) = self.entry_mut(h) else {
            return false;
        };
        if !f(&mut entry.record) {
            return false;
        }
        entry.dirty = true;
        self.leave_idle(h.slot);
        true
    }

    /// Clears the dirty flag of every record of `member` and returns copies
    /// for write-back, ordered by address.
    pub fn take_dirty(&mut self, member: MemberId) -> Vec<(u32, WordRecord)> {
        let mut slots: Vec<(u32, u32)> = self
            .index
            .iter()
            .filter(|(k, _)| k.member == member)
            .map(|(k, &slot)| (k.address, slot))
            .collect();
        slots.sort_unstable();
        let mut out = Vec::new();
        for (address, slot) in slots {
            let Some(entry) = self.slots[slot as usize].entry.as_mut() else {
                continue;
            };
            if !entry.dirty {
                continue;
            }
            entry.dirty = false;
            out.push((address, entry.record.clone()));
            if entry.refs == 0 {
                self.enter_idle(slot);
            }
        }
        out
    }

    /// Drops unreferenced clean entries, oldest first, until at most
    /// `target` records remain. Returns the number dropped.
    pub fn reclaim(&mut self, target: usize) -> usize {
        let mut dropped = 0;
        while self.live > target {
            let Some((_, slot)) = self.idle.pop_first() else {
                break;
            };
            if let Some(entry) = self.slots[slot as usize].entry.as_mut() {
                entry.idle_since = None;
            }
            if self.evict(slot).is_some() {
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(address: u32) -> RecordKey {
        RecordKey { member: 1, address }
    }

    fn rec(reading: &str) -> WordRecord {
        WordRecord::with_candidates(reading, &[("x", 1)])
    }

    #[test]
    fn repeated_reads_alias_one_entry() {
        let mut cache = RecordCache::new(8);
        let mut loads = 0;
        let a = cache
            .read(key(10), || {
                loads += 1;
                Ok(rec("あ"))
            })
            .unwrap();
        let b = cache.read(key(10), || unreachable!()).unwrap();
        assert_eq!(a, b);
        assert_eq!(loads, 1);
        assert_eq!(cache.refs(a), 2);
        cache.deref(a);
        assert_eq!(cache.refs(b), 1);
        cache.deref(b);
        assert_eq!(cache.refs(b), 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.idle_len(), 1);
        assert_eq!(cache.record(b).unwrap().reading_string(), "あ");
    }

    #[test]
    fn failed_load_creates_nothing() {
        let mut cache = RecordCache::new(8);
        assert!(cache.read(key(1), || Err(RkError::parse("corrupt"))).is_err());
        assert!(cache.is_empty());
        assert!(cache.lookup(key(1)).is_none());
    }

    #[test]
    fn purge_makes_handles_stale() {
        let mut cache = RecordCache::new(8);
        let h = cache.read(key(1), || Ok(rec("あ"))).unwrap();
        assert!(cache.purge_key(key(1)));
        assert!(!cache.purge_key(key(1)));
        assert!(cache.record(h).is_none());
        let again = cache.read(key(1), || Ok(rec("い"))).unwrap();
        assert_ne!(again, h);
        assert_eq!(cache.record(again).unwrap().reading_string(), "い");
        cache.deref(h);
        assert_eq!(cache.refs(again), 1);
    }

    #[test]
    fn full_cache_reclaims_idle_then_reports_exhaustion() {
        let mut cache = RecordCache::new(2);
        let a = cache.read(key(1), || Ok(rec("あ"))).unwrap();
        let b = cache.read(key(2), || Ok(rec("い"))).unwrap();
        cache.deref(a);
        let c = cache.read(key(3), || Ok(rec("う"))).unwrap();
        assert!(cache.record(a).is_none());
        assert_eq!(cache.len(), 2);
        assert!(matches!(
            cache.read(key(4), || Ok(rec("え"))),
            Err(RkError::ResourceExhausted(_))
        ));
        cache.deref(b);
        cache.deref(c);
        assert!(cache.read(key(4), || Ok(rec("え"))).is_ok());
    }

    #[test]
    fn dirty_entries_survive_reclaim_until_taken() {
        let mut cache = RecordCache::new(4);
        let h = cache.read(key(7), || Ok(rec("あ"))).unwrap();
        assert!(cache.modify(h, |r| {
            r.candidates.push(crate::dictionary_lib::word_record::Candidate::new("亜", 1));
            true
        }));
        cache.deref(h);
        assert_eq!(cache.reclaim(0), 0);
        let dirty = cache.take_dirty(1);
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0, 7);
        assert_eq!(dirty[0].1.candidates.len(), 2);
        assert!(!cache.is_dirty(h));
        assert_eq!(cache.reclaim(0), 1);
    }

    #[test]
    fn invalidate_and_replace() {
        let mut cache = RecordCache::new(8);
        let h = cache.read(key(1), || Ok(rec("あ"))).unwrap();
        let other = cache
            .read(RecordKey { member: 2, address: 1 }, || Ok(rec("か")))
            .unwrap();
        assert!(cache.replace_record(key(1), rec("ああ")));
        assert_eq!(cache.record(h).unwrap().reading_string(), "ああ");
        assert_eq!(cache.refs(h), 1);
        assert_eq!(cache.invalidate(1), 1);
        assert!(cache.record(h).is_none());
        assert!(cache.record(other).is_some());
        assert!(!cache.replace_record(key(1), rec("あ")));
    }
}
