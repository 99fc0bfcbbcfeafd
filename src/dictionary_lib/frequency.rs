//! Learning data of one dictionary: recency ticks, candidate permutations
//! and the phrase-boundary cache.
//!
//! ```text
//! frequency member image
//! ┌────────┬──────────────────────────────────────────────────────────┐
//! │ header │ len:u32 │ recency │ permutations │ boundaries            │
//! └────────┴──────────────────────────────────────────────────────────┘
//!            #FRQ
//!
//! recency       capacity:u32 clock:u32 count:u32 (seq:u32 tick:u32)×count
//! permutations  count:u32 (seq:u32 candidates:u16 packed[..])×count
//! boundaries    capacity:u32 count:u32 (tick:u32 len:u8 reading×u16)×count
//! ```
//!
//! A permutation entry is `(original_index << 1) | used`, packed MSB-first
//! with [`permutation_width`] bits per candidate.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::dictionary_lib::header::{Header, HeaderTag};
use crate::dictionary_lib::word_record::WordRecord;
use crate::error::{RkError, RkResult};
use crate::utils::{
    char_to_unit, copy_bits, get_bits, pack_bits, packed_len, permutation_width, set_bits,
    unit_to_char, unpack_bits,
};

/// Bounded map from record sequence number to the tick of its last use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyTable {
    capacity: usize,
    clock: u32,
    ticks: FxHashMap<u32, u32>,
}

impl RecencyTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            ticks: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Tick of the last use of `seq`, zero when unknown.
    pub fn tick(&self, seq: u32) -> u32 {
        self.ticks.get(&seq).copied().unwrap_or(0)
    }

    /// Marks `seq` as used now. When the table is full the least recently
    /// used entry is evicted.
    pub fn touch(&mut self, seq: u32) -> u32 {
        if self.clock == u32::MAX {
            self.renumber();
        }
        self.clock += 1;
        if !self.ticks.contains_key(&seq) && self.ticks.len() >= self.capacity {
            let oldest = self
                .ticks
                .iter()
                .min_by_key(|&(&s, &t)| (t, s))
                .map(|(&s, _)| s);
            if let Some(oldest) = oldest {
                self.ticks.remove(&oldest);
            }
        }
        self.ticks.insert(seq, self.clock);
        self.clock
    }

    pub fn forget(&mut self, seq: u32) -> bool {
        self.ticks.remove(&seq).is_some()
    }

    /// Compresses ticks to `1..=len` keeping their order.
    fn renumber(&mut self) {
        let mut by_tick: Vec<(u32, u32)> = self.ticks.iter().map(|(&s, &t)| (t, s)).collect();
        by_tick.sort_unstable();
        for (i, (_, seq)) in by_tick.iter().enumerate() {
            self.ticks.insert(*seq, i as u32 + 1);
        }
        self.clock = by_tick.len() as u32;
    }

    fn sorted(&self) -> Vec<(u32, u32)> {
        let mut v: Vec<(u32, u32)> = self.ticks.iter().map(|(&s, &t)| (s, t)).collect();
        v.sort_unstable();
        v
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Packed {
    candidates: u16,
    bits: Vec<u8>,
}

impl Packed {
    fn identity(n: usize) -> RkResult<Self> {
        let width = permutation_width(n);
        let mut bits = vec![0u8; packed_len(n, width)];
        let values: Vec<u32> = (0..n as u32).map(|i| i << 1).collect();
        pack_bits(&mut bits, 0, width, &values)?;
        Ok(Self {
            candidates: n as u16,
            bits,
        })
    }

    fn width(&self) -> u32 {
        permutation_width(self.candidates as usize)
    }

    /// Original indices in presentation order, or `None` when the entry is
    /// not a permutation of `0..n`.
    fn decode(&self, n: usize) -> Option<Vec<usize>> {
        if self.candidates as usize != n {
            return None;
        }
        let values = unpack_bits(&self.bits, 0, self.width(), n).ok()?;
        let mut seen = vec![false; n];
        let mut order = Vec::with_capacity(n);
        for v in values {
            let idx = (v >> 1) as usize;
            if idx >= n || seen[idx] {
                return None;
            }
            seen[idx] = true;
            order.push(idx);
        }
        Some(order)
    }
}

/// Per-record candidate orderings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermutationTable {
    entries: BTreeMap<u32, Packed>,
}

impl PermutationTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presentation order of the `n` candidates of record `seq`. An entry
    /// that does not decode to a permutation of `0..n` is dropped and
    /// identity order is returned; the second value reports that reset.
    pub fn order(&mut self, seq: u32, n: usize) -> (Vec<usize>, bool) {
        let Some(packed) = self.entries.get(&seq) else {
            return ((0..n).collect(), false);
        };
        match packed.decode(n) {
            Some(order) => (order, false),
            None => {
                tracing::warn!("permutation of record {seq} is inconsistent; reset to identity");
                self.entries.remove(&seq);
                ((0..n).collect(), true)
            }
        }
    }

    pub fn forget(&mut self, seq: u32) -> bool {
        self.entries.remove(&seq).is_some()
    }

    /// Moves the candidate presented at position `k` to the front; the
    /// candidates before it shift down by one.
    pub fn promote(&mut self, seq: u32, n: usize, k: usize) -> RkResult<()> {
        if k >= n || n > u16::MAX as usize {
            return Err(RkError::invalid(format!("candidate {k} of {n} cannot be promoted")));
        }
        let sane = self.entries.get(&seq).is_some_and(|p| p.decode(n).is_some());
        if !sane {
            self.entries.insert(seq, Packed::identity(n)?);
        }
        let Some(packed) = self.entries.get_mut(&seq) else {
            return Err(RkError::Inconsistent(format!("permutation {seq} vanished")));
        };
        let w = packed.width();
        let chosen = get_bits(&packed.bits, k * w as usize, w) | 1;
        copy_bits(&mut packed.bits, w as usize, 0, k * w as usize)?;
        set_bits(&mut packed.bits, 0, w, chosen);
        Ok(())
    }
}

/// Readings whose phrase boundary the user fixed by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryCache {
    capacity: usize,
    clock: u32,
    entries: Vec<(u32, Vec<char>)>,
}

impl BoundaryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, reading: &[char]) {
        if reading.is_empty() || reading.len() > u8::MAX as usize {
            return;
        }
        self.clock = self.clock.saturating_add(1);
        if let Some(entry) = self.entries.iter_mut().find(|(_, r)| r == reading) {
            entry.0 = self.clock;
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, (t, _))| *t)
                .map(|(i, _)| i)
            {
                self.entries.swap_remove(oldest);
            }
        }
        self.entries.push((self.clock, reading.to_vec()));
    }

    /// Longest recorded reading that is a prefix of `text`.
    pub fn longest_prefix(&self, text: &[char]) -> Option<usize> {
        self.entries
            .iter()
            .filter(|(_, r)| text.starts_with(r))
            .map(|(_, r)| r.len())
            .max()
    }

    /// `true` when some recorded reading strictly extends `text`, so more
    /// input could still select it.
    pub fn pending(&self, text: &[char]) -> bool {
        self.entries
            .iter()
            .any(|(_, r)| r.len() > text.len() && r.starts_with(text))
    }
}

/// All learning data of one dictionary member, optionally backed by a file.
#[derive(Debug)]
pub struct FrequencyStore {
    path: Option<PathBuf>,
    dictionary: String,
    sequence_count: u32,
    pub recency: RecencyTable,
    pub permutations: PermutationTable,
    pub boundaries: BoundaryCache,
    dirty: bool,
}

impl FrequencyStore {
    pub fn in_memory(dictionary: &str, sequence_count: u32, recency: usize, boundaries: usize) -> Self {
        Self {
            path: None,
            dictionary: dictionary.to_string(),
            sequence_count,
            recency: RecencyTable::new(recency),
            permutations: PermutationTable::default(),
            boundaries: BoundaryCache::new(boundaries),
            dirty: false,
        }
    }

    /// Creates a new frequency file at `path` and writes it immediately.
    pub fn create<P: AsRef<Path>>(
        path: P,
        dictionary: &str,
        sequence_count: u32,
        recency: usize,
        boundaries: usize,
    ) -> RkResult<Self> {
        let mut store = Self::in_memory(dictionary, sequence_count, recency, boundaries);
        store.path = Some(path.as_ref().to_path_buf());
        store.dirty = true;
        store.sync()?;
        Ok(store)
    }

    /// Reads the image at `path` and checks that it belongs to `dictionary`.
    /// Data built for a different record count is discarded and the store
    /// starts empty.
    fn load(
        path: &Path,
        dictionary: &str,
        sequence_count: u32,
        recency: usize,
        boundaries: usize,
    ) -> RkResult<Self> {
        let bytes = fs::read(path)?;
        let store = Self::from_bytes(&bytes, recency, boundaries)?;
        if store.dictionary != dictionary {
            return Err(RkError::parse(format!(
                "{} holds learning data of {}, not {}",
                path.display(),
                store.dictionary,
                dictionary
            )));
        }
        if store.sequence_count != sequence_count {
            tracing::warn!(
                "{} was built for {} records, dictionary has {}; starting afresh",
                path.display(),
                store.sequence_count,
                sequence_count
            );
            let mut fresh = Self::in_memory(dictionary, sequence_count, recency, boundaries);
            fresh.dirty = true;
            return Ok(fresh);
        }
        Ok(store)
    }

    /// Loads the frequency file at `path` for reading and writing.
    pub fn open<P: AsRef<Path>>(
        path: P,
        dictionary: &str,
        sequence_count: u32,
        recency: usize,
        boundaries: usize,
    ) -> RkResult<Self> {
        let path = path.as_ref();
        let mut store = Self::load(path, dictionary, sequence_count, recency, boundaries)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Loads a frequency file that may not be written. Learning still
    /// happens in memory and is lost on unmount.
    pub fn open_read_only<P: AsRef<Path>>(
        path: P,
        dictionary: &str,
        sequence_count: u32,
        recency: usize,
        boundaries: usize,
    ) -> RkResult<Self> {
        let mut store = Self::load(path.as_ref(), dictionary, sequence_count, recency, boundaries)?;
        store.dirty = false;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tick(&self, seq: u32) -> u32 {
        self.recency.tick(seq)
    }

    pub fn touch(&mut self, seq: u32) -> u32 {
        self.dirty = true;
        self.recency.touch(seq)
    }

    /// Reorders `record` into presentation order.
    pub fn apply(&mut self, seq: u32, record: &mut WordRecord) {
        let (order, reset) = self.permutations.order(seq, record.candidates.len());
        if reset {
            self.dirty = true;
        }
        if order.iter().enumerate().all(|(i, &o)| i == o) {
            return;
        }
        let original = std::mem::take(&mut record.candidates);
        record.candidates = order.into_iter().map(|i| original[i].clone()).collect();
    }

    pub fn promote(&mut self, seq: u32, n: usize, k: usize) -> RkResult<()> {
        self.permutations.promote(seq, n, k)?;
        self.dirty = true;
        Ok(())
    }

    /// Drops the recency and ordering of record `seq`, whose slot is about
    /// to hold a different word.
    pub fn forget(&mut self, seq: u32) {
        let recency = self.recency.forget(seq);
        let order = self.permutations.forget(seq);
        if recency || order {
            self.dirty = true;
        }
    }

    pub fn record_boundary(&mut self, reading: &[char]) {
        self.boundaries.record(reading);
        self.dirty = true;
    }

    pub fn to_bytes(&self) -> RkResult<Vec<u8>> {
        let mut blob = Vec::new();
        let recency = self.recency.sorted();
        blob.extend_from_slice(&(self.recency.capacity as u32).to_be_bytes());
        blob.extend_from_slice(&self.recency.clock.to_be_bytes());
        blob.extend_from_slice(&(recency.len() as u32).to_be_bytes());
        for (seq, tick) in recency {
            blob.extend_from_slice(&seq.to_be_bytes());
            blob.extend_from_slice(&tick.to_be_bytes());
        }
        blob.extend_from_slice(&(self.permutations.entries.len() as u32).to_be_bytes());
        for (seq, packed) in &self.permutations.entries {
            blob.extend_from_slice(&seq.to_be_bytes());
            blob.extend_from_slice(&packed.candidates.to_be_bytes());
            blob.extend_from_slice(&packed.bits);
        }
        blob.extend_from_slice(&(self.boundaries.capacity as u32).to_be_bytes());
        blob.extend_from_slice(&(self.boundaries.entries.len() as u32).to_be_bytes());
        for (tick, reading) in &self.boundaries.entries {
            blob.extend_from_slice(&tick.to_be_bytes());
            blob.push(reading.len() as u8);
            for &c in reading {
                blob.extend_from_slice(&char_to_unit(c)?.to_be_bytes());
            }
        }

        let mut header = Header::new();
        header
            .set_str(HeaderTag::Dictionary, &self.dictionary)
            .set_int(HeaderTag::Sequence, self.sequence_count)
            .set_int(HeaderTag::FrequencyOffset, 0);
        let offset = header.encoded_len();
        header.set_int(HeaderTag::FrequencyOffset, offset as u32);
        let mut out = header.to_bytes()?;
        out.extend_from_slice(&(blob.len() as u32).to_be_bytes());
        out.extend_from_slice(&blob);
        Ok(out)
    }

    /// Decodes an image; capacities come from the caller, so a file written
    /// with larger tables keeps only its most recent entries.
    pub fn from_bytes(bytes: &[u8], recency: usize, boundaries: usize) -> RkResult<Self> {
        let header = Header::from_bytes(bytes)?;
        let dictionary = header
            .text(HeaderTag::Dictionary)
            .ok_or_else(|| RkError::parse("frequency image names no dictionary"))?;
        let sequence_count = header.require_int(HeaderTag::Sequence)?;
        let offset = header.require_int(HeaderTag::FrequencyOffset)? as usize;
        let mut r = ByteReader::new(bytes, offset);
        let len = r.u32()? as usize;
        let blob = r.take(len)?;
        let mut r = ByteReader::new(blob, 0);

        let mut store = Self::in_memory(&dictionary, sequence_count, recency, boundaries);

        let _stored_capacity = r.u32()?;
        let clock = r.u32()?;
        let count = r.u32()? as usize;
        let mut pairs = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            pairs.push((r.u32()?, r.u32()?));
        }
        pairs.sort_unstable_by_key(|&(_, tick)| std::cmp::Reverse(tick));
        pairs.truncate(store.recency.capacity);
        store.recency.clock = clock.max(pairs.iter().map(|&(_, t)| t).max().unwrap_or(0));
        store.recency.ticks = pairs.into_iter().collect();

        let count = r.u32()? as usize;
        for _ in 0..count {
            let seq = r.u32()?;
            let candidates = r.u16()?;
            let width = permutation_width(candidates as usize);
            let bits = r.take(packed_len(candidates as usize, width))?.to_vec();
            store
                .permutations
                .entries
                .insert(seq, Packed { candidates, bits });
        }

        let _stored_capacity = r.u32()?;
        let count = r.u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let tick = r.u32()?;
            let len = r.u8()? as usize;
            let mut reading = Vec::with_capacity(len);
            for _ in 0..len {
                reading.push(unit_to_char(r.u16()?)?);
            }
            entries.push((tick, reading));
        }
        entries.sort_by_key(|(tick, _)| std::cmp::Reverse(*tick));
        entries.truncate(store.boundaries.capacity);
        store.boundaries.clock = entries.iter().map(|(t, _)| *t).max().unwrap_or(0);
        store.boundaries.entries = entries;
        Ok(store)
    }

    /// Writes the image when dirty and file-backed, through a side file
    /// renamed over the original.
    pub fn sync(&mut self) -> RkResult<()> {
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let mut side = path.clone().into_os_string();
        side.push(".new");
        fs::write(&side, self.to_bytes()?)?;
        fs::rename(&side, &path)?;
        self.dirty = false;
        tracing::debug!("saved learning data of {} to {}", self.dictionary, path.display());
        Ok(())
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8], at: usize) -> Self {
        Self { buf, at }
    }

    fn take(&mut self, n: usize) -> RkResult<&'a [u8]> {
        let end = self
            .at
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| RkError::parse("truncated frequency data"))?;
        let out = &self.buf[self.at..end];
        self.at = end;
        Ok(out)
    }

    fn u8(&mut self) -> RkResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> RkResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> RkResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_evicts_least_recent() {
        let mut t = RecencyTable::new(2);
        t.touch(10);
        t.touch(20);
        t.touch(10);
        t.touch(30);
        assert_eq!(t.len(), 2);
        assert_eq!(t.tick(20), 0);
        assert!(t.tick(30) > t.tick(10));
    }

    #[test]
    fn renumber_keeps_order() {
        let mut t = RecencyTable::new(4);
        t.touch(1);
        t.touch(2);
        t.clock = u32::MAX;
        let tick = t.touch(3);
        assert_eq!(tick, 3);
        assert!(t.tick(1) < t.tick(2));
    }

    #[test]
    fn promote_rotates_prefix() {
        let mut p = PermutationTable::default();
        p.promote(7, 4, 2).unwrap();
        assert_eq!(p.order(7, 4).0, vec![2, 0, 1, 3]);
        p.promote(7, 4, 3).unwrap();
        assert_eq!(p.order(7, 4).0, vec![3, 2, 0, 1]);
        p.promote(7, 4, 0).unwrap();
        assert_eq!(p.order(7, 4).0, vec![3, 2, 0, 1]);
        assert!(p.promote(7, 4, 4).is_err());
    }

    #[test]
    fn inconsistent_permutation_resets_to_identity() {
        let mut p = PermutationTable::default();
        p.promote(1, 3, 2).unwrap();
        let (order, reset) = p.order(1, 5);
        assert!(reset);
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(p.is_empty());

        let mut bits = vec![0u8; 1];
        pack_bits(&mut bits, 0, permutation_width(2), &[0, 0]).unwrap();
        p.entries.insert(9, Packed { candidates: 2, bits });
        assert_eq!(p.order(9, 2), (vec![0, 1], true));
    }

    #[test]
    fn apply_reorders_and_marks_resets_dirty() {
        let mut store = FrequencyStore::in_memory("iroha.mwd", 10, 8, 8);
        let mut rec = WordRecord::with_candidates("あめ", &[("雨", 1), ("飴", 1), ("天", 2)]);
        store.promote(3, 3, 1).unwrap();
        store.apply(3, &mut rec);
        assert_eq!(rec.candidates[0].spelling_string(), "飴");
        assert_eq!(rec.candidates[1].spelling_string(), "雨");

        let mut store = FrequencyStore::in_memory("iroha.mwd", 10, 8, 8);
        store.permutations.promote(3, 2, 1).unwrap();
        let mut rec = WordRecord::with_candidates("あめ", &[("雨", 1), ("飴", 1), ("天", 2)]);
        store.apply(3, &mut rec);
        assert!(store.is_dirty());
        assert_eq!(rec.candidates[0].spelling_string(), "雨");
    }

    #[test]
    fn boundaries_prefer_longest_prefix() {
        let mut b = BoundaryCache::new(2);
        let text: Vec<char> = "きょうは".chars().collect();
        b.record(&text[..2]);
        b.record(&text[..3]);
        assert_eq!(b.longest_prefix(&text), Some(3));
        b.record(&"あめ".chars().collect::<Vec<_>>());
        assert_eq!(b.len(), 2);
        assert_eq!(b.longest_prefix(&text), Some(3));
        assert_eq!(b.longest_prefix(&text[1..]), None);
        assert!(b.pending(&text[..2]));
        assert!(!b.pending(&text));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iroha.cld");
        let mut store = FrequencyStore::create(&path, "iroha.mwd", 42, 16, 16).unwrap();
        store.touch(5);
        store.touch(9);
        store.promote(5, 3, 2).unwrap();
        store.record_boundary(&"きょう".chars().collect::<Vec<_>>());
        store.sync().unwrap();
        assert!(!store.is_dirty());

        let mut back = FrequencyStore::open(&path, "iroha.mwd", 42, 16, 16).unwrap();
        assert_eq!(back.recency, store.recency);
        assert_eq!(back.permutations, store.permutations);
        assert_eq!(back.boundaries, store.boundaries);
        assert_eq!(back.permutations.order(5, 3).0, vec![2, 0, 1]);
        assert!(!back.is_dirty());
    }

    #[test]
    fn mismatched_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iroha.cld");
        let mut store = FrequencyStore::create(&path, "iroha.mwd", 42, 16, 16).unwrap();
        store.touch(1);
        store.sync().unwrap();
        assert!(FrequencyStore::open(&path, "other.mwd", 42, 16, 16).is_err());
        let fresh = FrequencyStore::open(&path, "iroha.mwd", 43, 16, 16).unwrap();
        assert!(fresh.recency.is_empty());
        assert!(fresh.is_dirty());

        let bytes = fs::read(&path).unwrap();
        assert!(FrequencyStore::from_bytes(&bytes[..bytes.len() - 2], 16, 16).is_err());
    }

    #[test]
    fn read_only_files_are_checked_and_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iroha.cld");
        let mut store = FrequencyStore::create(&path, "iroha.mwd", 42, 16, 16).unwrap();
        store.touch(1);
        store.sync().unwrap();
        let saved = fs::read(&path).unwrap();

        assert!(FrequencyStore::open_read_only(&path, "other.mwd", 42, 16, 16).is_err());
        let stale = FrequencyStore::open_read_only(&path, "iroha.mwd", 43, 16, 16).unwrap();
        assert!(stale.recency.is_empty());
        assert!(!stale.is_persistent());

        let mut ro = FrequencyStore::open_read_only(&path, "iroha.mwd", 42, 16, 16).unwrap();
        assert!(ro.tick(1) > 0);
        ro.touch(2);
        ro.sync().unwrap();
        assert_eq!(fs::read(&path).unwrap(), saved);
    }

    #[test]
    fn forgotten_records_start_fresh() {
        let mut store = FrequencyStore::in_memory("mine.usr", 0, 8, 8);
        store.touch(4);
        store.promote(4, 3, 2).unwrap();
        store.sync().unwrap();
        store.forget(4);
        assert!(store.is_dirty());
        assert_eq!(store.tick(4), 0);
        assert_eq!(store.permutations.order(4, 3).0, vec![0, 1, 2]);
        assert!(store.permutations.is_empty());
    }
}
