//! Open dictionaries shared by every context that mounted them.

use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dictionary_lib::backend::Backend;
use crate::dictionary_lib::cache::{MemberId, RecordCache};
use crate::dictionary_lib::catalog::{
    Catalog, DicMember, MemberClass, MemberKind, MemberRef, Permission,
};
use crate::dictionary_lib::frequency::FrequencyStore;
use crate::dictionary_lib::grammar::GrammarTable;
use crate::dictionary_lib::permanent::PermanentDic;
use crate::dictionary_lib::temporary::TemporaryDic;
use crate::error::{RkError, RkResult};

use super::nword::WordClass;

pub(crate) type MountId = usize;

#[derive(Debug)]
pub(crate) struct Mount {
    pub nickname: String,
    pub class: WordClass,
    pub member: MemberRef,
    /// Key of this dictionary's records in the record cache.
    pub cache_id: MemberId,
    pub backend: Backend,
    pub freq: FrequencyStore,
    pub freq_member: Option<MemberRef>,
    pub writable: bool,
    /// Contexts that mounted this dictionary.
    pub users: usize,
}

fn word_class(class: MemberClass) -> Option<WordClass> {
    match class {
        MemberClass::Main | MemberClass::User => Some(WordClass::Main),
        MemberClass::Sub => Some(WordClass::Sub),
        MemberClass::Prefix => Some(WordClass::Prefix),
        MemberClass::Suffix => Some(WordClass::Suffix),
        MemberClass::Frequency | MemberClass::Grammar => None,
    }
}

impl Mount {
    pub fn open(
        catalog: &mut Catalog,
        member: MemberRef,
        cache_id: MemberId,
        config: &EngineConfig,
        grammar: &Arc<GrammarTable>,
        grammar_member: Option<&str>,
    ) -> RkResult<Mount> {
        let m = catalog
            .member(member)
            .cloned()
            .ok_or_else(|| RkError::NotFound(format!("member {member:?}")))?;
        if !m.kind.is_dictionary() {
            return Err(RkError::invalid(format!("{} is not a word dictionary", m.nickname)));
        }
        if !m.perm.read {
            return Err(RkError::PermissionDenied(format!("{} is not readable", m.nickname)));
        }
        let class = word_class(m.class)
            .ok_or_else(|| RkError::invalid(format!("{} has no word class", m.nickname)))?;
        let path = catalog
            .path_of(member)
            .ok_or_else(|| RkError::NotFound(m.link.clone()))?;

        let backend = match m.kind {
            MemberKind::Permanent => {
                Backend::Permanent(PermanentDic::open(&path, &m.member, config.page_cache_pages)?)
            }
            _ if path.exists() => {
                Backend::Temporary(TemporaryDic::open(&path, &m.member, Arc::clone(grammar))?)
            }
            _ => Backend::Temporary(TemporaryDic::create(&path, &m.member, Arc::clone(grammar))?),
        };

        if let Backend::Permanent(dic) = &backend {
            check_grammar(catalog, &m.nickname, dic.grammar_name(), grammar_member)?;
        }

        let (freq, freq_member) = if backend.is_permanent() {
            open_frequency(catalog, &m, backend.record_count(), config)
        } else {
            (
                FrequencyStore::in_memory(&m.member, 0, config.recency_capacity, config.boundary_capacity),
                None,
            )
        };

        catalog.acquire(member)?;
        if let Some(fm) = freq_member {
            catalog.acquire(fm)?;
        }
        tracing::debug!("mounted {} ({:?}, {:?})", m.nickname, m.kind, class);
        Ok(Mount {
            nickname: m.nickname,
            class,
            member,
            cache_id,
            backend,
            freq,
            freq_member,
            writable: m.perm.write,
            users: 0,
        })
    }

    /// Hands records edited through the cache back to a temporary
    /// dictionary.
    pub fn write_back(&mut self, cache: &mut RecordCache) -> RkResult<()> {
        let dirty = cache.take_dirty(self.cache_id);
        if let Some(temp) = self.backend.as_temporary_mut() {
            for (address, record) in dirty {
                temp.store_record(address, record)?;
            }
        }
        Ok(())
    }

    pub fn sync(&mut self, cache: &mut RecordCache) -> RkResult<()> {
        self.write_back(cache)?;
        if self.writable {
            self.backend.sync()?;
        }
        self.freq.sync()
    }

    /// Syncs, evicts the cached records and drops the catalog references.
    /// References are dropped even when syncing fails.
    pub fn close(mut self, catalog: &mut Catalog, cache: &mut RecordCache) -> RkResult<()> {
        let synced = self.sync(cache);
        if let Err(err) = &synced {
            tracing::warn!("sync of {} failed while unmounting: {err}", self.nickname);
        }
        let dropped = cache.invalidate(self.cache_id);
        catalog.release(self.member);
        if let Some(fm) = self.freq_member {
            catalog.release(fm);
        }
        tracing::debug!("unmounted {} ({dropped} cached records dropped)", self.nickname);
        synced
    }
}

/// Refuses a dictionary compiled against another grammar member on the
/// path: its row numbers mean something else under the loaded table. A
/// declared grammar the catalog does not know is only reported.
fn check_grammar(
    catalog: &Catalog,
    nickname: &str,
    declared: Option<String>,
    loaded: Option<&str>,
) -> RkResult<()> {
    let Some(declared) = declared else {
        return Ok(());
    };
    if loaded == Some(declared.as_str()) {
        return Ok(());
    }
    let known = catalog.directories().any(|(_, dir)| {
        dir.members()
            .any(|g| g.kind == MemberKind::Grammar && g.member == declared)
    });
    if !known {
        tracing::warn!("{nickname} declares grammar {declared}, which is not on the dictionary path");
        return Ok(());
    }
    Err(RkError::invalid(format!(
        "{nickname} was built for grammar {declared}, but {} is loaded",
        loaded.unwrap_or("the built-in grammar")
    )))
}

/// Opens the learning data paired with a permanent dictionary, creating a
/// frequency member when allowed. Falls back to an in-memory store.
fn open_frequency(
    catalog: &mut Catalog,
    m: &DicMember,
    sequence_count: u32,
    config: &EngineConfig,
) -> (FrequencyStore, Option<MemberRef>) {
    let (recency, boundaries) = (config.recency_capacity, config.boundary_capacity);
    let memory = || FrequencyStore::in_memory(&m.member, sequence_count, recency, boundaries);

    let found = match catalog.find(&m.nickname, &[MemberKind::Frequency]) {
        Some(r) => Some(r),
        None if config.auto_create_frequency => create_frequency_member(catalog, m),
        None => None,
    };
    let Some(r) = found else {
        return (memory(), None);
    };
    let (Some(path), Some(writable)) = (catalog.path_of(r), catalog.member(r).map(|f| f.perm.write))
    else {
        return (memory(), None);
    };

    let opened = if path.exists() {
        if writable {
            FrequencyStore::open(&path, &m.member, sequence_count, recency, boundaries)
        } else {
            FrequencyStore::open_read_only(&path, &m.member, sequence_count, recency, boundaries)
        }
    } else if writable {
        FrequencyStore::create(&path, &m.member, sequence_count, recency, boundaries)
    } else {
        Ok(memory())
    };
    match opened {
        Ok(store) => (store, Some(r)),
        Err(err) => {
            tracing::warn!("learning data {} unusable: {err}", path.display());
            (memory(), None)
        }
    }
}

fn create_frequency_member(catalog: &mut Catalog, m: &DicMember) -> Option<MemberRef> {
    let dir = catalog.first_writable()?;
    let stem = Path::new(&m.member)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&m.nickname);
    let link = format!("{}.cld", m.nickname);
    let member = format!("{stem}.fq");
    match catalog.create_member(dir, &link, &member, &m.nickname, Permission::READ_WRITE) {
        Ok(r) => Some(r),
        Err(err) => {
            tracing::warn!("cannot create learning data for {}: {err}", m.nickname);
            None
        }
    }
}
