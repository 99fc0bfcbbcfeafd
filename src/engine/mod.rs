//! The conversion engine: contexts, mounted dictionaries and phrase
//! conversion.
//!
//! An [`Engine`] owns everything shared between contexts: the dictionary
//! catalog, the record cache, the candidate-node arena and the open
//! dictionaries. A context is a handle naming a set of mounted
//! dictionaries and at most one conversion in progress.
//!
//! ```no_run
//! use yomi_renbun::{ConversionMode, Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::with_directory("/usr/share/dic")).unwrap();
//! let cx = engine.create_context();
//! engine.mount(cx, "iroha").unwrap();
//! let phrases = engine.begin_conversion(cx, "きょうはあめ", ConversionMode::Renbun).unwrap();
//! for i in 0..phrases {
//!     engine.goto_phrase(cx, i).unwrap();
//!     println!("{} -> {:?}", engine.phrase_yomi(cx).unwrap(), engine.kanji_list(cx).unwrap());
//! }
//! engine.end_conversion(cx, true).unwrap();
//! ```

mod candidates;
mod learn;
mod mount;
mod nword;
mod parse;
mod session;
mod split;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dictionary_lib::cache::{MemberId, RecordCache, RecordKey};
use crate::dictionary_lib::catalog::{Catalog, MemberClass, MemberKind, Permission};
use crate::dictionary_lib::grammar::GrammarTable;
use crate::dictionary_lib::temporary::TemporaryDic;
use crate::dictionary_lib::word_record::WordRecord;
use crate::error::{RkError, RkResult};
use crate::script::{ScriptCodec, StandardScript};

use mount::{Mount, MountId};
use nword::NodeArena;
use session::{Resources, Session};

pub use nword::WordClass;

pub type ContextId = usize;

const DICTIONARY_KINDS: [MemberKind; 2] = [MemberKind::Permanent, MemberKind::Temporary];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionMode {
    /// The whole reading is known up front and split at once.
    Renbun,
    /// The reading arrives through [`Engine::subst_yomi`]; phrases are
    /// committed as soon as further input can no longer change them.
    Auto,
}

/// State of the current phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseStatus {
    pub index: usize,
    pub offset: usize,
    pub reading_len: usize,
    pub spelling_len: usize,
    pub candidate_count: usize,
    pub selected: usize,
    /// Dictionary words making up the selected candidate.
    pub word_count: usize,
    pub user_sized: bool,
}

/// One catalog member visible on the dictionary path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryInfo {
    pub nickname: String,
    pub kind: MemberKind,
    pub class: MemberClass,
    pub permission: Permission,
    pub directory: PathBuf,
    pub mounted: bool,
}

#[derive(Debug, Default)]
struct Context {
    mounts: Vec<MountId>,
    session: Option<Session>,
}

pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    grammar: Arc<GrammarTable>,
    /// Catalog member name of the loaded grammar; `None` for the built-in
    /// table.
    grammar_member: Option<String>,
    script: Box<dyn ScriptCodec>,
    cache: RecordCache,
    arena: NodeArena,
    mounts: Vec<Option<Mount>>,
    contexts: Vec<Option<Context>>,
    next_cache_id: MemberId,
}

fn load_grammar(catalog: &Catalog, config: &EngineConfig) -> (Arc<GrammarTable>, Option<String>) {
    let Some(nickname) = config.grammar.as_deref() else {
        return (GrammarTable::builtin(), None);
    };
    let Some((path, member)) = catalog
        .find(nickname, &[MemberKind::Grammar])
        .and_then(|r| Some((catalog.path_of(r)?, catalog.member(r)?.member.clone())))
    else {
        tracing::debug!("no grammar member {nickname}; using the built-in grammar");
        return (GrammarTable::builtin(), None);
    };
    match GrammarTable::load_compressed(&path) {
        Ok(grammar) => {
            tracing::debug!("loaded grammar {} ({} rows)", path.display(), grammar.rows());
            (Arc::new(grammar), Some(member))
        }
        Err(err) => {
            tracing::warn!("grammar {} unusable: {err}; using the built-in grammar", path.display());
            (GrammarTable::builtin(), None)
        }
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> RkResult<Self> {
        Self::with_script(config, Box::new(StandardScript))
    }

    /// Builds an engine using `script` for kana and width conversions.
    pub fn with_script(config: EngineConfig, script: Box<dyn ScriptCodec>) -> RkResult<Self> {
        config.validate()?;
        let mut catalog = Catalog::new();
        for dir in &config.dictionary_path {
            catalog.open_directory(dir)?;
        }
        let (grammar, grammar_member) = load_grammar(&catalog, &config);
        Ok(Self {
            cache: RecordCache::new(config.cache_capacity),
            arena: NodeArena::new(config.node_capacity),
            config,
            catalog,
            grammar,
            grammar_member,
            script,
            mounts: Vec::new(),
            contexts: Vec::new(),
            next_cache_id: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grammar(&self) -> &GrammarTable {
        &self.grammar
    }

    /// Record cache occupancy and live candidate nodes.
    pub fn usage(&self) -> (usize, usize) {
        (self.cache.len(), self.arena.live())
    }

    // ----- contexts -----

    pub fn create_context(&mut self) -> ContextId {
        match self.contexts.iter().position(Option::is_none) {
            Some(cx) => {
                self.contexts[cx] = Some(Context::default());
                cx
            }
            None => {
                self.contexts.push(Some(Context::default()));
                self.contexts.len() - 1
            }
        }
    }

    fn context(&self, cx: ContextId) -> RkResult<&Context> {
        self.contexts
            .get(cx)
            .and_then(Option::as_ref)
            .ok_or_else(|| RkError::invalid(format!("no context {cx}")))
    }

    fn context_mut(&mut self, cx: ContextId) -> RkResult<&mut Context> {
        self.contexts
            .get_mut(cx)
            .and_then(Option::as_mut)
            .ok_or_else(|| RkError::invalid(format!("no context {cx}")))
    }

    /// Abandons any conversion, unmounts every dictionary and frees the
    /// context.
    pub fn close_context(&mut self, cx: ContextId) -> RkResult<()> {
        if self.context(cx)?.session.is_some() {
            self.end_conversion(cx, false)?;
        }
        let mounts = std::mem::take(&mut self.context_mut(cx)?.mounts);
        let mut first_err = None;
        for mid in mounts {
            if let Err(err) = self.release_mount(mid) {
                first_err.get_or_insert(err);
            }
        }
        self.contexts[cx] = None;
        first_err.map_or(Ok(()), Err)
    }

    /// New context mounting the same dictionaries as `cx`.
    pub fn duplicate_context(&mut self, cx: ContextId) -> RkResult<ContextId> {
        let mounts = self.context(cx)?.mounts.clone();
        for &mid in &mounts {
            if let Some(Some(m)) = self.mounts.get_mut(mid) {
                m.users += 1;
            }
        }
        let dup = self.create_context();
        self.contexts[dup] = Some(Context {
            mounts,
            session: None,
        });
        Ok(dup)
    }

    // ----- dictionaries -----

    /// Mounts the dictionary `nickname` into `cx`. A dictionary already
    /// open for another context is shared.
    pub fn mount(&mut self, cx: ContextId, nickname: &str) -> RkResult<()> {
        if self.context(cx)?.session.is_some() {
            return Err(RkError::Busy(format!("context {cx} is converting")));
        }
        let member = self
            .catalog
            .find(nickname, &DICTIONARY_KINDS)
            .ok_or_else(|| RkError::NotFound(format!("dictionary {nickname}")))?;
        let existing = self
            .mounts
            .iter()
            .position(|m| m.as_ref().is_some_and(|m| m.member == member));
        if let Some(mid) = existing {
            if self.context(cx)?.mounts.contains(&mid) {
                return Err(RkError::AlreadyExists(format!("{nickname} is mounted")));
            }
        }
        let mid = match existing {
            Some(mid) => mid,
            None => {
                let cache_id = self.next_cache_id;
                let mount = Mount::open(
                    &mut self.catalog,
                    member,
                    cache_id,
                    &self.config,
                    &self.grammar,
                    self.grammar_member.as_deref(),
                )?;
                self.next_cache_id += 1;
                match self.mounts.iter().position(Option::is_none) {
                    Some(slot) => {
                        self.mounts[slot] = Some(mount);
                        slot
                    }
                    None => {
                        self.mounts.push(Some(mount));
                        self.mounts.len() - 1
                    }
                }
            }
        };
        if let Some(Some(m)) = self.mounts.get_mut(mid) {
            m.users += 1;
        }
        self.context_mut(cx)?.mounts.push(mid);
        Ok(())
    }

    fn release_mount(&mut self, mid: MountId) -> RkResult<()> {
        let Some(Some(m)) = self.mounts.get_mut(mid) else {
            return Ok(());
        };
        m.users = m.users.saturating_sub(1);
        if m.users > 0 {
            return Ok(());
        }
        match self.mounts[mid].take() {
            Some(mount) => mount.close(&mut self.catalog, &mut self.cache),
            None => Ok(()),
        }
    }

    fn context_mount(&self, cx: ContextId, nickname: &str) -> RkResult<MountId> {
        self.context(cx)?
            .mounts
            .iter()
            .copied()
            .find(|&mid| {
                self.mounts
                    .get(mid)
                    .and_then(Option::as_ref)
                    .is_some_and(|m| m.nickname == nickname)
            })
            .ok_or_else(|| RkError::NotFound(format!("{nickname} is not mounted in context {cx}")))
    }

    pub fn unmount(&mut self, cx: ContextId, nickname: &str) -> RkResult<()> {
        if self.context(cx)?.session.is_some() {
            return Err(RkError::Busy(format!("context {cx} is converting")));
        }
        let mid = self.context_mount(cx, nickname)?;
        self.context_mut(cx)?.mounts.retain(|&m| m != mid);
        self.release_mount(mid)
    }

    /// Nicknames mounted in `cx`, in lookup order.
    pub fn mounted_dictionaries(&self, cx: ContextId) -> RkResult<Vec<String>> {
        Ok(self
            .context(cx)?
            .mounts
            .iter()
            .filter_map(|&mid| self.mounts.get(mid).and_then(Option::as_ref))
            .map(|m| m.nickname.clone())
            .collect())
    }

    /// Every catalog member on the dictionary path.
    pub fn list_dictionaries(&self) -> Vec<DictionaryInfo> {
        self.catalog
            .directories()
            .flat_map(|(_, dir)| {
                dir.members().map(move |m| DictionaryInfo {
                    nickname: m.nickname.clone(),
                    kind: m.kind,
                    class: m.class,
                    permission: m.perm,
                    directory: dir.path().to_path_buf(),
                    mounted: m.refs() > 0,
                })
            })
            .collect()
    }

    /// Creates an empty user dictionary in the first writable directory.
    pub fn create_dictionary(&mut self, nickname: &str) -> RkResult<()> {
        if self.catalog.find(nickname, &DICTIONARY_KINDS).is_some() {
            return Err(RkError::AlreadyExists(format!("dictionary {nickname}")));
        }
        let dir = self
            .catalog
            .first_writable()
            .ok_or_else(|| RkError::PermissionDenied("no writable dictionary directory".into()))?;
        let link = format!("{nickname}.ctd");
        let member = format!("{nickname}.usr");
        let path = self
            .catalog
            .directory(dir)
            .map(|d| d.path().join(&link))
            .ok_or_else(|| RkError::NotFound(format!("directory {dir}")))?;
        if path.exists() {
            return Err(RkError::AlreadyExists(path.display().to_string()));
        }
        let r = self
            .catalog
            .create_member(dir, &link, &member, nickname, Permission::READ_WRITE)?;
        if let Err(err) = TemporaryDic::create(&path, &member, Arc::clone(&self.grammar)) {
            if let Err(undo) = self.catalog.remove_member(r) {
                tracing::warn!("catalog entry for {nickname} left behind: {undo}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Removes a dictionary and its learning data. Mounted dictionaries are
    /// busy.
    pub fn remove_dictionary(&mut self, nickname: &str) -> RkResult<()> {
        let r = self
            .catalog
            .find(nickname, &DICTIONARY_KINDS)
            .ok_or_else(|| RkError::NotFound(format!("dictionary {nickname}")))?;
        self.catalog.remove_member(r)?;
        if let Some(fq) = self.catalog.find(nickname, &[MemberKind::Frequency]) {
            self.catalog.remove_member(fq)?;
        }
        Ok(())
    }

    pub fn rename_dictionary(&mut self, nickname: &str, new_nickname: &str) -> RkResult<()> {
        let r = self
            .catalog
            .find(nickname, &DICTIONARY_KINDS)
            .ok_or_else(|| RkError::NotFound(format!("dictionary {nickname}")))?;
        self.catalog.rename_member(r, new_nickname)?;
        if let Some(fq) = self.catalog.find(nickname, &[MemberKind::Frequency]) {
            self.catalog.rename_member(fq, new_nickname)?;
        }
        Ok(())
    }

    pub fn chmod_dictionary(&mut self, nickname: &str, perm: Permission) -> RkResult<()> {
        let r = self
            .catalog
            .find(nickname, &DICTIONARY_KINDS)
            .ok_or_else(|| RkError::NotFound(format!("dictionary {nickname}")))?;
        self.catalog.chmod_member(r, perm)
    }

    /// Changes the permission of a whole dictionary directory on the path.
    /// Members of a read-only directory cannot be created, removed or
    /// renamed.
    pub fn chmod_directory<P: AsRef<Path>>(&mut self, dir: P, perm: Permission) -> RkResult<()> {
        let dir = dir.as_ref();
        let id = self
            .catalog
            .find_directory(dir)
            .ok_or_else(|| RkError::NotFound(format!("{} is not on the dictionary path", dir.display())))?;
        self.catalog.chmod_directory(id, perm)
    }

    /// Writes every modified dictionary and all learning data.
    pub fn sync(&mut self) -> RkResult<()> {
        let mut first_err = None;
        for m in self.mounts.iter_mut().flatten() {
            if let Err(err) = m.sync(&mut self.cache) {
                tracing::warn!("sync of {} failed: {err}", m.nickname);
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Closes every context and writes everything back.
    pub fn close(mut self) -> RkResult<()> {
        let mut first_err = None;
        for cx in 0..self.contexts.len() {
            if self.contexts[cx].is_some() {
                if let Err(err) = self.close_context(cx) {
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ----- words -----

    fn writable_temporary(&mut self, cx: ContextId, nickname: &str) -> RkResult<MountId> {
        let mid = self.context_mount(cx, nickname)?;
        let Some(Some(mount)) = self.mounts.get_mut(mid) else {
            return Err(RkError::NotFound(nickname.to_string()));
        };
        if !mount.writable || mount.backend.is_permanent() {
            return Err(RkError::PermissionDenied(format!("{nickname} is read-only")));
        }
        mount.write_back(&mut self.cache)?;
        Ok(mid)
    }

    /// Adds the words of a dictionary text line (`reading #row spelling
    /// ...`) to a mounted user dictionary. Returns the number of
    /// candidates added.
    pub fn define_word(&mut self, cx: ContextId, nickname: &str, line: &str) -> RkResult<usize> {
        let record = WordRecord::parse_text(line, &self.grammar)?
            .ok_or_else(|| RkError::invalid(format!("no word on {line:?}")))?;
        let mid = self.writable_temporary(cx, nickname)?;
        let Some(Some(mount)) = self.mounts.get_mut(mid) else {
            return Err(RkError::NotFound(nickname.to_string()));
        };
        let Some(temp) = mount.backend.as_temporary_mut() else {
            return Err(RkError::PermissionDenied(format!("{nickname} is read-only")));
        };
        let defined = temp.define(&record)?;
        let key = RecordKey {
            member: mount.cache_id,
            address: defined.address,
        };
        self.cache.replace_record(key, defined.record);
        Ok(defined.added)
    }

    /// Removes the words of a dictionary text line from a mounted user
    /// dictionary. Returns the number of candidates removed.
    pub fn delete_word(&mut self, cx: ContextId, nickname: &str, line: &str) -> RkResult<usize> {
        let record = WordRecord::parse_text(line, &self.grammar)?
            .ok_or_else(|| RkError::invalid(format!("no word on {line:?}")))?;
        let mid = self.writable_temporary(cx, nickname)?;
        let Some(Some(mount)) = self.mounts.get_mut(mid) else {
            return Err(RkError::NotFound(nickname.to_string()));
        };
        let Some(temp) = mount.backend.as_temporary_mut() else {
            return Err(RkError::PermissionDenied(format!("{nickname} is read-only")));
        };
        let deleted = temp.delete(&record)?;
        let key = RecordKey {
            member: mount.cache_id,
            address: deleted.address,
        };
        match deleted.remaining {
            Some(rest) => {
                self.cache.replace_record(key, rest);
            }
            None => {
                // The freed slot is reused by the next new word.
                self.cache.purge_key(key);
                let seq = mount.backend.sequence(deleted.address)?;
                mount.freq.forget(seq);
            }
        }
        Ok(deleted.removed)
    }

    /// The candidates a mounted dictionary holds for exactly `reading`.
    pub fn lookup_word(&mut self, cx: ContextId, nickname: &str, reading: &str) -> RkResult<Option<WordRecord>> {
        let mid = self.context_mount(cx, nickname)?;
        let chars: Vec<char> = reading.chars().collect();
        let Some(Some(mount)) = self.mounts.get_mut(mid) else {
            return Err(RkError::NotFound(nickname.to_string()));
        };
        let found = mount.backend.search(&chars, self.config.search_budget)?;
        let Some(hit) = found.hits.iter().find(|h| h.len == chars.len()) else {
            return Ok(None);
        };
        let (handle, _) = parse::read_word(&mut self.cache, mount, hit.address)?;
        let record = self.cache.record(handle).cloned();
        self.cache.deref(handle);
        Ok(record)
    }

    // ----- conversion -----

    fn parts(&mut self, cx: ContextId) -> RkResult<(&mut Session, Resources<'_>)> {
        let Engine {
            config,
            grammar,
            script,
            cache,
            arena,
            mounts,
            contexts,
            ..
        } = self;
        let session = contexts
            .get_mut(cx)
            .and_then(Option::as_mut)
            .ok_or_else(|| RkError::invalid(format!("no context {cx}")))?
            .session
            .as_mut()
            .ok_or_else(|| RkError::invalid(format!("context {cx} is not converting")))?;
        let res = Resources {
            config,
            grammar: &**grammar,
            script: &**script,
            cache,
            arena,
            mounts,
        };
        Ok((session, res))
    }

    /// Runs `f` on the session of `cx`. A session left inconsistent is
    /// reset and reported as [`RkError::Inconsistent`].
    fn with_session<T>(
        &mut self,
        cx: ContextId,
        f: impl FnOnce(&mut Session, &mut Resources<'_>) -> RkResult<T>,
    ) -> RkResult<T> {
        let (session, mut res) = self.parts(cx)?;
        let out = f(session, &mut res);
        if let Err(err) = session.check_invariants() {
            tracing::error!("context {cx}: {err}; conversion reset");
            debug_assert!(false, "{err}");
            session.release(&mut res);
            if let Some(Some(ctx)) = self.contexts.get_mut(cx) {
                ctx.session = None;
            }
            return Err(err);
        }
        out
    }

    fn session(&self, cx: ContextId) -> RkResult<&Session> {
        self.context(cx)?
            .session
            .as_ref()
            .ok_or_else(|| RkError::invalid(format!("context {cx} is not converting")))
    }

    /// Starts converting `reading`. Returns the number of phrases committed
    /// so far: all of them in [`ConversionMode::Renbun`], the stable ones
    /// in [`ConversionMode::Auto`].
    pub fn begin_conversion(&mut self, cx: ContextId, reading: &str, mode: ConversionMode) -> RkResult<usize> {
        let ctx = self.context_mut(cx)?;
        if ctx.session.is_some() {
            return Err(RkError::Busy(format!("context {cx} is already converting")));
        }
        if mode == ConversionMode::Renbun && reading.is_empty() {
            return Err(RkError::invalid("empty reading"));
        }
        ctx.session = Some(Session::new(mode, ctx.mounts.clone()));
        let text: Vec<char> = reading.chars().collect();
        let started = self.with_session(cx, |s, res| {
            s.subst(res, 0, 0, &text)?;
            if mode == ConversionMode::Renbun {
                s.flush(res);
            } else {
                s.commit(res);
            }
            Ok(s.phrases.len())
        });
        let open = self.context(cx).is_ok_and(|c| c.session.is_some());
        if started.is_err() && open {
            if let Err(err) = self.end_conversion(cx, false) {
                tracing::warn!("context {cx}: abandoning the failed conversion: {err}");
            }
        }
        started
    }

    /// Finishes the conversion, learning from the selections when `learn`
    /// is set.
    pub fn end_conversion(&mut self, cx: ContextId, learn: bool) -> RkResult<()> {
        {
            let (session, mut res) = self.parts(cx)?;
            if learn {
                session.learn(&mut res);
            }
            session.release(&mut res);
        }
        self.context_mut(cx)?.session = None;
        Ok(())
    }

    pub fn phrase_count(&self, cx: ContextId) -> RkResult<usize> {
        Ok(self.session(cx)?.phrases.len())
    }

    pub fn goto_phrase(&mut self, cx: ContextId, index: usize) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.goto(index))
    }

    /// Moves to the previous phrase, wrapping to the last.
    pub fn left(&mut self, cx: ContextId) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.left())
    }

    /// Moves to the next phrase, wrapping to the first.
    pub fn right(&mut self, cx: ContextId) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.right())
    }

    /// Sets the reading length of the current phrase and splits the rest
    /// again. Returns the number of phrases.
    pub fn resize(&mut self, cx: ContextId, len: usize) -> RkResult<usize> {
        self.with_session(cx, |s, res| s.resize(res, len))
    }

    pub fn enlarge(&mut self, cx: ContextId) -> RkResult<usize> {
        let len = self.session(cx)?.phrase()?.len;
        self.resize(cx, len + 1)
    }

    pub fn shorten(&mut self, cx: ContextId) -> RkResult<usize> {
        let len = self.session(cx)?.phrase()?.len;
        self.resize(cx, len.saturating_sub(1))
    }

    pub fn select_candidate(&mut self, cx: ContextId, index: usize) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.select(index))
    }

    pub fn next_candidate(&mut self, cx: ContextId) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.step_candidate(1))
    }

    pub fn prev_candidate(&mut self, cx: ContextId) -> RkResult<usize> {
        self.with_session(cx, |s, _| s.step_candidate(-1))
    }

    /// Selected spelling of the current phrase.
    pub fn current_kanji(&self, cx: ContextId) -> RkResult<String> {
        let phrase = self.session(cx)?.phrase()?;
        Ok(phrase
            .candidates
            .get(phrase.selected)
            .map(|c| c.text.iter().collect())
            .unwrap_or_default())
    }

    pub fn kanji_list(&self, cx: ContextId) -> RkResult<Vec<String>> {
        let phrase = self.session(cx)?.phrase()?;
        Ok(phrase
            .candidates
            .iter()
            .map(|c| c.text.iter().collect())
            .collect())
    }

    pub fn phrase_yomi(&self, cx: ContextId) -> RkResult<String> {
        let session = self.session(cx)?;
        let phrase = session.phrase()?;
        Ok(session.buffer[phrase.offset..phrase.offset + phrase.len]
            .iter()
            .collect())
    }

    pub fn phrase_status(&self, cx: ContextId) -> RkResult<PhraseStatus> {
        let session = self.session(cx)?;
        let phrase = session.phrase()?;
        let chosen = phrase.candidates.get(phrase.selected);
        Ok(PhraseStatus {
            index: session.current,
            offset: phrase.offset,
            reading_len: phrase.len,
            spelling_len: chosen.map_or(0, |c| c.text.len()),
            candidate_count: phrase.candidates.len(),
            selected: phrase.selected,
            word_count: chosen.map_or(0, |c| c.parts.len()),
            user_sized: phrase.user_sized,
        })
    }

    /// Selected spellings of all committed phrases, concatenated.
    pub fn converted_text(&self, cx: ContextId) -> RkResult<String> {
        Ok(self.session(cx)?.converted())
    }

    /// The whole reading of the conversion in progress.
    pub fn reading(&self, cx: ContextId) -> RkResult<String> {
        Ok(self.session(cx)?.buffer.iter().collect())
    }

    /// Replaces reading characters `start..end` with `text` and commits
    /// every phrase that became stable. Only the part of the reading after
    /// the committed phrases may be edited. Returns the number of phrases.
    pub fn subst_yomi(&mut self, cx: ContextId, start: usize, end: usize, text: &str) -> RkResult<usize> {
        let text: Vec<char> = text.chars().collect();
        self.with_session(cx, |s, res| {
            s.subst(res, start, end, &text)?;
            s.commit(res);
            Ok(s.phrases.len())
        })
    }

    /// Commits the rest of the reading. Returns the number of phrases.
    pub fn flush_yomi(&mut self, cx: ContextId) -> RkResult<usize> {
        self.with_session(cx, |s, res| {
            s.flush(res);
            Ok(s.phrases.len())
        })
    }

    /// `true` when no further input can move the phrase boundary at
    /// `offset`.
    pub fn is_stable(&mut self, cx: ContextId, offset: usize) -> RkResult<bool> {
        self.with_session(cx, |s, res| {
            if offset > s.buffer.len() {
                return Err(RkError::invalid(format!(
                    "offset {offset} outside reading of {}",
                    s.buffer.len()
                )));
            }
            Ok(s.is_stable(res, offset))
        })
    }
}
