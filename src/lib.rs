//! Dictionary-backed kana-kanji phrase conversion.
//!
//! `yomi-renbun` splits a kana reading into bunsetsu (phrases) and offers
//! ranked kanji spellings for each of them. Readings are looked up in
//! mounted dictionaries:
//!
//! - permanent dictionaries: read-only paged tries built with
//!   [`PermanentBuilder`];
//! - temporary dictionaries: editable text files (`reading #row spelling`);
//! - frequency members: learned candidate order, recency and phrase
//!   boundaries of a permanent dictionary.
//!
//! Dictionaries are found through a `dics.dir` catalog in each directory of
//! [`EngineConfig::dictionary_path`]. A [`GrammarTable`] decides which words
//! may follow each other inside a phrase.
//!
//! ```no_run
//! use yomi_renbun::{ConversionMode, Engine, EngineConfig};
//!
//! # fn main() -> yomi_renbun::RkResult<()> {
//! let mut engine = Engine::new(EngineConfig::with_directory("dic"))?;
//! let cx = engine.create_context();
//! engine.mount(cx, "iroha")?;
//! engine.begin_conversion(cx, "きょうはあめ", ConversionMode::Renbun)?;
//! println!("{}", engine.converted_text(cx)?);
//! engine.end_conversion(cx, true)?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

pub mod char_class;
pub mod config;
pub mod dictionary_lib;
pub mod engine;
pub mod error;
pub mod script;
pub mod utils;

pub use config::EngineConfig;
pub use dictionary_lib::{
    Catalog, GrammarTable, MemberClass, MemberKind, PermanentBuilder, PermanentDic, Permission,
    TemporaryDic, WordRecord,
};
pub use engine::{ContextId, ConversionMode, DictionaryInfo, Engine, PhraseStatus, WordClass};
pub use error::{RkError, RkResult};
pub use script::{ScriptCodec, StandardScript};
