//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration file:
//!
//! ```
//! use yomi_renbun::EngineConfig;
//! let cfg: EngineConfig = serde_json::from_str(r#"{ "max_phrase_len": 24 }"#).unwrap();
//! assert_eq!(cfg.max_phrase_len, 24);
//! assert_eq!(cfg.search_budget, 16);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RkError, RkResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dictionary directories searched in order when mounting by nickname.
    pub dictionary_path: Vec<PathBuf>,
    /// Nickname of the grammar member; the built-in grammar is used when no
    /// such member exists on the path.
    pub grammar: Option<String>,
    /// Soft capacity of the record cache, in word records.
    pub cache_capacity: usize,
    /// Capacity of the candidate-node arena shared by all sessions.
    pub node_capacity: usize,
    /// Entries kept by each recency table.
    pub recency_capacity: usize,
    /// Entries kept by each phrase-boundary cache.
    pub boundary_capacity: usize,
    /// Longest phrase considered, in reading characters.
    pub max_phrase_len: usize,
    /// Matches returned by one dictionary lookup before the result is marked
    /// as truncated.
    pub search_budget: usize,
    /// Upper bound on the candidate list of one phrase.
    pub max_candidates: usize,
    /// Pages of a permanent dictionary kept in memory.
    pub page_cache_pages: usize,
    /// Synthesize pseudo-words for digit, Latin, katakana and punctuation runs.
    pub literal_words: bool,
    /// Create a frequency member for a mounted permanent dictionary when none
    /// exists yet.
    pub auto_create_frequency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dictionary_path: Vec::new(),
            grammar: Some("grammar".to_string()),
            cache_capacity: 1024,
            node_capacity: 65_536,
            recency_capacity: 512,
            boundary_capacity: 256,
            max_phrase_len: 32,
            search_budget: 16,
            max_candidates: 256,
            page_cache_pages: 64,
            literal_words: true,
            auto_create_frequency: true,
        }
    }
}

impl EngineConfig {
    /// A default configuration searching only `dir`.
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            dictionary_path: vec![dir.into()],
            ..Self::default()
        }
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> RkResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            RkError::ConfigError(format!("Failed to read {}: {}", path.display(), err))
        })?;
        let cfg: EngineConfig = serde_json::from_str(&text).map_err(|err| {
            RkError::ConfigError(format!("Failed to parse {}: {}", path.display(), err))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> RkResult<()> {
        let capacities = [
            ("cache_capacity", self.cache_capacity),
            ("node_capacity", self.node_capacity),
            ("recency_capacity", self.recency_capacity),
            ("boundary_capacity", self.boundary_capacity),
            ("search_budget", self.search_budget),
            ("max_candidates", self.max_candidates),
            ("page_cache_pages", self.page_cache_pages),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(RkError::ConfigError(format!("{name} must be positive")));
            }
        }
        if !(1..=127).contains(&self.max_phrase_len) {
            return Err(RkError::ConfigError(format!(
                "max_phrase_len {} outside 1..=127",
                self.max_phrase_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_capacity_and_long_phrases() {
        let cfg = EngineConfig {
            cache_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RkError::ConfigError(_))));
        let cfg = EngineConfig {
            max_phrase_len: 200,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let cfg = EngineConfig {
            dictionary_path: vec![dir.path().to_path_buf()],
            search_budget: 4,
            ..EngineConfig::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
        assert_eq!(EngineConfig::from_json_file(&path).unwrap(), cfg);
    }
}
