// json_io.rs (CLI only)
use serde::{Deserialize, Serialize};
use yomi_renbun::dictionary_lib::Candidate;
use yomi_renbun::{GrammarTable, RkError, RkResult, WordRecord};

/// One candidate with its grammar row spelled out by name, so JSON dumps
/// stay readable and survive row renumbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSerde {
    pub spelling: String,
    pub row: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSerde {
    pub reading: String,
    pub candidates: Vec<CandidateSerde>,
    // ordinal inside the dumped dictionary; ignored on input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
}

impl RecordSerde {
    pub fn from_record(record: &WordRecord, grammar: &GrammarTable, ordinal: Option<u32>) -> Self {
        Self {
            reading: record.reading_string(),
            candidates: record
                .candidates
                .iter()
                .map(|c| CandidateSerde {
                    spelling: c.spelling_string(),
                    row: grammar.row_name(c.row).into_owned(),
                })
                .collect(),
            ordinal,
        }
    }

    pub fn into_internal(self, grammar: &GrammarTable) -> RkResult<WordRecord> {
        let mut record = WordRecord::new(&self.reading);
        for c in self.candidates {
            let row = grammar.parse_row_token(&c.row).ok_or_else(|| {
                RkError::ParseError(format!("{}: unknown grammar row {}", self.reading, c.row))
            })?;
            record.candidates.push(Candidate::new(&c.spelling, row));
        }
        Ok(record)
    }
}
