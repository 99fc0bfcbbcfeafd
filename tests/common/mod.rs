//! Dictionary directory shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use yomi_renbun::dictionary_lib::catalog::CATALOG_FILE;
use yomi_renbun::{ContextId, Engine, EngineConfig, GrammarTable, PermanentBuilder, WordRecord};

fn write_member(dir: &Path, link: &str, member: &str, words: &[(&str, &[(&str, &str)])]) {
    let grammar = GrammarTable::builtin();
    let mut builder = PermanentBuilder::new(member);
    for (reading, candidates) in words {
        let candidates: Vec<(&str, u16)> = candidates
            .iter()
            .map(|&(spelling, row)| (spelling, grammar.row_of(row).unwrap()))
            .collect();
        builder
            .add(WordRecord::with_candidates(reading, &candidates))
            .unwrap();
    }
    fs::write(dir.join(link), builder.build().unwrap()).unwrap();
}

/// Writes `iroha` (main words) and `fuzoku` (particles) plus a writable
/// catalog into `dir`.
pub fn populate(dir: &Path) {
    write_member(
        dir,
        "iroha.cbd",
        "iroha.mwd",
        &[
            ("あめ", &[("雨", "#T35"), ("飴", "#T35")]),
            ("きょう", &[("今日", "#T35"), ("京", "#T35")]),
            ("はし", &[("橋", "#T35"), ("箸", "#T35"), ("端", "#T35")]),
            ("はしる", &[("走る", "#T35")]),
        ],
    );
    write_member(
        dir,
        "fuzoku.cbd",
        "fuzoku.swd",
        &[("は", &[("は", "#P")]), ("が", &[("が", "#P")])],
    );
    fs::write(
        dir.join(CATALOG_FILE),
        "#RK-DICS -rw-\n\
         iroha.cbd(iroha.mwd) -iroha--r--\n\
         fuzoku.cbd(fuzoku.swd) -fuzoku--r--\n",
    )
    .unwrap();
}

pub fn engine(dir: &Path) -> Engine {
    Engine::new(EngineConfig::with_directory(dir)).unwrap()
}

/// Engine over `dir` with one context mounting `dictionaries`.
pub fn context(dir: &Path, dictionaries: &[&str]) -> (Engine, ContextId) {
    let mut engine = engine(dir);
    let cx = engine.create_context();
    for nickname in dictionaries {
        engine.mount(cx, nickname).unwrap();
    }
    (engine, cx)
}

/// `(reading, selected spelling)` of every committed phrase.
pub fn phrases(engine: &mut Engine, cx: ContextId) -> Vec<(String, String)> {
    let n = engine.phrase_count(cx).unwrap();
    (0..n)
        .map(|i| {
            engine.goto_phrase(cx, i).unwrap();
            (
                engine.phrase_yomi(cx).unwrap(),
                engine.current_kanji(cx).unwrap(),
            )
        })
        .collect()
}

/// Candidate lists of every committed phrase.
pub fn candidate_lists(engine: &mut Engine, cx: ContextId) -> Vec<Vec<String>> {
    let n = engine.phrase_count(cx).unwrap();
    (0..n)
        .map(|i| {
            engine.goto_phrase(cx, i).unwrap();
            engine.kanji_list(cx).unwrap()
        })
        .collect()
}
