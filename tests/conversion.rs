mod common;

use common::{candidate_lists, context, phrases, populate};
use yomi_renbun::{ConversionMode, Engine, EngineConfig, RkError};

fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|&(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn whole_reading_becomes_one_phrase() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);

    let n = engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(n, 1);
    let status = engine.phrase_status(cx).unwrap();
    assert_eq!(status.reading_len, 2);
    assert_eq!(status.selected, 0);
    assert_eq!(engine.current_kanji(cx).unwrap(), "雨");
    assert_eq!(engine.kanji_list(cx).unwrap()[1], "飴");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn selection_is_learned() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);

    engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.select_candidate(cx, 1).unwrap(), 1);
    assert_eq!(engine.current_kanji(cx).unwrap(), "飴");
    engine.end_conversion(cx, true).unwrap();

    engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.current_kanji(cx).unwrap(), "飴");
    assert_eq!(engine.kanji_list(cx).unwrap()[1], "雨");
    engine.end_conversion(cx, false).unwrap();
    engine.close().unwrap();

    // The order survives in the frequency member.
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);
    engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.current_kanji(cx).unwrap(), "飴");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn ending_without_learning_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    engine
        .begin_conversion(cx, "きょうははしる", ConversionMode::Renbun)
        .unwrap();
    let first = candidate_lists(&mut engine, cx);
    engine.goto_phrase(cx, 0).unwrap();
    engine.next_candidate(cx).unwrap();
    engine.end_conversion(cx, false).unwrap();

    engine
        .begin_conversion(cx, "きょうははしる", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(candidate_lists(&mut engine, cx), first);
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn particles_attach_to_the_preceding_word() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    engine
        .begin_conversion(cx, "きょうはあめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(
        phrases(&mut engine, cx),
        owned(&[("きょうは", "今日は"), ("あめ", "雨")])
    );
    assert_eq!(engine.converted_text(cx).unwrap(), "今日は雨");
    assert_eq!(engine.reading(cx).unwrap(), "きょうはあめ");
    engine.goto_phrase(cx, 0).unwrap();
    assert_eq!(engine.phrase_status(cx).unwrap().word_count, 2);
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn resized_boundary_is_learned() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    engine
        .begin_conversion(cx, "きょうはあめ", ConversionMode::Renbun)
        .unwrap();
    engine.goto_phrase(cx, 0).unwrap();
    assert_eq!(engine.shorten(cx).unwrap(), 3);
    assert_eq!(
        phrases(&mut engine, cx),
        owned(&[("きょう", "今日"), ("は", "は"), ("あめ", "雨")])
    );
    engine.end_conversion(cx, true).unwrap();

    engine
        .begin_conversion(cx, "きょうはあめ", ConversionMode::Renbun)
        .unwrap();
    engine.goto_phrase(cx, 0).unwrap();
    assert_eq!(engine.phrase_yomi(cx).unwrap(), "きょう");
    assert!(!engine.phrase_status(cx).unwrap().user_sized);
    engine.goto_phrase(cx, 0).unwrap();
    assert_eq!(engine.enlarge(cx).unwrap(), 2);
    assert_eq!(engine.phrase_yomi(cx).unwrap(), "きょうは");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn stable_boundary_never_moves() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    assert_eq!(
        engine.begin_conversion(cx, "", ConversionMode::Auto).unwrap(),
        0
    );
    let typed: Vec<char> = "あめきょうは。".chars().collect();
    let mut first_phrase = None;
    for (i, &c) in typed.iter().enumerate() {
        let committed = engine
            .subst_yomi(cx, i, i, &c.to_string())
            .unwrap();
        let stable = engine.is_stable(cx, 0).unwrap();
        if first_phrase.is_some() {
            assert!(stable, "offset 0 became unstable after {}", i + 1);
        }
        if stable {
            assert!(committed >= 1);
            engine.goto_phrase(cx, 0).unwrap();
            let status = engine.phrase_status(cx).unwrap();
            let seen = (status.offset, status.reading_len);
            assert_eq!(*first_phrase.get_or_insert(seen), seen);
        } else {
            assert_eq!(committed, 0);
        }
    }
    // Only the final punctuation rules out a longer second phrase.
    assert_eq!(first_phrase, Some((0, 2)));
    assert!(!engine.is_stable(cx, 2).unwrap());
    assert_eq!(engine.phrase_count(cx).unwrap(), 1);

    assert_eq!(engine.flush_yomi(cx).unwrap(), 3);
    assert_eq!(
        phrases(&mut engine, cx),
        owned(&[("あめ", "雨"), ("きょうは", "今日は"), ("。", "。")])
    );
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn committed_reading_cannot_be_edited() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    engine
        .begin_conversion(cx, "あめきょうは。", ConversionMode::Auto)
        .unwrap();
    assert_eq!(engine.phrase_count(cx).unwrap(), 1);
    assert!(matches!(
        engine.subst_yomi(cx, 1, 2, "x"),
        Err(RkError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.subst_yomi(cx, 5, 4, ""),
        Err(RkError::InvalidArgument(_))
    ));
    // Replacing the uncommitted tail is fine.
    assert_eq!(engine.subst_yomi(cx, 2, 7, "はし").unwrap(), 1);
    assert_eq!(engine.reading(cx).unwrap(), "あめはし");
    engine.flush_yomi(cx).unwrap();
    assert_eq!(engine.converted_text(cx).unwrap(), "雨橋");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn renbun_rejects_an_empty_reading() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);
    assert!(matches!(
        engine.begin_conversion(cx, "", ConversionMode::Renbun),
        Err(RkError::InvalidArgument(_))
    ));
    // The failed start leaves the context idle.
    engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn navigation_wraps_around_the_phrases() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha", "fuzoku"]);

    engine
        .begin_conversion(cx, "あめきょうは。", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.phrase_count(cx).unwrap(), 3);
    engine.goto_phrase(cx, 0).unwrap();
    assert_eq!(engine.left(cx).unwrap(), 2);
    assert_eq!(engine.phrase_yomi(cx).unwrap(), "。");
    assert_eq!(engine.left(cx).unwrap(), 1);
    assert_eq!(engine.phrase_yomi(cx).unwrap(), "きょうは");
    assert_eq!(engine.right(cx).unwrap(), 2);
    assert_eq!(engine.right(cx).unwrap(), 0);
    assert_eq!(engine.phrase_yomi(cx).unwrap(), "あめ");
    assert_eq!(engine.right(cx).unwrap(), 1);
    assert!(matches!(
        engine.goto_phrase(cx, 3),
        Err(RkError::InvalidArgument(_))
    ));
    assert_eq!(engine.phrase_status(cx).unwrap().index, 1);
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn out_of_range_selection_keeps_the_current_candidate() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);

    engine
        .begin_conversion(cx, "はし", ConversionMode::Renbun)
        .unwrap();
    let count = engine.kanji_list(cx).unwrap().len();
    assert_eq!(engine.phrase_status(cx).unwrap().candidate_count, count);
    engine.select_candidate(cx, 2).unwrap();
    assert!(matches!(
        engine.select_candidate(cx, count),
        Err(RkError::InvalidArgument(_))
    ));
    assert_eq!(engine.phrase_status(cx).unwrap().selected, 2);
    assert_eq!(engine.current_kanji(cx).unwrap(), "端");
    assert_eq!(engine.select_candidate(cx, count - 1).unwrap(), count - 1);
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn exhausted_node_arena_falls_back_to_kana() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let config = EngineConfig {
        node_capacity: 1,
        ..EngineConfig::with_directory(tmp.path())
    };
    let mut engine = Engine::new(config).unwrap();
    let cx = engine.create_context();
    engine.mount(cx, "iroha").unwrap();
    engine.mount(cx, "fuzoku").unwrap();

    let reading = "きょうはあめ";
    let n = engine
        .begin_conversion(cx, reading, ConversionMode::Renbun)
        .unwrap();
    assert!(n >= 1);
    let mut covered = String::new();
    for i in 0..n {
        engine.goto_phrase(cx, i).unwrap();
        let yomi = engine.phrase_yomi(cx).unwrap();
        assert!(engine.kanji_list(cx).unwrap().contains(&yomi));
        covered.push_str(&yomi);
    }
    assert_eq!(covered, reading);
    assert_eq!(engine.reading(cx).unwrap(), reading);
    engine.end_conversion(cx, false).unwrap();
    assert_eq!(engine.usage().1, 0);
}
