mod common;

use std::fs;

use common::{engine, phrases, populate};
use yomi_renbun::dictionary_lib::catalog::CATALOG_FILE;
use yomi_renbun::{ConversionMode, GrammarTable, PermanentBuilder, RkError, WordRecord};

const STRICT_GRAMMAR: &str = "\
# particles may not follow nouns
rows: #_ #T35 #P
#_   > #T35 #P
#T35 > #_
#P   > #_
";

#[test]
fn grammar_member_replaces_the_builtin_table() {
    let tmp = tempfile::tempdir().unwrap();
    let grammar = GrammarTable::from_source(STRICT_GRAMMAR).unwrap();
    grammar.save_compressed(tmp.path().join("strict.cbp")).unwrap();
    let t35 = grammar.row_of("#T35").unwrap();
    let p = grammar.row_of("#P").unwrap();

    let mut main = PermanentBuilder::new("words.mwd").grammar("strict.gram");
    main.add(WordRecord::with_candidates("きょう", &[("今日", t35)]))
        .unwrap();
    fs::write(tmp.path().join("words.cbd"), main.build().unwrap()).unwrap();
    let mut sub = PermanentBuilder::new("words.swd");
    sub.add(WordRecord::with_candidates("は", &[("は", p)])).unwrap();
    fs::write(tmp.path().join("particles.cbd"), sub.build().unwrap()).unwrap();
    fs::write(
        tmp.path().join(CATALOG_FILE),
        "#RK-DICS -rw-\n\
         strict.cbp(strict.gram) -grammar--r--\n\
         words.cbd(words.mwd) -words--r--\n\
         particles.cbd(words.swd) -particles--r--\n",
    )
    .unwrap();

    let mut engine = engine(tmp.path());
    assert_eq!(engine.grammar().rows(), 3);
    let cx = engine.create_context();
    engine.mount(cx, "words").unwrap();
    engine.mount(cx, "particles").unwrap();
    engine
        .begin_conversion(cx, "きょうは", ConversionMode::Renbun)
        .unwrap();
    let got = phrases(&mut engine, cx);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0], ("きょう".to_string(), "今日".to_string()));
    assert_eq!(got[1].0, "は");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn dictionary_for_another_grammar_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let grammar = GrammarTable::from_source(STRICT_GRAMMAR).unwrap();
    grammar.save_compressed(tmp.path().join("strict.cbp")).unwrap();
    let t35 = grammar.row_of("#T35").unwrap();
    for (link, member, declared) in [
        ("strict.cbd", "strict.mwd", "strict.gram"),
        ("stray.cbd", "stray.mwd", "lost.gram"),
    ] {
        let mut builder = PermanentBuilder::new(member).grammar(declared);
        builder
            .add(WordRecord::with_candidates("そら", &[("空", t35)]))
            .unwrap();
        fs::write(tmp.path().join(link), builder.build().unwrap()).unwrap();
    }
    let mut catalog = fs::read_to_string(tmp.path().join(CATALOG_FILE)).unwrap();
    catalog.push_str(
        "strict.cbp(strict.gram) -strict--r--
         strict.cbd(strict.mwd) -sky--r--
         stray.cbd(stray.mwd) -stray--r--
",
    );
    fs::write(tmp.path().join(CATALOG_FILE), catalog).unwrap();

    // No member is nicknamed "grammar", so the built-in table is loaded.
    let mut engine = engine(tmp.path());
    let cx = engine.create_context();
    assert!(matches!(
        engine.mount(cx, "sky"),
        Err(RkError::InvalidArgument(_))
    ));
    assert!(engine.mounted_dictionaries(cx).unwrap().is_empty());
    assert!(engine.list_dictionaries().iter().all(|d| !d.mounted));
    // A grammar that is nowhere on the path cannot be checked.
    engine.mount(cx, "stray").unwrap();
    engine.mount(cx, "iroha").unwrap();
}

#[test]
fn corrupt_dictionary_does_not_mount() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    fs::write(tmp.path().join("fuzoku.cbd"), b"not a dictionary").unwrap();

    let mut engine = engine(tmp.path());
    let cx = engine.create_context();
    assert!(matches!(
        engine.mount(cx, "fuzoku"),
        Err(RkError::ParseError(_)) | Err(RkError::IoError(_))
    ));
    engine.mount(cx, "iroha").unwrap();
    assert_eq!(engine.mounted_dictionaries(cx).unwrap(), vec!["iroha"]);
    engine
        .begin_conversion(cx, "あめ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.current_kanji(cx).unwrap(), "雨");
    engine.end_conversion(cx, false).unwrap();
}

#[test]
fn missing_directory_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let config = yomi_renbun::EngineConfig::with_directory(tmp.path().join("absent"));
    assert!(matches!(
        yomi_renbun::Engine::new(config),
        Err(RkError::NotFound(_))
    ));
}
