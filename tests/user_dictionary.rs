mod common;

use std::fs;

use common::{context, engine, populate};
use yomi_renbun::{ConversionMode, MemberKind, Permission, RkError};

#[test]
fn defined_word_is_converted_until_deleted() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let mut engine = engine(tmp.path());
    engine.create_dictionary("mine").unwrap();
    let cx = engine.create_context();
    engine.mount(cx, "iroha").unwrap();
    engine.mount(cx, "mine").unwrap();

    assert_eq!(engine.define_word(cx, "mine", "ねこ #T35 猫").unwrap(), 1);
    // Defining the same spelling twice adds nothing.
    assert_eq!(engine.define_word(cx, "mine", "ねこ #T35 猫").unwrap(), 0);
    engine
        .begin_conversion(cx, "ねこ", ConversionMode::Renbun)
        .unwrap();
    assert_eq!(engine.current_kanji(cx).unwrap(), "猫");
    engine.end_conversion(cx, false).unwrap();
    engine.sync().unwrap();
    let text = fs::read_to_string(tmp.path().join("mine.ctd")).unwrap();
    assert!(text.lines().any(|l| l == "ねこ #T35 猫"));

    assert_eq!(engine.delete_word(cx, "mine", "ねこ #T35 猫").unwrap(), 1);
    engine
        .begin_conversion(cx, "ねこ", ConversionMode::Renbun)
        .unwrap();
    assert!(!engine.kanji_list(cx).unwrap().contains(&"猫".to_string()));
    engine.end_conversion(cx, false).unwrap();
    assert!(matches!(
        engine.delete_word(cx, "mine", "ねこ #T35 猫"),
        Err(RkError::NotFound(_))
    ));
    engine.close().unwrap();

    let text = fs::read_to_string(tmp.path().join("mine.ctd")).unwrap();
    assert!(!text.contains('猫'));
}

#[test]
fn reopened_dictionary_keeps_merged_candidates() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    {
        let mut engine = engine(tmp.path());
        engine.create_dictionary("mine").unwrap();
        let cx = engine.create_context();
        engine.mount(cx, "mine").unwrap();
        engine.define_word(cx, "mine", "あめ #T35 雨 天").unwrap();
        engine.define_word(cx, "mine", "あめ #T35 飴").unwrap();
        engine.define_word(cx, "mine", "そら #T35 空").unwrap();
        engine.define_word(cx, "mine", "うみ #T35 海").unwrap();
        engine.delete_word(cx, "mine", "あめ #T35 天").unwrap();
        engine.delete_word(cx, "mine", "うみ #T35 海").unwrap();
        engine.close().unwrap();
    }

    let (mut engine, cx) = context(tmp.path(), &["mine"]);
    let ame = engine.lookup_word(cx, "mine", "あめ").unwrap().unwrap();
    let spellings: Vec<String> = ame
        .candidates
        .iter()
        .map(|c| c.spelling_string())
        .collect();
    assert_eq!(spellings, vec!["雨", "飴"]);
    assert!(engine.lookup_word(cx, "mine", "そら").unwrap().is_some());
    assert!(engine.lookup_word(cx, "mine", "うみ").unwrap().is_none());
    assert!(engine.lookup_word(cx, "mine", "あ").unwrap().is_none());
}

#[test]
fn selection_reorders_a_user_dictionary() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let mut engine = engine(tmp.path());
    engine.create_dictionary("mine").unwrap();
    let cx = engine.create_context();
    engine.mount(cx, "mine").unwrap();
    engine.define_word(cx, "mine", "そら #T35 空 宙").unwrap();

    engine
        .begin_conversion(cx, "そら", ConversionMode::Renbun)
        .unwrap();
    engine.select_candidate(cx, 1).unwrap();
    engine.end_conversion(cx, true).unwrap();
    engine.close().unwrap();

    let text = fs::read_to_string(tmp.path().join("mine.ctd")).unwrap();
    assert!(text.lines().any(|l| l == "そら #T35 宙 空"));
}

#[test]
fn permanent_dictionaries_are_read_only() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let (mut engine, cx) = context(tmp.path(), &["iroha"]);
    assert!(matches!(
        engine.define_word(cx, "iroha", "ねこ #T35 猫"),
        Err(RkError::PermissionDenied(_))
    ));
    assert!(matches!(
        engine.define_word(cx, "absent", "ねこ #T35 猫"),
        Err(RkError::NotFound(_))
    ));
    let record = engine.lookup_word(cx, "iroha", "はし").unwrap().unwrap();
    assert_eq!(record.candidates.len(), 3);
}

#[test]
fn dictionaries_are_managed_through_the_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let mut engine = engine(tmp.path());

    engine.create_dictionary("mine").unwrap();
    assert!(matches!(
        engine.create_dictionary("mine"),
        Err(RkError::AlreadyExists(_))
    ));
    let catalog = fs::read_to_string(tmp.path().join("dics.dir")).unwrap();
    assert!(catalog.lines().any(|l| l == "mine.ctd(mine.usr) -mine--rw-"));

    let listed = engine.list_dictionaries();
    let mine = listed.iter().find(|d| d.nickname == "mine").unwrap();
    assert_eq!(mine.kind, MemberKind::Temporary);
    assert_eq!(mine.permission, Permission::READ_WRITE);
    assert!(!mine.mounted);

    let cx = engine.create_context();
    engine.mount(cx, "mine").unwrap();
    assert!(matches!(
        engine.remove_dictionary("mine"),
        Err(RkError::Busy(_))
    ));
    engine.unmount(cx, "mine").unwrap();

    engine.rename_dictionary("mine", "ours").unwrap();
    assert!(matches!(engine.mount(cx, "mine"), Err(RkError::NotFound(_))));
    engine.chmod_dictionary("ours", Permission::READ_ONLY).unwrap();
    engine.mount(cx, "ours").unwrap();
    assert!(matches!(
        engine.define_word(cx, "ours", "ねこ #T35 猫"),
        Err(RkError::PermissionDenied(_))
    ));
    engine.unmount(cx, "ours").unwrap();

    engine.remove_dictionary("ours").unwrap();
    assert!(!tmp.path().join("mine.ctd").exists());
    let catalog = fs::read_to_string(tmp.path().join("dics.dir")).unwrap();
    assert!(!catalog.contains("ours"));
    assert!(catalog.contains("iroha.cbd(iroha.mwd)"));
}

#[test]
fn directory_permission_guards_new_dictionaries() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());
    let mut engine = engine(tmp.path());

    engine
        .chmod_directory(tmp.path(), Permission::READ_ONLY)
        .unwrap();
    let catalog = fs::read_to_string(tmp.path().join("dics.dir")).unwrap();
    assert!(catalog.starts_with("#RK-DICS -r--\n"));
    assert!(matches!(
        engine.create_dictionary("mine"),
        Err(RkError::PermissionDenied(_))
    ));
    assert!(matches!(
        engine.chmod_directory(tmp.path().join("absent"), Permission::READ_WRITE),
        Err(RkError::NotFound(_))
    ));

    // The permission is read back from the catalog.
    let mut reopened = common::engine(tmp.path());
    assert!(matches!(
        reopened.create_dictionary("mine"),
        Err(RkError::PermissionDenied(_))
    ));
    reopened
        .chmod_directory(tmp.path(), Permission::READ_WRITE)
        .unwrap();
    reopened.create_dictionary("mine").unwrap();
    assert!(tmp.path().join("mine.ctd").exists());
}

#[test]
fn emptied_directory_still_takes_new_dictionaries() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(tmp.path());
    engine.create_dictionary("mine").unwrap();
    engine.remove_dictionary("mine").unwrap();
    assert!(engine.list_dictionaries().is_empty());
    let catalog = fs::read_to_string(tmp.path().join("dics.dir")).unwrap();
    assert_eq!(catalog, "#RK-DICS -rw-\n");

    engine.create_dictionary("again").unwrap();
    let info = engine.list_dictionaries();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].nickname, "again");
    assert_eq!(info[0].kind, MemberKind::Temporary);
}
