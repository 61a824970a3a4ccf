use std::fs;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use themesync_core::{ContentKind, ContentStore, NewItem, SqliteStore, TEMPLATE_BASE_SET};
use themesync_engine::{export, ErrorClass, ExportMode, SyncError, WriteResult};

fn store_with_dark() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("store");
    let dark = store
        .create_set(ContentKind::Template, "Dark")
        .expect("create set");
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(TEMPLATE_BASE_SET, "header", "<A/>").with_group("layout"),
        )
        .expect("base header");
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(TEMPLATE_BASE_SET, "footer", "<F/>").with_group("layout"),
        )
        .expect("base footer");
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(dark.id, "footer", "<dark-F/>"),
        )
        .expect("dark footer");
    store
}

#[test]
fn export_writes_resolved_templates_under_group_dirs() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    let stats = export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::Write)
        .expect("export");

    root.child("template_sets/Dark/layout/header.html")
        .assert(predicate::str::diff("<A/>"));
    root.child("template_sets/Dark/layout/footer.html")
        .assert(predicate::str::diff("<dark-F/>"));
    assert_eq!(stats.written_count(), 2);
    assert_eq!(stats.groups, Some(vec!["layout".to_string()]));
}

#[test]
fn second_export_touches_nothing() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::Write)
        .expect("first export");
    let again = export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::Write)
        .expect("second export");

    assert_eq!(again.written_count(), 0);
    assert_eq!(again.unchanged_count(), 2);
}

#[test]
fn dry_run_reports_without_writing() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    let stats = export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::DryRun)
        .expect("dry run");

    assert!(stats
        .writes
        .iter()
        .all(|w| matches!(w, WriteResult::WouldWrite { .. })));
    root.child("template_sets").assert(predicate::path::missing());
}

#[test]
fn stylesheets_land_directly_under_theme_dir() {
    let root = TempDir::new().expect("root");
    let store = SqliteStore::in_memory().expect("store");
    let theme = store
        .create_set(ContentKind::Stylesheet, "Dark")
        .expect("theme");
    store
        .insert_item(
            ContentKind::Stylesheet,
            &NewItem::new(theme.id, "global", "body{color:#000}"),
        )
        .expect("stylesheet");

    let stats = export(&store, root.path(), ContentKind::Stylesheet, "Dark", ExportMode::Write)
        .expect("export");

    root.child("styles/Dark/global.css")
        .assert(predicate::str::diff("body{color:#000}"));
    assert!(stats.groups.is_none());
}

#[test]
fn unknown_set_is_a_client_error() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    let err = export(&store, root.path(), ContentKind::Template, "Missing", ExportMode::Write)
        .expect_err("unknown set");
    assert!(matches!(err, SyncError::UnknownSet { .. }), "got: {err}");
    assert_eq!(err.class(), ErrorClass::Client);
}

#[test]
fn failed_write_reports_completed_files() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    // footer sorts before header; a directory squatting on header's path
    // makes the second write fail.
    let blocker = root.child("template_sets/Dark/layout/header.html");
    fs::create_dir_all(blocker.path()).expect("blocker dir");

    let err = export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::Write)
        .expect_err("write should fail");

    match &err {
        SyncError::PartialExport {
            completed, failed, ..
        } => {
            assert_eq!(completed.len(), 1);
            assert!(completed[0].path().ends_with("footer.html"));
            assert_eq!(failed, blocker.path());
        }
        other => panic!("expected PartialExport, got {other}"),
    }
    assert_eq!(err.class(), ErrorClass::TransientIo);
    root.child("template_sets/Dark/layout/footer.html")
        .assert(predicate::path::is_file());
}

#[test]
fn non_utf8_target_is_overwritten_with_store_content() {
    let root = TempDir::new().expect("root");
    let store = store_with_dark();

    let header = root.child("template_sets/Dark/layout/header.html");
    fs::create_dir_all(header.path().parent().expect("parent")).expect("mkdir");
    header.write_binary(&[0xff, 0xfe, 0x00, 0x41]).expect("corrupt file");

    let stats = export(&store, root.path(), ContentKind::Template, "Dark", ExportMode::Write)
        .expect("export");

    assert_eq!(stats.written_count(), 2);
    header.assert(predicate::str::diff("<A/>"));
    root.child("template_sets/Dark/layout/footer.html")
        .assert(predicate::str::diff("<dark-F/>"));
}
