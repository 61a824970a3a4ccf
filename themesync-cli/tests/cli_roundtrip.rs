use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use themesync_core::{ContentKind, ContentStore, NewItem, SqliteStore, TEMPLATE_BASE_SET};

fn themesync_cmd(workspace: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("themesync"));
    cmd.env_remove("SYNC_ROOT")
        .env_remove("SYNC_DATABASE")
        .env_remove("AUTO_START")
        .env_remove("CACHE_SIGNAL_TOKEN")
        .env("SYNC_ROOT", workspace.join("sync"))
        .env("SYNC_DATABASE", workspace.join("themesync.db"));
    cmd
}

fn seed(workspace: &Path) -> SqliteStore {
    let store = SqliteStore::open(workspace.join("themesync.db")).expect("open db");
    store
        .create_set(ContentKind::Template, "Dark")
        .expect("template set");
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(TEMPLATE_BASE_SET, "header", "<A/>"),
        )
        .expect("base header");
    store
}

#[test]
fn dry_run_export_writes_nothing() {
    let workspace = TempDir::new().expect("workspace");
    seed(workspace.path());

    themesync_cmd(workspace.path())
        .args(["export", "template", "Dark", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("header.html"));

    assert!(!workspace
        .path()
        .join("sync/template_sets/Dark/ungrouped/header.html")
        .exists());
}

#[test]
fn export_diff_import_round_trip() {
    let workspace = TempDir::new().expect("workspace");
    let store = seed(workspace.path());

    themesync_cmd(workspace.path())
        .args(["export", "template", "Dark"])
        .assert()
        .success()
        .stdout(contains("1 written"));

    let file = workspace
        .path()
        .join("sync/template_sets/Dark/ungrouped/header.html");
    assert_eq!(fs::read_to_string(&file).expect("read"), "<A/>");

    themesync_cmd(workspace.path())
        .args(["diff", "template", "Dark"])
        .assert()
        .success()
        .stdout(contains("No differences"));

    fs::write(&file, "<B/>").expect("edit");

    themesync_cmd(workspace.path())
        .args(["diff", "template", "Dark"])
        .assert()
        .success()
        .stdout(contains("-<B/>"))
        .stdout(contains("+<A/>"));

    themesync_cmd(workspace.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("new override"));

    let dark = store
        .find_set(ContentKind::Template, "Dark")
        .expect("lookup")
        .expect("set");
    let row = store
        .find_item(ContentKind::Template, dark.id, "header")
        .expect("lookup")
        .expect("override");
    assert_eq!(row.body, "<B/>");

    themesync_cmd(workspace.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("already up to date"));
}

#[test]
fn unknown_set_fails_with_message() {
    let workspace = TempDir::new().expect("workspace");
    seed(workspace.path());

    themesync_cmd(workspace.path())
        .args(["export", "stylesheet", "Missing"])
        .assert()
        .failure()
        .stderr(contains("Missing"));
}

#[test]
fn root_flag_overrides_environment() {
    let workspace = TempDir::new().expect("workspace");
    seed(workspace.path());
    let elsewhere = workspace.path().join("elsewhere");

    themesync_cmd(workspace.path())
        .arg("--root")
        .arg(&elsewhere)
        .args(["export", "template", "--all"])
        .assert()
        .success();

    assert!(elsewhere
        .join("template_sets/Dark/ungrouped/header.html")
        .exists());
    assert!(!workspace.path().join("sync/template_sets").exists());
}

#[test]
fn status_reports_daemon_not_running() {
    let workspace = TempDir::new().expect("workspace");

    themesync_cmd(workspace.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""running": false"#));

    themesync_cmd(workspace.path())
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn failed_export_lists_files_already_written() {
    let workspace = TempDir::new().expect("workspace");
    let store = seed(workspace.path());
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(TEMPLATE_BASE_SET, "footer", "<F/>"),
        )
        .expect("base footer");
    let group = workspace.path().join("sync/template_sets/Dark/ungrouped");
    fs::create_dir_all(group.join("header.html")).expect("blocker");

    themesync_cmd(workspace.path())
        .args(["export", "template", "Dark"])
        .assert()
        .failure()
        .stdout(contains("footer.html (written before the failure)"))
        .stderr(contains("export failed"));
}
