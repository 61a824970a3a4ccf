use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use themesync_core::{
    ContentKind, ContentStore, NewItem, SqliteStore, STYLESHEET_BASE_THEME, TEMPLATE_BASE_SET,
};
use themesync_daemon::SyncService;
use themesync_engine::{CacheEvent, ChannelSignal, ExportMode};
use tokio::sync::mpsc::UnboundedReceiver;

/// Quiet period long enough for late watcher events to arrive and be judged.
const SETTLE: Duration = Duration::from_millis(1500);

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn drain_events(rx: &mut UnboundedReceiver<CacheEvent>) -> Vec<CacheEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct Fixture {
    _tmp: TempDir,
    store: SqliteStore,
    service: SyncService,
    events: UnboundedReceiver<CacheEvent>,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().expect("tmp");
    let store = SqliteStore::open(tmp.path().join("themesync.db")).expect("store");
    store
        .create_set(ContentKind::Template, "Dark")
        .expect("template set");
    store
        .create_set(ContentKind::Stylesheet, "Dark")
        .expect("theme");
    store
        .insert_item(
            ContentKind::Template,
            &NewItem::new(TEMPLATE_BASE_SET, "header", "<A/>"),
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
            ContentKind::Stylesheet,
            &NewItem::new(STYLESHEET_BASE_THEME, "global", "body{}"),
        )
        .expect("base stylesheet");

    let (signal, events) = ChannelSignal::channel();
    let service = SyncService::new(
        tmp.path().join("sync"),
        Arc::new(store.clone()),
        Arc::new(signal),
    )
    .expect("service");

    Fixture {
        _tmp: tmp,
        store,
        service,
        events,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn export_with_watcher_running_imports_nothing() {
    let mut fx = fixture();
    fx.service.start().expect("start");

    let stats = fx
        .service
        .export_all(ContentKind::Template, ExportMode::Write)
        .await
        .expect("export");
    assert_eq!(stats[0].written_count(), 2);

    tokio::time::sleep(SETTLE).await;

    assert!(
        drain_events(&mut fx.events).is_empty(),
        "exported files must not come back as imports"
    );
    let dark = fx
        .store
        .find_set(ContentKind::Template, "Dark")
        .expect("lookup")
        .expect("set");
    assert!(
        fx.store
            .items_in_set(ContentKind::Template, dark.id)
            .expect("rows")
            .is_empty(),
        "inherited items must not be materialized as overrides"
    );
    assert_eq!(fx.service.status().imports_applied, 0);
    fx.service.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edit_round_trips_through_watcher() {
    let mut fx = fixture();
    fx.service.start().expect("start");

    fx.service
        .export(ContentKind::Template, "Dark", ExportMode::Write)
        .await
        .expect("export");
    let file = fx
        .service
        .root()
        .join("template_sets/Dark/ungrouped/header.html");
    assert_eq!(fs::read_to_string(&file).expect("read"), "<A/>");
    tokio::time::sleep(SETTLE).await;

    fs::write(&file, "<B/>").expect("edit");

    let mut received = Vec::new();
    let arrived = wait_until(Duration::from_secs(10), || {
        received.extend(drain_events(&mut fx.events));
        !received.is_empty()
    })
    .await;
    assert!(arrived, "edit was not imported in time");
    assert_eq!(
        received[0],
        CacheEvent {
            kind: ContentKind::Template,
            set_name: "Dark".to_string(),
            item_name: "header".to_string(),
        }
    );

    let dark = fx
        .store
        .find_set(ContentKind::Template, "Dark")
        .expect("lookup")
        .expect("set");
    let row = fx
        .store
        .find_item(ContentKind::Template, dark.id, "header")
        .expect("lookup")
        .expect("override row");
    assert_eq!(row.body, "<B/>");
    let base = fx
        .store
        .find_item(ContentKind::Template, TEMPLATE_BASE_SET, "header")
        .expect("lookup")
        .expect("base row");
    assert_eq!(base.body, "<A/>");

    let again = fx
        .service
        .export(ContentKind::Template, "Dark", ExportMode::Write)
        .await
        .expect("re-export");
    assert_eq!(again.written_count(), 0, "file already holds <B/>");
    assert_eq!(fs::read_to_string(&file).expect("read"), "<B/>");
    fx.service.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn noise_files_are_never_imported() {
    let mut fx = fixture();
    fx.service.start().expect("start");

    let theme_dir = fx.service.root().join("styles/Dark");
    fs::create_dir_all(&theme_dir).expect("mkdir");
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(theme_dir.join(".forms.css.swp"), "x").expect("swap");
    fs::write(theme_dir.join("forms.css~"), "x").expect("backup");
    fs::write(theme_dir.join("forms.css.tmp"), "x").expect("scratch");
    fs::write(theme_dir.join("empty.css"), "").expect("empty");
    fs::write(theme_dir.join("readme.txt"), "x").expect("unrecognized");
    fs::write(theme_dir.join("forms.css"), "form{}").expect("real edit");

    let mut received = Vec::new();
    let arrived = wait_until(Duration::from_secs(10), || {
        received.extend(drain_events(&mut fx.events));
        !received.is_empty()
    })
    .await;
    assert!(arrived, "real edit was not imported in time");
    tokio::time::sleep(SETTLE).await;
    received.extend(drain_events(&mut fx.events));

    let names: Vec<_> = received.iter().map(|e| e.item_name.as_str()).collect();
    assert_eq!(names, ["forms"]);
    fx.service.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_service_ignores_edits() {
    let mut fx = fixture();
    fx.service.start().expect("start");
    fx.service.stop();

    let theme_dir = fx.service.root().join("styles/Dark");
    fs::create_dir_all(&theme_dir).expect("mkdir");
    fs::write(theme_dir.join("forms.css"), "form{}").expect("edit");
    tokio::time::sleep(SETTLE).await;

    assert!(drain_events(&mut fx.events).is_empty());
    assert!(!fx.service.status().watching);
}
