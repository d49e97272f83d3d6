//! File watcher integration tests — real notify events against a real
//! project tree. Debounce windows are short but generous enough for the
//! OS to deliver events.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use previewd::project::ProjectStore;
use previewd::watch::{ChangeCallback, FileWatchDebouncer};

struct WatchHarness {
    _dir: tempfile::TempDir,
    projects: Arc<ProjectStore>,
    watcher: FileWatchDebouncer,
    fired: Arc<AtomicUsize>,
}

async fn watch_harness(debounce_ms: u64) -> WatchHarness {
    let dir = tempfile::tempdir().unwrap();
    let projects = Arc::new(ProjectStore::new(dir.path()));

    let mut files = BTreeMap::new();
    files.insert("App.tsx".to_string(), "export default 1".to_string());
    projects.save_files("abc", &files).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_cb = Arc::clone(&fired);
    let on_change: ChangeCallback = Arc::new(move |session_id: &str| {
        assert_eq!(session_id, "abc");
        fired_cb.fetch_add(1, Ordering::SeqCst);
    });

    let watcher = FileWatchDebouncer::new(
        Arc::clone(&projects),
        Duration::from_millis(debounce_ms),
        on_change,
    );
    WatchHarness {
        _dir: dir,
        projects,
        watcher,
        fired,
    }
}

async fn wait_for_count(fired: &AtomicUsize, want: usize, within: Duration) {
    let deadline = tokio::time::Instant::now() + within;
    while fired.load(Ordering::SeqCst) < want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {want} callback(s), saw {}",
            fired.load(Ordering::SeqCst)
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn burst_of_writes_triggers_exactly_one_callback() {
    let h = watch_harness(300).await;
    h.watcher.watch_session("abc").unwrap();
    assert!(h.watcher.is_watching("abc"));

    // Give the OS watch a moment to register before writing.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let file = h.projects.src_path("abc").join("App.tsx");
    for i in 0..3 {
        std::fs::write(&file, format!("export default {i}")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    wait_for_count(&h.fired, 1, Duration::from_secs(5)).await;

    // The burst collapsed — no trailing second callback.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(h.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn irrelevant_paths_do_not_trigger() {
    let h = watch_harness(200).await;
    h.watcher.watch_session("abc").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(h.projects.src_path("abc").join("notes.md"), "ignored").unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn watch_is_idempotent_and_stop_releases_the_watch() {
    let h = watch_harness(200).await;
    h.watcher.watch_session("abc").unwrap();
    // Watching again is a no-op, not an error.
    h.watcher.watch_session("abc").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let file = h.projects.src_path("abc").join("App.tsx");
    std::fs::write(&file, "v2").unwrap();
    wait_for_count(&h.fired, 1, Duration::from_secs(5)).await;

    h.watcher.stop_watching("abc");
    assert!(!h.watcher.is_watching("abc"));

    // Writes after stop are not observed.
    std::fs::write(&file, "v3").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn watching_a_session_without_sources_is_a_quiet_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let projects = Arc::new(ProjectStore::new(dir.path()));
    let on_change: ChangeCallback = Arc::new(|_: &str| {});
    let watcher = FileWatchDebouncer::new(projects, Duration::from_millis(200), on_change);

    watcher.watch_session("ghost").unwrap();
    assert!(!watcher.is_watching("ghost"));
}
