// SPDX-License-Identifier: MIT
//! Per-session source watcher with per-path debounce.
//!
//! notify's callbacks run on a notify-internal thread; raw events are
//! forwarded into a tokio mpsc channel and filtered on the async executor
//! (build output, dependency caches, and VCS metadata are ignored, as is
//! anything without a source/style/config extension). Each relevant path
//! gets a cancellable timer: a new event to the same path within the
//! window aborts and replaces the pending timer, so a burst of N writes
//! collapses to exactly one change callback, fired one window after the
//! last write. Distinct paths debounce independently — the queue's
//! coalescing absorbs the resulting duplicate rebuild requests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::project::ProjectStore;

/// Invoked with the session id once per debounced change.
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Subtrees never treated as source changes.
const EXCLUDED_DIRS: &[&str] = &["node_modules", "dist", ".git"];
/// Extensions that count as editable source/style/config files.
const WATCHED_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "css", "json"];

// ─── FileWatchDebouncer ───────────────────────────────────────────────────────

pub struct FileWatchDebouncer {
    projects: Arc<ProjectStore>,
    window: Duration,
    on_change: ChangeCallback,
    sessions: Mutex<HashMap<String, SessionWatch>>,
}

struct SessionWatch {
    /// Keeps the OS watch registered; dropping it releases the handle.
    _watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
    timers: Arc<DebounceTable>,
}

impl FileWatchDebouncer {
    pub fn new(
        projects: Arc<ProjectStore>,
        window: Duration,
        on_change: ChangeCallback,
    ) -> Self {
        Self {
            projects,
            window,
            on_change,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching a session's `src/` tree. A no-op when the session is
    /// already watched or its source directory does not exist yet.
    pub fn watch_session(&self, session_id: &str) -> Result<()> {
        {
            let sessions = self.sessions.lock().expect("watch table poisoned");
            if sessions.contains_key(session_id) {
                return Ok(());
            }
        }

        let src_path = self.projects.src_path(session_id);
        if !src_path.is_dir() {
            debug!(session_id, path = %src_path.display(), "no source tree to watch yet");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>(64);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&src_path, RecursiveMode::Recursive)?;

        let timers = Arc::new(DebounceTable::new(
            session_id.to_string(),
            self.window,
            Arc::clone(&self.on_change),
        ));
        let forwarder = tokio::spawn(forward_events(rx, Arc::clone(&timers)));

        let mut sessions = self.sessions.lock().expect("watch table poisoned");
        sessions.insert(
            session_id.to_string(),
            SessionWatch {
                _watcher: watcher,
                forwarder,
                timers,
            },
        );
        info!(session_id, path = %src_path.display(), "watching source tree");
        Ok(())
    }

    /// Stop watching: cancels all pending timers for the session and
    /// releases the underlying watch handle. In-flight builds triggered
    /// earlier are unaffected.
    pub fn stop_watching(&self, session_id: &str) {
        let watch = self
            .sessions
            .lock()
            .expect("watch table poisoned")
            .remove(session_id);
        if let Some(watch) = watch {
            watch.forwarder.abort();
            watch.timers.cancel_all();
            info!(session_id, "stopped watching source tree");
        }
    }

    pub fn is_watching(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("watch table poisoned")
            .contains_key(session_id)
    }

    /// Stop every session watch (daemon shutdown).
    pub fn stop_all(&self) {
        let drained: Vec<String> = self
            .sessions
            .lock()
            .expect("watch table poisoned")
            .keys()
            .cloned()
            .collect();
        for session_id in drained {
            self.stop_watching(&session_id);
        }
    }
}

async fn forward_events(
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    timers: Arc<DebounceTable>,
) {
    while let Some(event_res) = rx.recv().await {
        match event_res {
            Ok(event) => {
                // Editors that save via write-temp-then-rename surface the
                // final file as a create, so both kinds count as a change.
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                for path in event.paths {
                    if is_relevant(&path) {
                        Arc::clone(&timers).touch(path);
                    }
                }
            }
            Err(e) => {
                warn!(err = %e, "file watcher error");
            }
        }
    }
}

/// Relevant = not under an excluded subtree, and has an allow-listed
/// extension. Directories fall out naturally (no matching extension).
fn is_relevant(path: &Path) -> bool {
    if path
        .components()
        .any(|c| EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
    {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| WATCHED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

// ─── DebounceTable ────────────────────────────────────────────────────────────

/// At most one live timer per path. Timers are generation-tagged so a
/// timer that already fired can never remove its successor's entry.
struct DebounceTable {
    session_id: String,
    window: Duration,
    on_change: ChangeCallback,
    timers: Mutex<HashMap<PathBuf, PendingTimer>>,
    next_gen: AtomicU64,
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl DebounceTable {
    fn new(session_id: String, window: Duration, on_change: ChangeCallback) -> Self {
        Self {
            session_id,
            window,
            on_change,
            timers: Mutex::new(HashMap::new()),
            next_gen: AtomicU64::new(0),
        }
    }

    /// Record an event for `path`: abort any pending timer and schedule a
    /// fresh one, so the callback fires exactly once, one window after the
    /// last event to this path.
    fn touch(self: Arc<Self>, path: PathBuf) {
        let generation = self.next_gen.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(&self);

        // Hold the lock across the spawn: the new task sleeps for a full
        // window before touching the table, and the entry must be in
        // place before it can possibly wake.
        let mut timers = self.timers.lock().expect("debounce table poisoned");
        if let Some(prev) = timers.remove(&path) {
            prev.handle.abort();
        }

        let key = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(table.window).await;
            {
                let mut timers = table.timers.lock().expect("debounce table poisoned");
                match timers.get(&key) {
                    Some(t) if t.generation == generation => {
                        timers.remove(&key);
                    }
                    // Superseded by a newer timer for this path.
                    _ => return,
                }
            }
            debug!(session_id = %table.session_id, path = %key.display(), "debounced change");
            (table.on_change)(&table.session_id);
        });

        timers.insert(path, PendingTimer { generation, handle });
    }

    fn cancel_all(&self) {
        let mut timers = self.timers.lock().expect("debounce table poisoned");
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_table(window_ms: u64) -> (Arc<DebounceTable>, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        let callback: ChangeCallback = Arc::new(move |_session: &str| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
        let table = Arc::new(DebounceTable::new(
            "abc".to_string(),
            Duration::from_millis(window_ms),
            callback,
        ));
        (table, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_to_same_path_fires_once() {
        let (table, fired) = counting_table(1000);
        let path = PathBuf::from("/p/src/App.tsx");

        // Events at t = 0, 300, 600 ms — all within the 1s window.
        Arc::clone(&table).touch(path.clone());
        tokio::time::sleep(Duration::from_millis(300)).await;
        Arc::clone(&table).touch(path.clone());
        tokio::time::sleep(Duration::from_millis(300)).await;
        Arc::clone(&table).touch(path.clone());

        // At t = 1400 ms (800 ms after the last event) nothing has fired.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // The single callback lands one window after the last event (~1.6s).
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // No stragglers.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_paths_debounce_independently() {
        let (table, fired) = counting_table(1000);

        Arc::clone(&table).touch(PathBuf::from("/p/src/App.tsx"));
        Arc::clone(&table).touch(PathBuf::from("/p/src/index.css"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn event_after_fire_schedules_again() {
        let (table, fired) = counting_table(1000);
        let path = PathBuf::from("/p/src/App.tsx");

        Arc::clone(&table).touch(path.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        Arc::clone(&table).touch(path);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_pending_timers() {
        let (table, fired) = counting_table(1000);
        Arc::clone(&table).touch(PathBuf::from("/p/src/App.tsx"));
        Arc::clone(&table).touch(PathBuf::from("/p/src/index.css"));
        table.cancel_all();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn relevance_filter() {
        assert!(is_relevant(Path::new("/p/src/App.tsx")));
        assert!(is_relevant(Path::new("/p/src/styles/main.css")));
        assert!(is_relevant(Path::new("/p/src/data.json")));

        // Excluded subtrees.
        assert!(!is_relevant(Path::new("/p/node_modules/react/index.js")));
        assert!(!is_relevant(Path::new("/p/dist/bundle.js")));
        assert!(!is_relevant(Path::new("/p/.git/config.json")));

        // Non-source extensions and extensionless paths.
        assert!(!is_relevant(Path::new("/p/src/readme.md")));
        assert!(!is_relevant(Path::new("/p/src/subdir")));
    }
}
