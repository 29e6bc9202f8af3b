//! File system watcher for live rebuilds.
//!
//! Monitors the wiki root and rebuilds the store when a page changes on
//! disk outside the server (an editor, `git pull`, a sync tool).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌─────────────────────────┐
//! │ notify   │───▶│ Debouncer│───▶│    handle_changes()     │
//! │ events   │    │ (300ms)  │    │                         │
//! └──────────┘    └──────────┘    │  page paths only        │
//!                                 │  unchanged hash → skip  │
//!                                 │  otherwise → rebuild    │
//!                                 └─────────────────────────┘
//! ```
//!
//! Edits made through the server rebuild on their own; when the watcher
//! sees the same write afterwards the source hash already matches the store
//! and no second rebuild runs.

use crate::{log, site::Rebuilder};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Check if any component below `root` is hidden (`.git/...`).
fn in_hidden_dir(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(s) if s.to_string_lossy().starts_with('.')))
}

/// `/wiki/notes/todo.txt` → `notes/todo.txt`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    /// Pending paths have settled and no rebuild ran recently. Events that
    /// arrive during the cooldown stay queued until it ends.
    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && !self.in_cooldown()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            return Duration::from_secs(60);
        }
        let cooldown_left = self.last_rebuild.map_or(Duration::ZERO, |t| {
            Duration::from_millis(REBUILD_COOLDOWN_MS).saturating_sub(t.elapsed())
        });
        cooldown_left.max(Duration::from_millis(DEBOUNCE_MS))
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// What a changed path means for the store.
#[derive(Debug, PartialEq, Eq)]
enum Change {
    /// Not a page and holds no pages.
    Ignored,
    /// Page source on disk matches what the store rendered.
    Unchanged,
    /// Page (or directory of pages) added, edited or removed.
    Stale,
}

fn classify_change(path: &Path, rebuilder: &Rebuilder) -> Change {
    let site = rebuilder.site();
    let store = rebuilder.store();

    if in_hidden_dir(path, site.root()) {
        return Change::Ignored;
    }

    if !site.is_eligible(path) {
        // A removed or renamed directory takes its pages with it.
        let held_pages = !path.exists()
            && store
                .snapshot()
                .values()
                .any(|page| page.source.starts_with(path));
        return if held_pages {
            Change::Stale
        } else {
            Change::Ignored
        };
    }

    let Some(key) = site.page_key(path) else {
        return Change::Ignored;
    };
    match fs::read(path) {
        Ok(bytes) if store.is_fresh(&key, &blake3::hash(&bytes)) => Change::Unchanged,
        Ok(_) => Change::Stale,
        // Removed: stale only if the store still serves it.
        Err(_) if store.get(&key).is_some() => Change::Stale,
        Err(_) => Change::Ignored,
    }
}

/// Process file changes. Returns true if a rebuild ran (for cooldown).
fn handle_changes(paths: &[PathBuf], rebuilder: &Rebuilder) -> bool {
    let root = rebuilder.site().root();
    let stale: Vec<String> = paths
        .iter()
        .filter(|p| classify_change(p, rebuilder) == Change::Stale)
        .map(|p| rel_path(p, root))
        .collect();

    if stale.is_empty() {
        return false;
    }

    log!("watch"; "{} changed, rebuilding...", stale.join(", "));
    rebuilder.rebuild();
    true
}

// =============================================================================
// Watcher Setup
// =============================================================================

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(rebuilder: &Rebuilder) -> Result<()> {
    let root = rebuilder.site().root();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;

    log!("watch"; "{}", root.display());
    run_event_loop(&rx, rebuilder);
    Ok(())
}

/// Debounce events from `rx` and rebuild until the sender goes away.
fn run_event_loop(rx: &Receiver<notify::Result<Event>>, rebuilder: &Rebuilder) {
    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Disconnected) => break,
            // irrelevant events and timeouts
            _ => {}
        }

        if debouncer.ready() && handle_changes(&debouncer.take(), rebuilder) {
            debouncer.mark_rebuild();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WikiConfig,
        render::{Renderer, ShellRunner},
        site::Site,
        store::Store,
    };
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rebuilder(root: &Path) -> Rebuilder {
        let mut config = WikiConfig::default();
        config.root = root.to_path_buf();
        let renderer = Renderer::new(Arc::new(ShellRunner::new(["sh", "-c"])), true);
        let rebuilder = Rebuilder::new(Site::new(&config, renderer), Arc::new(Store::new()));
        rebuilder.rebuild();
        rebuilder
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/wiki/a.txt~")));
        assert!(is_temp_file(Path::new("/wiki/.a.txt.swp")));
        assert!(is_temp_file(Path::new("/wiki/a.bak")));
        assert!(!is_temp_file(Path::new("/wiki/a.txt")));
    }

    #[test]
    fn test_in_hidden_dir() {
        let root = Path::new("/wiki");
        assert!(in_hidden_dir(Path::new("/wiki/.git/HEAD"), root));
        assert!(!in_hidden_dir(Path::new("/wiki/notes/a.txt"), root));
    }

    #[test]
    fn test_is_relevant() {
        assert!(is_relevant(&event(EventKind::Create(CreateKind::File), &[])));
        assert!(is_relevant(&event(EventKind::Modify(ModifyKind::Any), &[])));
        assert!(is_relevant(&event(EventKind::Remove(RemoveKind::File), &[])));
        assert!(!is_relevant(&event(EventKind::Any, &[])));
    }

    #[test]
    fn test_debouncer_batches_and_filters() {
        let mut debouncer = Debouncer::new();
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_secs(60));

        debouncer.add(event(
            EventKind::Modify(ModifyKind::Any),
            &["/wiki/a.txt", "/wiki/a.txt", "/wiki/a.txt~"],
        ));
        assert_eq!(debouncer.timeout(), Duration::from_millis(DEBOUNCE_MS));
        // not ready until the debounce window passes
        assert!(!debouncer.ready());

        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 50));
        assert!(debouncer.ready());
        assert_eq!(debouncer.take(), vec![PathBuf::from("/wiki/a.txt")]);
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_debouncer_cooldown() {
        let mut debouncer = Debouncer::new();
        assert!(!debouncer.in_cooldown());
        debouncer.mark_rebuild();
        assert!(debouncer.in_cooldown());
    }

    #[test]
    fn test_debouncer_keeps_events_during_cooldown() {
        let mut debouncer = Debouncer::new();
        debouncer.mark_rebuild();
        debouncer.add(event(EventKind::Modify(ModifyKind::Any), &["/wiki/a.txt"]));

        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 50));
        // settled, but still cooling down
        assert!(!debouncer.ready());
        assert!(debouncer.timeout() > Duration::ZERO);

        std::thread::sleep(Duration::from_millis(REBUILD_COOLDOWN_MS));
        assert!(debouncer.ready());
        assert_eq!(debouncer.take(), vec![PathBuf::from("/wiki/a.txt")]);
    }

    /// Waits until the page at `key` contains `needle` or the deadline passes.
    fn wait_for(rebuilder: &Rebuilder, key: &str, needle: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if rebuilder
                .store()
                .get(key)
                .is_some_and(|p| p.html.contains(needle))
            {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_second_edit_inside_cooldown_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("a.txt");
        fs::write(&page, "v1").unwrap();
        let rebuilder = Arc::new(rebuilder(dir.path()));

        let (tx, rx) = mpsc::channel();
        let looper = {
            let rebuilder = Arc::clone(&rebuilder);
            std::thread::spawn(move || run_event_loop(&rx, &rebuilder))
        };
        let modified = || -> notify::Result<Event> {
            Ok(event(
                EventKind::Modify(ModifyKind::Any),
                &[page.to_str().unwrap()],
            ))
        };

        fs::write(&page, "v2").unwrap();
        tx.send(modified()).unwrap();
        assert!(wait_for(&rebuilder, "/a.txt", "v2"));

        // lands right after the rebuild, inside the cooldown window
        fs::write(&page, "v3").unwrap();
        tx.send(modified()).unwrap();
        assert!(wait_for(&rebuilder, "/a.txt", "v3"));

        drop(tx);
        looper.join().unwrap();
    }

    #[test]
    fn test_unchanged_page_is_skipped() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("a.txt");
        fs::write(&page, "same").unwrap();
        let rebuilder = rebuilder(dir.path());

        assert_eq!(classify_change(&page, &rebuilder), Change::Unchanged);
        assert!(!handle_changes(&[page], &rebuilder));
        assert_eq!(rebuilder.store().generation(), 1);
    }

    #[test]
    fn test_edited_page_rebuilds() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("a.txt");
        fs::write(&page, "before").unwrap();
        let rebuilder = rebuilder(dir.path());

        fs::write(&page, "after").unwrap();
        assert!(handle_changes(&[page], &rebuilder));
        assert!(rebuilder.store().get("/a.txt").unwrap().html.contains("after"));
    }

    #[test]
    fn test_new_and_removed_pages() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.txt");
        fs::write(&old, "x").unwrap();
        let rebuilder = rebuilder(dir.path());

        let new = dir.path().join("new.md");
        fs::write(&new, "y").unwrap();
        assert_eq!(classify_change(&new, &rebuilder), Change::Stale);

        fs::remove_file(&old).unwrap();
        assert_eq!(classify_change(&old, &rebuilder), Change::Stale);

        assert!(handle_changes(&[new, old], &rebuilder));
        assert!(rebuilder.store().get("/old.txt").is_none());
        assert!(rebuilder.store().get("/new.md").is_some());
    }

    #[test]
    fn test_removed_directory_of_pages() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.txt"), "x").unwrap();
        let rebuilder = rebuilder(dir.path());

        fs::remove_dir_all(&sub).unwrap();
        assert_eq!(classify_change(&sub, &rebuilder), Change::Stale);
    }

    #[test]
    fn test_non_pages_are_ignored() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("logo.png");
        fs::write(&image, "png").unwrap();
        let hidden = dir.path().join(".git/notes.txt");
        let rebuilder = rebuilder(dir.path());

        assert_eq!(classify_change(&image, &rebuilder), Change::Ignored);
        assert_eq!(classify_change(&hidden, &rebuilder), Change::Ignored);
        assert_eq!(
            classify_change(&dir.path().join("never.txt"), &rebuilder),
            Change::Ignored
        );
        assert!(!handle_changes(&[image, hidden], &rebuilder));
    }
}
