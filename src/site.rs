//! Page discovery and store rebuilds.
//!
//! ```text
//! Rebuilder::rebuild()
//!     │
//!     ├── Site::collect_sources()  ── walk root, keep eligible files
//!     │
//!     ├── Site::render_all()       ── render in parallel (rayon)
//!     │       failed page → logged, previous entry kept (or absent)
//!     │
//!     └── Store::replace()         ── swap in the new generation
//! ```

use crate::{
    config::{RebuildMode, RenderConfig, WikiConfig},
    log,
    render::Renderer,
    store::{Page, Pages, Store},
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{
    fs,
    io::Cursor,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use walkdir::{DirEntry, WalkDir};

/// The served directory tree and how its files become pages.
pub struct Site {
    root: PathBuf,
    render: RenderConfig,
    renderer: Renderer,
}

impl Site {
    pub fn new(config: &WikiConfig, renderer: Renderer) -> Self {
        Self {
            root: config.root.clone(),
            render: config.render.clone(),
            renderer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Check whether a file is rendered as a page.
    pub fn is_eligible(&self, path: &Path) -> bool {
        self.render.is_eligible(path)
    }

    /// Page path for a source file: `/` + path relative to root, with `/`
    /// separators, extension dropped when configured.
    ///
    /// Returns `None` for paths outside the root.
    pub fn page_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let rel = if self.render.strip_extension {
            rel.with_extension("")
        } else {
            rel.to_path_buf()
        };

        let mut key = String::new();
        for component in rel.components() {
            let Component::Normal(part) = component else {
                return None;
            };
            key.push('/');
            key.push_str(&part.to_string_lossy());
        }
        (!key.is_empty()).then_some(key)
    }

    /// Source file for a request path, if that path names a page.
    ///
    /// With stripped extensions the configured extensions are tried in order.
    /// Hidden paths are never pages.
    pub fn source_for(&self, request_path: &str) -> Option<PathBuf> {
        let rel = safe_relative(request_path)?;
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return None;
        }
        let path = self.root.join(rel);

        if !self.render.strip_extension {
            return self.is_eligible(&path).then_some(path);
        }
        self.render
            .extensions
            .iter()
            .map(|ext| path.with_extension(ext))
            .find(|p| p.is_file())
    }

    /// All eligible source files under the root, hidden entries skipped.
    pub fn collect_sources(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(|p| self.is_eligible(p))
            .collect()
    }

    /// Render one source file into a store entry.
    pub fn render_page(&self, path: &Path) -> Result<Page> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let dir = path.parent().unwrap_or(&self.root);
        let html = self
            .renderer
            .render(Cursor::new(&bytes), dir)
            .with_context(|| format!("Failed to render {}", path.display()))?;

        Ok(Page {
            html: html.into(),
            source: path.to_path_buf(),
            hash: blake3::hash(&bytes),
            lines: count_lines(&bytes),
        })
    }

    /// Render every page into a new generation.
    ///
    /// A page that fails to render is logged and keeps its entry from
    /// `previous`, if it had one. One bad directive never takes other pages
    /// down with it.
    pub fn render_all(&self, previous: &Pages) -> Pages {
        let sources = self.collect_sources();

        sources
            .par_iter()
            .filter_map(|path| {
                let key = self.page_key(path)?;
                match self.render_page(path) {
                    Ok(page) => Some((key, page)),
                    Err(e) => {
                        log!("error"; "{:#}", e);
                        previous.get(&key).cloned().map(|page| (key, page))
                    }
                }
            })
            .collect()
    }
}

/// Serializes rebuilds and publishes them to the store.
pub struct Rebuilder {
    site: Site,
    store: Arc<Store>,
    lock: Mutex<()>,
}

impl Rebuilder {
    pub fn new(site: Site, store: Arc<Store>) -> Self {
        Self {
            site,
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Re-render the whole tree and swap the result into the store.
    ///
    /// Rebuilds never overlap: each one starts from the disk state after the
    /// previous one finished, so the last rebuild to complete reflects every
    /// write that finished before it started. Returns the page count.
    pub fn rebuild(&self) -> usize {
        let _guard = self.lock.lock();
        let start = Instant::now();

        let previous = self.store.snapshot();
        let pages = self.site.render_all(&previous);
        let count = pages.len();
        self.store.replace(pages);

        log!("render"; "{} pages in {:.2?}", count, start.elapsed());
        count
    }

    /// Rebuild on a background thread. Fire and forget.
    pub fn spawn_rebuild(self: &Arc<Self>) {
        let this = Arc::clone(self);
        std::thread::spawn(move || {
            this.rebuild();
        });
    }

    /// Rebuild after an edit, on this thread or in the background.
    pub fn rebuild_with(self: &Arc<Self>, mode: RebuildMode) {
        match mode {
            RebuildMode::Sync => {
                self.rebuild();
            }
            RebuildMode::Async => self.spawn_rebuild(),
        }
    }
}

/// Check if a walk entry is hidden (`.git`, `.notes.swp`, ...).
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

/// Number of physical lines, counting a final unterminated line.
fn count_lines(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

/// Relative path for a URL path, rejecting anything that could escape the root.
pub fn safe_relative(request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_matches('/');
    let rel = PathBuf::from(trimmed);
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then_some(rel)
}
