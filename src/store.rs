//! Rendered page store.
//!
//! Holds one *generation*: the complete map from page path to rendered
//! fragment produced by a single rebuild. Readers load the current
//! generation through `arc-swap` and never see a map that is being built;
//! a rebuild assembles a fresh map off to the side and swaps it in whole.
//!
//! ```text
//!  Reader ──get()──► ArcSwap ──► Arc<Pages> (generation N)
//!                       ▲
//!  Rebuilder ──replace(Pages)── (generation N+1)
//! ```
//!
//! A reader that loaded generation N keeps its `Arc` until it drops it, so a
//! swap never invalidates a lookup in flight.

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// One complete generation of rendered pages, keyed by page path.
pub type Pages = FxHashMap<String, Page>;

/// A rendered page. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Rendered HTML fragment.
    pub html: Arc<str>,
    /// Source file the fragment was rendered from.
    pub source: PathBuf,
    /// Hash of the source bytes at render time.
    pub hash: blake3::Hash,
    /// Number of source lines.
    pub lines: usize,
}

/// Concurrent read-through cache of rendered pages.
#[derive(Debug, Default)]
pub struct Store {
    pages: ArcSwap<Pages>,
    generation: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a first generation.
    #[cfg(test)]
    pub fn with_pages(pages: Pages) -> Self {
        let store = Self::new();
        store.replace(pages);
        store
    }

    /// Look up one page in the current generation.
    pub fn get(&self, key: &str) -> Option<Page> {
        self.pages.load().get(key).cloned()
    }

    /// The whole current generation, for reads that span several keys.
    pub fn snapshot(&self) -> Arc<Pages> {
        self.pages.load_full()
    }

    /// Swap in a new generation.
    pub fn replace(&self, pages: Pages) {
        self.pages.store(Arc::new(pages));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of generations swapped in so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether the page at `key` was rendered from source hashing to `hash`.
    pub fn is_fresh(&self, key: &str, hash: &blake3::Hash) -> bool {
        self.pages.load().get(key).is_some_and(|p| p.hash == *hash)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pages.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.load().is_empty()
    }
}
