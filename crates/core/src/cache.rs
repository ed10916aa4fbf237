//! Optional path -> entry cache
//!
//! A read-mostly map shared between sessions. Lookups only ever shorten a
//! resolution walk; a miss falls back to listing.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::entry::{Entry, Space};
use crate::path;

/// Concurrency-safe cache of resolved entries keyed by normalized path
#[derive(Debug, Default)]
pub struct PathCache {
    entries: RwLock<HashMap<(Space, String), Entry>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a normalized absolute path
    pub fn get(&self, space: &Space, path: &str) -> Option<Entry> {
        self.entries
            .read()
            .get(&(*space, path.to_string()))
            .cloned()
    }

    /// Remember an entry under its `path` field; entries without a path are ignored
    pub fn insert(&self, space: &Space, entry: &Entry) {
        if entry.path.is_empty() || entry.is_root() {
            return;
        }
        self.entries
            .write()
            .insert((*space, entry.path.clone()), entry.clone());
    }

    /// Drop `prefix` and everything below it
    pub fn invalidate(&self, space: &Space, prefix: &str) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(s, p), _| s != space || !path::is_within(p, prefix));
        tracing::debug!(
            "path cache: invalidated {} entries under {prefix}",
            before - entries.len()
        );
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
