//! Session context
//!
//! A [`Session`] bundles everything one logical client needs: the
//! collaborator implementing the RPCs, the space being addressed, listing
//! preferences and an optional shared [`PathCache`]. Independent sessions
//! (personal and family spaces, different accounts) coexist freely.

use std::sync::Arc;

use crate::cache::PathCache;
use crate::config::Defaults;
use crate::entry::{Entry, ListOptions, Space};
use crate::traits::PanStore;

/// Explicit context passed to every core operation
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn PanStore>,
    space: Space,
    list_options: ListOptions,
    cache: Option<Arc<PathCache>>,
}

impl Session {
    /// Create a session with default listing options and no cache
    pub fn new(store: Arc<dyn PanStore>, space: Space) -> Self {
        Self {
            store,
            space,
            list_options: ListOptions::default(),
            cache: None,
        }
    }

    /// Create a session from configured defaults
    pub fn from_config(store: Arc<dyn PanStore>, space: Space, defaults: &Defaults) -> Self {
        let mut session = Self::new(store, space).with_list_options(defaults.list_options());
        if defaults.path_cache {
            session = session.with_cache(Arc::new(PathCache::new()));
        }
        session
    }

    pub fn with_list_options(mut self, options: ListOptions) -> Self {
        self.list_options = options;
        self
    }

    /// Attach a (possibly shared) path cache
    pub fn with_cache(mut self, cache: Arc<PathCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &dyn PanStore {
        self.store.as_ref()
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn list_options(&self) -> &ListOptions {
        &self.list_options
    }

    pub fn cache(&self) -> Option<&PathCache> {
        self.cache.as_deref()
    }

    /// Root sentinel entry of this session's space
    pub fn root(&self) -> Entry {
        Entry::root(&self.space)
    }

    pub(crate) fn remember(&self, entry: &Entry) {
        if let Some(cache) = &self.cache {
            cache.insert(&self.space, entry);
        }
    }

    pub(crate) fn forget(&self, prefix: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&self.space, prefix);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("space", &self.space)
            .field("list_options", &self.list_options)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
