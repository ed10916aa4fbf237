//! Path Resolver
//!
//! Turns absolute paths into entries by walking one segment at a time, and
//! entries back into paths by following parent links.

use std::collections::HashSet;

use crate::entry::{Entry, is_root_id};
use crate::error::{Error, Result};
use crate::path;
use crate::session::Session;

impl Session {
    /// Resolve an absolute path to its entry.
    ///
    /// The path is normalized first; `/` returns the root sentinel without
    /// any RPC. When several children share a segment name, the first one in
    /// listing order wins.
    pub async fn resolve(&self, path: &str) -> Result<Entry> {
        let (normalized, segments) = path::absolute_segments(path)?;
        if segments.is_empty() {
            return Ok(self.root());
        }

        let (mut parent, start) = self.deepest_cached(&segments);
        if start == segments.len() {
            return Ok(parent);
        }

        for (index, segment) in segments.iter().enumerate().skip(start) {
            if !parent.is_folder {
                return Err(Error::PathNotFound {
                    path: normalized,
                    segment: segment.clone(),
                    index,
                });
            }

            let children = self.list_all(&parent.id).await?;
            if children.is_empty() {
                return Err(Error::PathNotFound {
                    path: normalized,
                    segment: segment.clone(),
                    index,
                });
            }

            let mut matches = children.into_iter().filter(|c| c.name == *segment);
            let Some(mut child) = matches.next() else {
                return Err(Error::PathNotFound {
                    path: normalized,
                    segment: segment.clone(),
                    index,
                });
            };
            if matches.next().is_some() {
                tracing::warn!(
                    "duplicate name '{segment}' under {}, using id {}",
                    parent.path,
                    child.id
                );
            }

            child.parent_id = parent.id.clone();
            child.path = path::prefix(&segments, index + 1);
            tracing::debug!("resolved {} -> {}", child.path, child.id);
            self.remember(&child);
            parent = child;
        }

        Ok(parent)
    }

    /// Longest cached prefix of `segments`, or the root
    fn deepest_cached(&self, segments: &[String]) -> (Entry, usize) {
        if let Some(cache) = self.cache() {
            for count in (1..=segments.len()).rev() {
                let prefix = path::prefix(segments, count);
                if let Some(entry) = cache.get(self.space(), &prefix) {
                    tracing::debug!("path cache hit: {prefix}");
                    return (entry, count);
                }
            }
        }
        (self.root(), 0)
    }

    /// Full path of an entry, rebuilt from parent links.
    ///
    /// Walks upward with single-entry lookups until a root id is reached.
    /// The `path` field of `entry` is ignored.
    pub async fn path_of(&self, entry: &Entry) -> Result<String> {
        if entry.is_root() {
            return Ok("/".to_string());
        }

        let mut names = vec![entry.name.clone()];
        let mut visited = HashSet::from([entry.id.clone()]);
        let mut parent_id = entry.parent_id.clone();

        while !is_root_id(&parent_id) {
            if !visited.insert(parent_id.clone()) {
                return Err(Error::Transport(format!(
                    "parent chain of {} loops at {parent_id}",
                    entry.id
                )));
            }
            let parent = self.store().get_entry(self.space(), &parent_id).await?;
            if parent.is_root() {
                break;
            }
            names.push(parent.name);
            parent_id = parent.parent_id;
        }

        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }
}
