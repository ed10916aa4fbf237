//! Path-based entry operations: rename, move and remove

use std::collections::HashSet;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::path;
use crate::session::Session;

impl Session {
    /// Rename the entry at `path`
    pub async fn rename(&self, path: &str, new_name: &str) -> Result<Entry> {
        let entry = self.resolve(path).await?;
        if entry.is_root() {
            return Err(Error::InvalidArgument("cannot rename the root".into()));
        }
        path::validate_name(new_name)?;

        let mut renamed = self
            .store()
            .rename_entry(self.space(), &entry.id, new_name)
            .await?;
        self.forget(&entry.path);

        let parent_path = path::split_parent(&entry.path)
            .map(|(parent, _)| parent)
            .unwrap_or_else(|| "/".to_string());
        renamed.parent_id = entry.parent_id;
        renamed.path = path::join(&parent_path, &renamed.name);
        tracing::info!("renamed {} -> {}", entry.path, renamed.path);
        Ok(renamed)
    }

    /// Move everything matched by `patterns` into the folder `target_dir`
    pub async fn move_to(&self, patterns: &[&str], target_dir: &str) -> Result<Vec<Entry>> {
        let sources = unique(self.glob_all(patterns).await?);
        let target = self.resolve(target_dir).await?;
        if !target.is_folder {
            return Err(Error::InvalidArgument(format!(
                "{target_dir} is not a folder"
            )));
        }

        for source in &sources {
            if source.is_root() {
                return Err(Error::InvalidArgument("cannot move the root".into()));
            }
            if source.is_folder && path::is_within(&target.path, &source.path) {
                return Err(Error::InvalidArgument(format!(
                    "cannot move {} into itself",
                    source.path
                )));
            }
        }

        let ids: Vec<String> = sources.iter().map(|e| e.id.clone()).collect();
        let mut moved = self
            .store()
            .move_entries(self.space(), &ids, &target.id)
            .await?;

        for source in &sources {
            self.forget(&source.path);
        }
        for entry in &mut moved {
            entry.parent_id = target.id.clone();
            entry.path = path::join(&target.path, &entry.name);
        }
        tracing::info!("moved {} entries into {}", moved.len(), target.path);
        Ok(moved)
    }

    /// Delete everything matched by `patterns` and return what was removed
    pub async fn remove(&self, patterns: &[&str]) -> Result<Vec<Entry>> {
        let targets = unique(self.glob_all(patterns).await?);
        if targets.iter().any(Entry::is_root) {
            return Err(Error::InvalidArgument("cannot remove the root".into()));
        }

        let ids: Vec<String> = targets.iter().map(|e| e.id.clone()).collect();
        if !self.store().delete_entries(self.space(), &ids).await? {
            return Err(Error::Transport(format!(
                "delete of {} entries was not accepted",
                ids.len()
            )));
        }

        for entry in &targets {
            self.forget(&entry.path);
        }
        tracing::info!("removed {} entries", targets.len());
        Ok(targets)
    }
}

/// Drop entries matched by more than one pattern
fn unique(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}
