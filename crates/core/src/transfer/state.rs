//! Persisted upload progress
//!
//! One JSON file per upload session lets a later process pick the upload up
//! again. The file only remembers which session to resume; the committed
//! offset is always re-read from the server before sending more bytes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::Space;
use crate::error::Result;
use crate::traits::TransferSession;

/// State of an in-flight upload (for resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadState {
    /// Remote destination path
    pub target: String,

    /// Local source file, if any
    pub source: Option<String>,

    /// Space the upload goes to
    pub space: Space,

    /// Digest of the whole content; a changed source never resumes
    pub content_md5: String,

    /// Server-side session
    pub session: TransferSession,

    /// Timestamp of last update
    pub last_updated: jiff::Timestamp,
}

impl UploadState {
    pub fn new(
        target: impl Into<String>,
        space: Space,
        content_md5: impl Into<String>,
        session: TransferSession,
    ) -> Self {
        Self {
            target: target.into(),
            source: None,
            space,
            content_md5: content_md5.into(),
            session,
            last_updated: jiff::Timestamp::now(),
        }
    }

    /// Set source file path
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Record the committed offset after a range was accepted
    pub fn record_progress(&mut self, committed_offset: u64) {
        self.session.committed_offset = committed_offset;
        self.last_updated = jiff::Timestamp::now();
    }

    /// Whether this state describes an upload of the same content to the same place
    pub fn matches(&self, space: &Space, size: u64, content_md5: &str) -> bool {
        self.space == *space
            && self.session.total_size == size
            && self.content_md5.eq_ignore_ascii_case(content_md5)
    }

    /// Calculate progress percentage
    pub fn progress_percent(&self) -> f64 {
        if self.session.total_size == 0 {
            return 100.0;
        }
        (self.session.committed_offset as f64 / self.session.total_size as f64 * 100.0).min(100.0)
    }

    /// State file path for an upload session
    pub fn state_file_path(state_dir: &Path, upload_id: &str) -> PathBuf {
        let safe_id: String = upload_id
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        state_dir.join(format!("upload_{safe_id}.json"))
    }

    /// Save state to file
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = Self::state_file_path(state_dir, &self.session.upload_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Load state from file
    pub fn load(state_dir: &Path, upload_id: &str) -> Result<Self> {
        let path = Self::state_file_path(state_dir, upload_id);
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Delete state file
    pub fn delete(state_dir: &Path, upload_id: &str) -> Result<()> {
        let path = Self::state_file_path(state_dir, upload_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Find pending uploads for a target path; unreadable files are skipped
    pub fn find_pending(state_dir: &Path, target: &str) -> Result<Vec<Self>> {
        let mut pending = Vec::new();

        if !state_dir.exists() {
            return Ok(pending);
        }

        for entry in std::fs::read_dir(state_dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<Self>(&content) {
                Ok(state) if state.target == target => pending.push(state),
                Ok(_) => {}
                Err(e) => tracing::debug!("skipping state file {}: {e}", path.display()),
            }
        }

        pending.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(pending)
    }
}
