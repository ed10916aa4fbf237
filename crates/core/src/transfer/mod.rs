//! Resumable Transfer Controller
//!
//! Owns range bookkeeping, header construction and response interpretation
//! for chunked uploads and ranged downloads. Bytes are moved by an injected
//! [`Transport`]; session RPCs go through the [`Session`]'s store.
//!
//! Upload state machine:
//!
//! ```text
//! Init -> FileDataExists ----------------------------> Committing -> Done
//!      \-> Uploading { offset } (PUT [offset, offset+len)) -^
//! ```
//!
//! A status query may happen at any point to fetch the server's committed
//! offset, which is the only valid starting point for the next range.

mod digest;
mod download;
mod state;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use digest::{FileDigests, file_digests, md5_hex};
pub use download::ByteRange;
pub use state::UploadState;

use crate::config::Defaults;
use crate::session::Session;
use crate::traits::{TransferSession, Transport};

/// Default chunk size: 10 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Minimum chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;

/// Where an upload session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Session not opened yet
    Init,
    /// The server already holds the content; nothing to send
    FileDataExists,
    /// Bytes from `offset` onward still have to be sent
    Uploading { offset: u64 },
    /// Everything is sent; the session awaits its commit
    Committing,
    /// Committed
    Done,
}

impl UploadPhase {
    /// Phase implied by a session's server-side state
    pub fn of(session: &TransferSession) -> Self {
        if session.file_data_exists {
            UploadPhase::FileDataExists
        } else if session.is_complete() {
            UploadPhase::Committing
        } else {
            UploadPhase::Uploading {
                offset: session.committed_offset,
            }
        }
    }
}

/// Split `[offset, total)` into `(start, len)` chunks of at most `chunk_size` bytes
pub fn chunk_ranges(offset: u64, total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut start = offset;
    while start < total {
        let len = chunk_size.min(total - start);
        ranges.push((start, len));
        start += len;
    }
    ranges
}

/// Drives uploads and downloads for one session
#[derive(Clone)]
pub struct TransferController {
    session: Session,
    transport: Arc<dyn Transport>,
    chunk_size: u64,
    state_dir: Option<PathBuf>,
}

impl TransferController {
    pub fn new(session: Session, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
            state_dir: None,
        }
    }

    /// Create a controller using configured chunk size and state directory
    pub fn from_config(session: Session, transport: Arc<dyn Transport>, defaults: &Defaults) -> Self {
        let mut controller = Self::new(session, transport).with_chunk_size(defaults.chunk_size);
        if let Some(dir) = &defaults.state_dir {
            controller = controller.with_state_dir(dir.clone());
        }
        controller
    }

    /// Set the chunk size, clamped to [`MIN_CHUNK_SIZE`]
    pub fn with_chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Persist upload progress under `dir` so uploads survive a restart
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl std::fmt::Debug for TransferController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferController")
            .field("session", &self.session)
            .field("chunk_size", &self.chunk_size)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges() {
        assert_eq!(
            chunk_ranges(0, 250, 100),
            vec![(0, 100), (100, 100), (200, 50)]
        );
        assert_eq!(chunk_ranges(4096, 10_000, 4096), vec![(4096, 4096), (8192, 1808)]);
        assert!(chunk_ranges(0, 0, 100).is_empty());
        assert!(chunk_ranges(300, 250, 100).is_empty());
    }

    fn session_with(committed: u64, exists: bool) -> TransferSession {
        TransferSession {
            upload_id: "u".into(),
            total_size: 100,
            committed_offset: committed,
            upload_url: String::new(),
            commit_url: String::new(),
            request_id: String::new(),
            file_data_exists: exists,
        }
    }

    #[test]
    fn test_upload_phase_of() {
        assert_eq!(
            UploadPhase::of(&session_with(40, false)),
            UploadPhase::Uploading { offset: 40 }
        );
        assert_eq!(UploadPhase::of(&session_with(100, false)), UploadPhase::Committing);
        assert_eq!(UploadPhase::of(&session_with(0, true)), UploadPhase::FileDataExists);
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        use crate::entry::Space;
        use crate::traits::{MockPanStore, MockTransport};

        let session = Session::new(Arc::new(MockPanStore::new()), Space::Personal);
        let controller =
            TransferController::new(session, Arc::new(MockTransport::new())).with_chunk_size(10);
        assert_eq!(controller.chunk_size(), MIN_CHUNK_SIZE);
    }
}
