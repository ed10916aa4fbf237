//! Collaborator traits
//!
//! The engine never talks to the network itself. Request signing, wire
//! encoding and HTTP live behind these two traits: [`PanStore`] for the
//! metadata RPCs and [`Transport`] for moving byte ranges. Both can be mocked
//! for testing.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::entry::{Entry, ListingPage, PageRequest, Space};
use crate::error::Result;

/// Stream of downloaded chunks
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Parameters for opening an upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Folder receiving the file
    pub parent_id: String,
    /// Name of the file to create
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Uppercase hex MD5 of the whole content
    pub content_md5: String,
    /// Uppercase hex MD5 of the first chunk
    pub slice_md5: String,
    /// Chunk size the client intends to use
    pub slice_size: u64,
}

/// Server-side upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSession {
    pub upload_id: String,
    pub total_size: u64,
    /// Bytes the server has durably received
    pub committed_offset: u64,
    pub upload_url: String,
    pub commit_url: String,
    /// Request id the session was opened with; reused on every range PUT
    pub request_id: String,
    /// The server already holds content with this digest
    #[serde(default)]
    pub file_data_exists: bool,
}

impl TransferSession {
    /// Bytes still to send
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.committed_offset)
    }

    pub fn is_complete(&self) -> bool {
        self.committed_offset >= self.total_size
    }
}

/// Authoritative upload progress reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub upload_id: String,
    pub committed_offset: u64,
    pub file_data_exists: bool,
    pub upload_url: String,
    pub commit_url: String,
}

/// Metadata RPCs of a drive service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PanStore: Send + Sync {
    /// Fetch one page of a folder's children
    async fn list_children(&self, space: &Space, request: &PageRequest) -> Result<ListingPage>;

    /// Look up a single entry by id
    async fn get_entry(&self, space: &Space, id: &str) -> Result<Entry>;

    /// Create a folder under `parent_id`
    async fn create_folder(&self, space: &Space, parent_id: &str, name: &str) -> Result<Entry>;

    /// Rename a file or folder
    async fn rename_entry(&self, space: &Space, id: &str, new_name: &str) -> Result<Entry>;

    /// Move entries into `target_id`
    async fn move_entries(
        &self,
        space: &Space,
        ids: &[String],
        target_id: &str,
    ) -> Result<Vec<Entry>>;

    /// Delete entries (folders recursively)
    async fn delete_entries(&self, space: &Space, ids: &[String]) -> Result<bool>;

    /// Open or reopen an upload session
    async fn init_upload(&self, space: &Space, request: &UploadRequest)
    -> Result<TransferSession>;

    /// Finalize an upload and return the created file
    async fn commit_upload(&self, space: &Space, session: &TransferSession) -> Result<Entry>;

    /// Query the server's committed offset for a session
    async fn upload_status(&self, space: &Space, session: &TransferSession)
    -> Result<UploadStatus>;

    /// Obtain a signed download URL for a file
    async fn download_url(&self, space: &Space, file_id: &str) -> Result<String>;
}

/// A byte-range request built by the transfer controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RangeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of a range PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    /// Service error code extracted from the response body, if any
    pub error_code: Option<String>,
    /// Offset the server acknowledged, when it reports one
    pub acked_offset: Option<u64>,
}

/// Outcome of a ranged GET
pub struct GetResponse {
    pub status: u16,
    pub error_code: Option<String>,
    pub body: ByteStream,
}

/// Moves bytes for the transfer controller
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one chunk of an upload
    async fn put(&self, request: RangeRequest, body: Vec<u8>) -> Result<PutResponse>;

    /// Request a (possibly ranged) download
    async fn get(&self, request: RangeRequest) -> Result<GetResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_request_header_lookup() {
        let req = RangeRequest::new("mem://upload/1").header("Range", "bytes=0-");
        assert_eq!(req.header_value("range"), Some("bytes=0-"));
        assert_eq!(req.header_value("missing"), None);
    }

    #[test]
    fn test_session_remaining() {
        let session = TransferSession {
            upload_id: "u".into(),
            total_size: 10_000,
            committed_offset: 4096,
            upload_url: String::new(),
            commit_url: String::new(),
            request_id: String::new(),
            file_data_exists: false,
        };
        assert_eq!(session.remaining(), 5904);
        assert!(!session.is_complete());
    }
}
