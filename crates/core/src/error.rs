//! Error types for pan-core
//!
//! Provides a unified error type shared by the engine and the collaborator
//! layer that implements [`PanStore`](crate::PanStore) and
//! [`Transport`](crate::Transport).

use thiserror::Error;

/// Result type alias for pan-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pan-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed path or pattern, missing required ID
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Entry name rejected by the service naming rules
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Entry or upload session not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path resolution stopped at a segment with no matching child
    #[error("Not found: {path} (segment '{segment}' at index {index})")]
    PathNotFound {
        path: String,
        segment: String,
        index: usize,
    },

    /// Name collision on create, rename or move
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The server rejected a range because it does not start at its committed offset.
    ///
    /// `offset` is the offset the client was at, when known.
    #[error("Upload offset verification failed: {context}{}", offset_suffix(.offset))]
    OffsetVerifyFailed {
        context: String,
        offset: Option<u64>,
    },

    /// The server rejected the commit; the upload must restart from scratch
    #[error("Upload status verification failed: {0}")]
    StatusVerifyFailed(String),

    /// The service refused the operation (quota, content policy)
    #[error("Rejected by service: {0}")]
    Rejected(String),

    /// Opaque collaborator or network failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Space profile not found
    #[error("Space not found: {0}")]
    SpaceNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn offset_suffix(offset: &Option<u64>) -> String {
    offset.map(|o| format!(" at offset {o}")).unwrap_or_default()
}

impl Error {
    /// Map a service error code to the matching variant.
    ///
    /// Unknown codes become [`Error::Transport`] carrying the message.
    pub fn from_api_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "FileNotFound" | "UploadFileNotFound" => Error::NotFound(message),
            "FileAlreadyExists" => Error::AlreadyExists(message),
            "UploadOffsetVerifyFailed" => Error::OffsetVerifyFailed {
                context: message,
                offset: None,
            },
            "UploadFileStatusVerifyFailed" => Error::StatusVerifyFailed(message),
            "InvalidArgument" => Error::InvalidArgument(message),
            "UserDayFlowOverLimited" | "InfoSecurityErrorCode" => {
                Error::Rejected(format!("{code}: {message}"))
            }
            _ => Error::Transport(format!("{code}: {message}")),
        }
    }

    /// Whether this error means the addressed entry does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::PathNotFound { .. })
    }

    /// Transfer desync that is fixed by re-querying the upload status
    pub const fn is_resumable(&self) -> bool {
        matches!(self, Error::OffsetVerifyFailed { .. })
    }

    /// Transfer failure that invalidates the whole upload session
    pub const fn requires_restart(&self) -> bool {
        matches!(self, Error::StatusVerifyFailed(_))
    }

    /// Whether the caller may retry the same call unchanged
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
