//! pan-core: Client engine for ID-addressed cloud drives
//!
//! The drive only offers opaque entry ids, a paginated "list children" RPC
//! and chunked transfer endpoints. This crate layers a path-oriented model on
//! top of that:
//! - Directory listing that flattens pagination
//! - Path resolution (`resolve`, `path_of`)
//! - Wildcard matching with literal-name precedence
//! - Directory creation (mkdir -p)
//! - Resumable uploads and ranged downloads
//! - Configuration and space profiles
//!
//! Wire formats, signing and HTTP stay behind the [`PanStore`] and
//! [`Transport`] traits, so the engine can be driven by any backend.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod lister;
pub mod matcher;
mod mkdir;
mod ops;
pub mod path;
pub mod resolver;
pub mod session;
pub mod space;
pub mod traits;
pub mod transfer;

pub use cache::PathCache;
pub use config::{Config, ConfigManager, Defaults};
pub use entry::{
    DEFAULT_PAGE_SIZE, Entry, FAMILY_ROOT_ID, ListOptions, ListingPage, ListingSummary, OrderBy,
    PERSONAL_ROOT_ID, PageRequest, Space, is_root_id,
};
pub use error::{Error, Result};
pub use matcher::SegmentPattern;
pub use session::Session;
pub use space::{SpaceKind, SpaceManager, SpaceProfile};
pub use traits::{
    ByteStream, GetResponse, PanStore, PutResponse, RangeRequest, TransferSession, Transport,
    UploadRequest, UploadStatus,
};
pub use transfer::{ByteRange, TransferController, UploadPhase, UploadState};
