//! Drive data model
//!
//! Entries are identified by an opaque `id`. The `path` field is a derived,
//! cache-only view filled in by the resolver and matcher; it is never used as
//! a key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root sentinel of the personal space
pub const PERSONAL_ROOT_ID: &str = "-11";

/// Root sentinel of a family (shared) space
pub const FAMILY_ROOT_ID: &str = "-12";

/// Default page size for listing requests
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Whether an id denotes a space root rather than a real entry.
///
/// Real ids never start with `-`; an empty parent id is what the shared space
/// reports for top-level entries.
pub fn is_root_id(id: &str) -> bool {
    id.is_empty() || id.starts_with('-')
}

/// Storage space an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Space {
    /// The signed-in user's own drive
    Personal,
    /// A shared family drive
    Family { family_id: i64 },
}

impl Space {
    /// Root sentinel id of this space
    pub const fn root_id(&self) -> &'static str {
        match self {
            Space::Personal => PERSONAL_ROOT_ID,
            Space::Family { .. } => FAMILY_ROOT_ID,
        }
    }

    /// Family id, if this is a shared space
    pub const fn family_id(&self) -> Option<i64> {
        match self {
            Space::Personal => None,
            Space::Family { family_id } => Some(*family_id),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Personal => write!(f, "personal"),
            Space::Family { family_id } => write!(f, "family:{family_id}"),
        }
    }
}

/// One file or folder record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque entry id
    pub id: String,

    /// Id of the containing folder
    pub parent_id: String,

    /// Entry name
    pub name: String,

    /// Whether this is a folder
    pub is_folder: bool,

    /// Size in bytes (0 for folders)
    pub size: u64,

    /// Uppercase hex MD5 of the content, empty for folders
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub md5: String,

    /// Absolute path, filled in by resolution; not authoritative
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Number of children reported for folders
    #[serde(default)]
    pub child_count: u32,

    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<jiff::Timestamp>,
}

impl Entry {
    /// Create a file entry
    pub fn file(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        md5: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            is_folder: false,
            size,
            md5: md5.into(),
            path: String::new(),
            child_count: 0,
            modified: None,
        }
    }

    /// Create a folder entry
    pub fn folder(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            is_folder: true,
            size: 0,
            md5: String::new(),
            path: String::new(),
            child_count: 0,
            modified: None,
        }
    }

    /// The root sentinel entry of a space
    pub fn root(space: &Space) -> Self {
        let mut root = Self::folder(space.root_id(), "", "/");
        root.path = "/".to_string();
        root
    }

    /// Whether this entry is a space root
    pub fn is_root(&self) -> bool {
        is_root_id(&self.id)
    }

    /// Human-readable size
    pub fn size_human(&self) -> String {
        humansize::format_size(self.size, humansize::BINARY)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_folder { "folder" } else { "file" };
        let shown = if self.path.is_empty() {
            &self.name
        } else {
            &self.path
        };
        write!(f, "{shown} ({kind}, id {})", self.id)
    }
}

/// Sort key for listing requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Name,
    Size,
    Time,
}

/// Options shared by every listing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub order_by: OrderBy,
    pub descending: bool,
    /// Entries per page; 0 means [`DEFAULT_PAGE_SIZE`]
    pub page_size: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            order_by: OrderBy::Name,
            descending: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListOptions {
    /// Page size with the zero default applied
    pub fn effective_page_size(&self) -> u32 {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }
}

/// A single "list children" request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub parent_id: String,
    /// 1-based page number
    pub page_number: u32,
    pub page_size: u32,
    pub order_by: OrderBy,
    pub descending: bool,
}

/// One page of a folder listing
///
/// The service returns folders and files as separate sub-lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub parent_id: String,
    pub page_number: u32,
    pub page_size: u32,
    /// Total number of children across all pages
    pub total_count: u64,
    pub folders: Vec<Entry>,
    pub files: Vec<Entry>,
}

impl ListingPage {
    /// Number of entries on this page
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in page order: folders first, then files
    pub fn into_entries(self) -> Vec<Entry> {
        let mut entries = self.folders;
        entries.extend(self.files);
        entries
    }
}

/// Totals over a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListingSummary {
    pub files: u64,
    pub folders: u64,
    pub total_size: u64,
}

impl ListingSummary {
    pub fn of(entries: &[Entry]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, e| {
            if e.is_folder {
                acc.folders += 1;
            } else {
                acc.files += 1;
            }
            acc.total_size += e.size;
            acc
        })
    }
}
