//! Directory Lister
//!
//! Flattens the paginated "list children" RPC into one ordered listing.

use crate::entry::{Entry, ListOptions, ListingSummary, PageRequest};
use crate::error::{Error, Result};
use crate::session::Session;

/// Number of pages needed for `total` entries
pub fn page_count(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size))
}

impl Session {
    /// List every child of `parent_id` using the session's listing options
    pub async fn list_all(&self, parent_id: &str) -> Result<Vec<Entry>> {
        let options = *self.list_options();
        self.list_all_with(parent_id, &options).await
    }

    /// List every child of `parent_id`.
    ///
    /// Page 1 is fetched first; when its `total_count` exceeds the page size
    /// the remaining pages are fetched in order. Folders precede files within
    /// each page; entries are not re-sorted across pages. Any failed page
    /// aborts the whole listing.
    pub async fn list_all_with(&self, parent_id: &str, options: &ListOptions) -> Result<Vec<Entry>> {
        if parent_id.is_empty() {
            return Err(Error::InvalidArgument("parent id is required".into()));
        }

        let page_size = options.effective_page_size();
        let mut request = PageRequest {
            parent_id: parent_id.to_string(),
            page_number: 1,
            page_size,
            order_by: options.order_by,
            descending: options.descending,
        };

        let first = self.store().list_children(self.space(), &request).await?;
        let total = first.total_count;
        let mut entries = first.into_entries();

        let pages = page_count(total, page_size);
        if total > u64::from(page_size) {
            for page in 2..=pages {
                request.page_number = u32::try_from(page).map_err(|_| {
                    Error::Transport(format!("listing of {parent_id} has too many pages"))
                })?;
                tracing::debug!("listing {parent_id}: page {page}/{pages}");
                let next = self.store().list_children(self.space(), &request).await?;
                entries.extend(next.into_entries());
            }
        }

        if entries.len() as u64 != total {
            tracing::warn!(
                "listing of {parent_id} returned {} entries, server reported {total}",
                entries.len()
            );
        }

        Ok(entries)
    }

    /// Resolve a folder path and list its children
    pub async fn list_path(&self, path: &str) -> Result<Vec<Entry>> {
        let folder = self.resolve(path).await?;
        if !folder.is_folder {
            return Err(Error::InvalidArgument(format!("{path} is not a folder")));
        }
        let mut entries = self.list_all(&folder.id).await?;
        for entry in &mut entries {
            entry.path = crate::path::join(&folder.path, &entry.name);
        }
        Ok(entries)
    }

    /// Count files, folders and bytes directly under a folder path
    pub async fn summarize(&self, path: &str) -> Result<ListingSummary> {
        let entries = self.list_path(path).await?;
        Ok(ListingSummary::of(&entries))
    }
}
