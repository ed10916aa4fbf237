//! In-memory drive
//!
//! Keeps one id-addressed tree per space, answers the metadata RPCs with the
//! same paging, naming and upload-session rules a real drive applies, and
//! counts every call so tests can assert on RPC traffic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use pan_core::transfer::md5_hex;
use pan_core::{
    Entry, Error, ListingPage, OrderBy, PageRequest, PanStore, Result, Space, TransferSession,
    UploadRequest, UploadStatus,
};

/// RPC counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub list_calls: usize,
    pub get_entry_calls: usize,
    pub create_calls: usize,
    pub rename_calls: usize,
    pub move_calls: usize,
    pub delete_calls: usize,
    pub init_upload_calls: usize,
    pub status_calls: usize,
    pub commit_calls: usize,
    pub put_calls: usize,
    pub get_calls: usize,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) entry: Entry,
    pub(crate) content: Vec<u8>,
}

/// One space: nodes by id, child ids in insertion order
#[derive(Debug, Default)]
pub(crate) struct Tree {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) children: HashMap<String, Vec<String>>,
}

impl Tree {
    fn child_ids(&self, parent_id: &str) -> &[String] {
        self.children
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn child_named(&self, parent_id: &str, name: &str) -> Option<&Entry> {
        self.child_ids(parent_id)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| &n.entry)
            .find(|e| e.name == name)
    }

    fn is_folder(&self, space: &Space, id: &str) -> bool {
        id == space.root_id() || self.nodes.get(id).is_some_and(|n| n.entry.is_folder)
    }

    fn remove_recursive(&mut self, id: &str) {
        if let Some(kids) = self.children.remove(id) {
            for kid in kids {
                self.remove_recursive(&kid);
            }
        }
        self.nodes.remove(id);
    }

    fn detach(&mut self, parent_id: &str, id: &str) {
        if let Some(kids) = self.children.get_mut(parent_id) {
            kids.retain(|k| k != id);
        }
    }

    fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        let mut current = id.to_string();
        let mut hops = 0;
        while let Some(node) = self.nodes.get(&current) {
            if current == ancestor {
                return true;
            }
            current = node.entry.parent_id.clone();
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
        }
        current == ancestor
    }
}

#[derive(Debug)]
pub(crate) struct Upload {
    pub(crate) space: Space,
    pub(crate) request: UploadRequest,
    pub(crate) session: TransferSession,
    pub(crate) data: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) trees: HashMap<Space, Tree>,
    pub(crate) uploads: HashMap<String, Upload>,
    pub(crate) next_id: u64,
    pub(crate) stats: StoreStats,
    pub(crate) failing_pages: HashSet<u32>,
    pub(crate) create_conflicts: HashSet<String>,
    pub(crate) put_budget: Option<usize>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn tree(&mut self, space: &Space) -> &mut Tree {
        self.trees.entry(*space).or_default()
    }

    fn insert(&mut self, space: &Space, mut entry: Entry, content: Vec<u8>) -> Entry {
        let id = format!("{}", 1000 + self.next_id());
        entry.id = id.clone();
        entry.modified = Some(jiff::Timestamp::now());
        let tree = self.tree(space);
        tree.children
            .entry(entry.parent_id.clone())
            .or_default()
            .push(id.clone());
        if let Some(parent) = tree.nodes.get_mut(&entry.parent_id) {
            parent.entry.child_count += 1;
        }
        tree.nodes.insert(
            id,
            Node {
                entry: entry.clone(),
                content,
            },
        );
        entry
    }
}

/// Thread-safe in-memory implementation of [`PanStore`] and
/// [`Transport`](pan_core::Transport)
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a folder, bypassing name checks; duplicate names are allowed
    pub fn add_folder(&self, space: &Space, parent_id: &str, name: &str) -> Entry {
        self.inner
            .lock()
            .insert(space, Entry::folder("", parent_id, name), Vec::new())
    }

    /// Seed a file with content, bypassing name checks
    pub fn add_file(
        &self,
        space: &Space,
        parent_id: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> Entry {
        let content = content.into();
        let entry = Entry::file(
            "",
            parent_id,
            name,
            content.len() as u64,
            md5_hex(&content),
        );
        self.inner.lock().insert(space, entry, content)
    }

    /// Content of a file
    pub fn content(&self, space: &Space, id: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .trees
            .get(space)?
            .nodes
            .get(id)
            .map(|n| n.content.clone())
    }

    /// Children of a folder in insertion order
    pub fn children(&self, space: &Space, parent_id: &str) -> Vec<Entry> {
        let inner = self.inner.lock();
        let Some(tree) = inner.trees.get(space) else {
            return Vec::new();
        };
        tree.child_ids(parent_id)
            .iter()
            .filter_map(|id| tree.nodes.get(id))
            .map(|n| n.entry.clone())
            .collect()
    }

    /// Number of entries in a space, root excluded
    pub fn entry_count(&self, space: &Space) -> usize {
        self.inner
            .lock()
            .trees
            .get(space)
            .map_or(0, |t| t.nodes.len())
    }

    /// Bytes received so far for an open upload session
    pub fn uploaded_bytes(&self, upload_id: &str) -> Option<u64> {
        self.inner
            .lock()
            .uploads
            .get(upload_id)
            .map(|u| u.data.len() as u64)
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats
    }

    pub fn reset_stats(&self) {
        self.inner.lock().stats = StoreStats::default();
    }

    /// Make every request for listing page `page` fail
    pub fn fail_list_page(&self, page: u32) {
        self.inner.lock().failing_pages.insert(page);
    }

    /// The next create of `name` loses a race: another client creates the
    /// folder first and the call reports a collision
    pub fn create_conflict_once(&self, name: &str) {
        self.inner.lock().create_conflicts.insert(name.to_string());
    }

    /// Accept only `count` more range PUTs, then fail like a dropped connection
    pub fn interrupt_after_puts(&self, count: usize) {
        self.inner.lock().put_budget = Some(count);
    }

    /// Lift any PUT interruption
    pub fn restore_puts(&self) {
        self.inner.lock().put_budget = None;
    }
}

fn sort_entries(entries: &mut [Entry], order_by: OrderBy, descending: bool) {
    match order_by {
        OrderBy::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
        OrderBy::Size => entries.sort_by_key(|e| e.size),
        OrderBy::Time => entries.sort_by_key(|e| e.modified),
    }
    if descending {
        entries.reverse();
    }
}

fn root_or_lookup(tree: &Tree, space: &Space, id: &str) -> Result<Entry> {
    if id == space.root_id() {
        return Ok(Entry::root(space));
    }
    tree.nodes
        .get(id)
        .map(|n| n.entry.clone())
        .ok_or_else(|| Error::NotFound(format!("entry {id}")))
}

#[async_trait]
impl PanStore for MemoryStore {
    async fn list_children(&self, space: &Space, request: &PageRequest) -> Result<ListingPage> {
        let mut inner = self.inner.lock();
        inner.stats.list_calls += 1;
        if inner.failing_pages.contains(&request.page_number) {
            return Err(Error::Transport(format!(
                "listing page {} of {} failed",
                request.page_number, request.parent_id
            )));
        }
        if request.page_number == 0 || request.page_size == 0 {
            return Err(Error::InvalidArgument("page number and size start at 1".into()));
        }

        let tree = inner.tree(space);
        if !tree.is_folder(space, &request.parent_id) {
            return Err(Error::NotFound(format!("folder {}", request.parent_id)));
        }

        let (mut folders, mut files): (Vec<Entry>, Vec<Entry>) = tree
            .child_ids(&request.parent_id)
            .iter()
            .filter_map(|id| tree.nodes.get(id))
            .map(|n| n.entry.clone())
            .partition(|e| e.is_folder);
        sort_entries(&mut folders, request.order_by, request.descending);
        sort_entries(&mut files, request.order_by, request.descending);

        let total_count = (folders.len() + files.len()) as u64;
        let start = (request.page_number as usize - 1) * request.page_size as usize;
        let page: Vec<Entry> = folders
            .into_iter()
            .chain(files)
            .skip(start)
            .take(request.page_size as usize)
            .collect();
        let (folders, files) = page.into_iter().partition(|e| e.is_folder);

        tracing::debug!(
            "list {} page {} -> {total_count} total",
            request.parent_id,
            request.page_number
        );
        Ok(ListingPage {
            parent_id: request.parent_id.clone(),
            page_number: request.page_number,
            page_size: request.page_size,
            total_count,
            folders,
            files,
        })
    }

    async fn get_entry(&self, space: &Space, id: &str) -> Result<Entry> {
        let mut inner = self.inner.lock();
        inner.stats.get_entry_calls += 1;
        let tree = inner.tree(space);
        root_or_lookup(tree, space, id)
    }

    async fn create_folder(&self, space: &Space, parent_id: &str, name: &str) -> Result<Entry> {
        let mut inner = self.inner.lock();
        inner.stats.create_calls += 1;
        pan_core::path::validate_name(name)?;

        if inner.create_conflicts.remove(name) {
            inner.insert(space, Entry::folder("", parent_id, name), Vec::new());
            return Err(Error::AlreadyExists(format!("{name} under {parent_id}")));
        }

        let tree = inner.tree(space);
        if !tree.is_folder(space, parent_id) {
            return Err(Error::NotFound(format!("folder {parent_id}")));
        }
        if tree.child_named(parent_id, name).is_some() {
            return Err(Error::AlreadyExists(format!("{name} under {parent_id}")));
        }
        let entry = inner.insert(space, Entry::folder("", parent_id, name), Vec::new());
        tracing::debug!("created folder {name} ({}) under {parent_id}", entry.id);
        Ok(entry)
    }

    async fn rename_entry(&self, space: &Space, id: &str, new_name: &str) -> Result<Entry> {
        let mut inner = self.inner.lock();
        inner.stats.rename_calls += 1;
        pan_core::path::validate_name(new_name)?;

        let tree = inner.tree(space);
        let parent_id = match tree.nodes.get(id) {
            Some(node) => node.entry.parent_id.clone(),
            None => return Err(Error::NotFound(format!("entry {id}"))),
        };
        if tree
            .child_named(&parent_id, new_name)
            .is_some_and(|e| e.id != id)
        {
            return Err(Error::AlreadyExists(format!("{new_name} under {parent_id}")));
        }
        let node = tree
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
        node.entry.name = new_name.to_string();
        Ok(node.entry.clone())
    }

    async fn move_entries(
        &self,
        space: &Space,
        ids: &[String],
        target_id: &str,
    ) -> Result<Vec<Entry>> {
        let mut inner = self.inner.lock();
        inner.stats.move_calls += 1;

        let tree = inner.tree(space);
        if !tree.is_folder(space, target_id) {
            return Err(Error::NotFound(format!("folder {target_id}")));
        }
        for id in ids {
            let node = tree
                .nodes
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
            if tree.is_descendant(target_id, id) {
                return Err(Error::InvalidArgument(format!(
                    "cannot move {id} into its own subtree"
                )));
            }
            if node.entry.parent_id != target_id
                && tree.child_named(target_id, &node.entry.name).is_some()
            {
                return Err(Error::AlreadyExists(format!(
                    "{} under {target_id}",
                    node.entry.name
                )));
            }
        }

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(old_parent) = tree.nodes.get(id).map(|n| n.entry.parent_id.clone()) else {
                continue;
            };
            tree.detach(&old_parent, id);
            tree.children
                .entry(target_id.to_string())
                .or_default()
                .push(id.clone());
            if let Some(node) = tree.nodes.get_mut(id) {
                node.entry.parent_id = target_id.to_string();
                moved.push(node.entry.clone());
            }
        }
        Ok(moved)
    }

    async fn delete_entries(&self, space: &Space, ids: &[String]) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.stats.delete_calls += 1;

        let tree = inner.tree(space);
        if let Some(missing) = ids.iter().find(|id| !tree.nodes.contains_key(*id)) {
            return Err(Error::NotFound(format!("entry {missing}")));
        }
        for id in ids {
            let Some(parent_id) = tree.nodes.get(id).map(|n| n.entry.parent_id.clone()) else {
                continue;
            };
            tree.detach(&parent_id, id);
            tree.remove_recursive(id);
        }
        Ok(true)
    }

    async fn init_upload(&self, space: &Space, request: &UploadRequest) -> Result<TransferSession> {
        let mut inner = self.inner.lock();
        inner.stats.init_upload_calls += 1;
        pan_core::path::validate_name(&request.name)?;

        let tree = inner.tree(space);
        if !tree.is_folder(space, &request.parent_id) {
            return Err(Error::NotFound(format!("folder {}", request.parent_id)));
        }
        if tree.child_named(&request.parent_id, &request.name).is_some() {
            return Err(Error::AlreadyExists(format!(
                "{} under {}",
                request.name, request.parent_id
            )));
        }
        let file_data_exists = tree.nodes.values().any(|n| {
            !n.entry.is_folder
                && n.entry.size == request.size
                && n.entry.md5.eq_ignore_ascii_case(&request.content_md5)
        });

        // Reopening the same upload continues its session
        if let Some(existing) = inner.uploads.values().find(|u| {
            u.space == *space
                && u.request.parent_id == request.parent_id
                && u.request.name == request.name
                && u.request.content_md5 == request.content_md5
        }) {
            let mut session = existing.session.clone();
            session.committed_offset = existing.data.len() as u64;
            tracing::debug!("reopened upload {}", session.upload_id);
            return Ok(session);
        }

        let n = inner.next_id();
        let upload_id = format!("up-{n}");
        let session = TransferSession {
            upload_id: upload_id.clone(),
            total_size: request.size,
            committed_offset: 0,
            upload_url: format!("mem://upload/{upload_id}"),
            commit_url: format!("mem://commit/{upload_id}"),
            request_id: format!("req-{n}"),
            file_data_exists,
        };
        inner.uploads.insert(
            upload_id,
            Upload {
                space: *space,
                request: request.clone(),
                session: session.clone(),
                data: Vec::new(),
            },
        );
        Ok(session)
    }

    async fn commit_upload(&self, space: &Space, session: &TransferSession) -> Result<Entry> {
        let mut inner = self.inner.lock();
        inner.stats.commit_calls += 1;

        let upload = inner
            .uploads
            .remove(&session.upload_id)
            .ok_or_else(|| Error::NotFound(format!("upload {}", session.upload_id)))?;
        if upload.space != *space {
            return Err(Error::NotFound(format!("upload {}", session.upload_id)));
        }
        let request = upload.request;

        let content = if upload.session.file_data_exists {
            inner
                .tree(space)
                .nodes
                .values()
                .find(|n| !n.entry.is_folder && n.entry.md5.eq_ignore_ascii_case(&request.content_md5))
                .map(|n| n.content.clone())
                .ok_or_else(|| Error::StatusVerifyFailed(session.upload_id.clone()))?
        } else {
            if upload.data.len() as u64 != request.size
                || !md5_hex(&upload.data).eq_ignore_ascii_case(&request.content_md5)
            {
                return Err(Error::StatusVerifyFailed(format!(
                    "{}: received {} of {} bytes",
                    session.upload_id,
                    upload.data.len(),
                    request.size
                )));
            }
            upload.data
        };

        if inner
            .tree(space)
            .child_named(&request.parent_id, &request.name)
            .is_some()
        {
            return Err(Error::AlreadyExists(format!(
                "{} under {}",
                request.name, request.parent_id
            )));
        }
        let entry = Entry::file(
            "",
            &request.parent_id,
            &request.name,
            content.len() as u64,
            md5_hex(&content),
        );
        let entry = inner.insert(space, entry, content);
        tracing::debug!("committed {} as {}", session.upload_id, entry.id);
        Ok(entry)
    }

    async fn upload_status(&self, space: &Space, session: &TransferSession) -> Result<UploadStatus> {
        let mut inner = self.inner.lock();
        inner.stats.status_calls += 1;
        let upload = inner
            .uploads
            .get(&session.upload_id)
            .filter(|u| u.space == *space)
            .ok_or_else(|| Error::NotFound(format!("upload {}", session.upload_id)))?;
        Ok(UploadStatus {
            upload_id: upload.session.upload_id.clone(),
            committed_offset: upload.data.len() as u64,
            file_data_exists: upload.session.file_data_exists,
            upload_url: upload.session.upload_url.clone(),
            commit_url: upload.session.commit_url.clone(),
        })
    }

    async fn download_url(&self, space: &Space, file_id: &str) -> Result<String> {
        let mut inner = self.inner.lock();
        let tree = inner.tree(space);
        match tree.nodes.get(file_id) {
            Some(node) if !node.entry.is_folder => Ok(format!("mem://download/{file_id}")),
            Some(_) => Err(Error::InvalidArgument(format!("{file_id} is a folder"))),
            None => Err(Error::NotFound(format!("file {file_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pan_core::PERSONAL_ROOT_ID;

    fn request(parent: &str, page: u32, size: u32) -> PageRequest {
        PageRequest {
            parent_id: parent.to_string(),
            page_number: page,
            page_size: size,
            order_by: OrderBy::Name,
            descending: false,
        }
    }

    #[tokio::test]
    async fn test_listing_pages_folders_first() {
        let store = MemoryStore::new();
        let space = Space::Personal;
        store.add_file(&space, PERSONAL_ROOT_ID, "b.txt", "bb");
        store.add_folder(&space, PERSONAL_ROOT_ID, "z");
        store.add_file(&space, PERSONAL_ROOT_ID, "a.txt", "a");

        let page = store
            .list_children(&space, &request(PERSONAL_ROOT_ID, 1, 2))
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.folders[0].name, "z");
        assert_eq!(page.files[0].name, "a.txt");

        let page = store
            .list_children(&space, &request(PERSONAL_ROOT_ID, 2, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.files[0].name, "b.txt");
        assert_eq!(store.stats().list_calls, 2);
    }

    #[tokio::test]
    async fn test_spaces_are_isolated() {
        let store = MemoryStore::new();
        let family = Space::Family { family_id: 3 };
        store.add_folder(&Space::Personal, PERSONAL_ROOT_ID, "mine");
        store.add_folder(&family, family.root_id(), "ours");

        let page = store
            .list_children(&family, &request(family.root_id(), 1, 10))
            .await
            .unwrap();
        assert_eq!(page.folders.len(), 1);
        assert_eq!(page.folders[0].name, "ours");
    }

    #[tokio::test]
    async fn test_create_folder_rules() {
        let store = MemoryStore::new();
        let space = Space::Personal;
        store
            .create_folder(&space, PERSONAL_ROOT_ID, "docs")
            .await
            .unwrap();
        assert!(matches!(
            store.create_folder(&space, PERSONAL_ROOT_ID, "docs").await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_folder(&space, PERSONAL_ROOT_ID, "a|b").await,
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            store.create_folder(&space, "9999", "x").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_refuses_own_subtree() {
        let store = MemoryStore::new();
        let space = Space::Personal;
        let a = store.add_folder(&space, PERSONAL_ROOT_ID, "a");
        let b = store.add_folder(&space, &a.id, "b");
        assert!(matches!(
            store.move_entries(&space, &[a.id.clone()], &b.id).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_recursive() {
        let store = MemoryStore::new();
        let space = Space::Personal;
        let a = store.add_folder(&space, PERSONAL_ROOT_ID, "a");
        store.add_file(&space, &a.id, "f", "x");
        assert_eq!(store.entry_count(&space), 2);

        assert!(store.delete_entries(&space, &[a.id]).await.unwrap());
        assert_eq!(store.entry_count(&space), 0);
    }
}
