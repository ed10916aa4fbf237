//! Directory Creator (mkdir -p)

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::path;
use crate::session::Session;

impl Session {
    /// Make sure every folder of `path` exists and return the last one.
    ///
    /// Existing segments are reused; missing ones are validated and created.
    /// Once a folder has been created its (empty) contents are not listed
    /// again. When the create RPC reports a name collision (another client
    /// won the race) the folder is looked up once more and reused.
    pub async fn ensure_path(&self, path: &str) -> Result<Entry> {
        let (normalized, segments) = path::absolute_segments(path)?;
        let mut parent = self.root();
        let mut parent_is_new = false;

        for (index, name) in segments.iter().enumerate() {
            let current_path = path::prefix(&segments, index + 1);

            let existing = if parent_is_new {
                None
            } else {
                self.find_child(&parent, name).await?
            };

            let mut next = match existing {
                Some(found) if found.is_folder => {
                    parent_is_new = false;
                    found
                }
                Some(_) => {
                    return Err(Error::AlreadyExists(format!(
                        "{current_path} exists and is not a folder"
                    )));
                }
                None => {
                    path::validate_name(name)?;
                    let (folder, created) =
                        self.create_or_reuse(&parent, name, &current_path).await?;
                    parent_is_new = created;
                    folder
                }
            };

            next.parent_id = parent.id.clone();
            next.path = current_path;
            self.remember(&next);
            parent = next;
        }

        tracing::debug!("ensured {normalized} -> {}", parent.id);
        Ok(parent)
    }

    /// First child of `parent` named exactly `name`
    async fn find_child(&self, parent: &Entry, name: &str) -> Result<Option<Entry>> {
        let children = self.list_all(&parent.id).await?;
        Ok(children.into_iter().find(|c| c.name == name))
    }

    /// Create `name` under `parent`; the flag tells whether this call created it
    async fn create_or_reuse(
        &self,
        parent: &Entry,
        name: &str,
        current_path: &str,
    ) -> Result<(Entry, bool)> {
        match self
            .store()
            .create_folder(self.space(), &parent.id, name)
            .await
        {
            Ok(created) => {
                tracing::debug!("created folder {current_path} ({})", created.id);
                Ok((created, true))
            }
            Err(Error::AlreadyExists(msg)) => {
                tracing::warn!("folder {current_path} appeared concurrently, reusing it");
                match self.find_child(parent, name).await? {
                    Some(found) if found.is_folder => Ok((found, false)),
                    _ => Err(Error::AlreadyExists(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }
}
