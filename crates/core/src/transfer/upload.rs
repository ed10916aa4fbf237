//! Upload side of the transfer controller

use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use super::{TransferController, UploadPhase, UploadState, chunk_ranges, file_digests};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::path;
use crate::traits::{RangeRequest, TransferSession, UploadRequest, UploadStatus};

/// Service error code for a range that does not start at the committed offset
const OFFSET_VERIFY_FAILED: &str = "UploadOffsetVerifyFailed";

impl TransferController {
    /// Open (or reopen) an upload session
    pub async fn begin_upload(&self, request: &UploadRequest) -> Result<TransferSession> {
        if request.parent_id.is_empty() {
            return Err(Error::InvalidArgument("parent id is required".into()));
        }
        let space = self.session.space();
        let transfer = self.session.store().init_upload(space, request).await?;
        tracing::debug!(
            "opened upload {} for {} ({} bytes, committed {})",
            transfer.upload_id,
            request.name,
            transfer.total_size,
            transfer.committed_offset
        );
        Ok(transfer)
    }

    /// Ask the server how far an upload has progressed
    pub async fn upload_status(&self, transfer: &TransferSession) -> Result<UploadStatus> {
        self.session
            .store()
            .upload_status(self.session.space(), transfer)
            .await
    }

    /// Resynchronize a session with the server's authoritative state
    pub async fn resume(&self, transfer: &mut TransferSession) -> Result<UploadPhase> {
        let status = self.upload_status(transfer).await?;
        if status.committed_offset != transfer.committed_offset {
            tracing::info!(
                "upload {}: server has {} bytes, local view was {}",
                transfer.upload_id,
                status.committed_offset,
                transfer.committed_offset
            );
        }
        transfer.committed_offset = status.committed_offset;
        transfer.file_data_exists = status.file_data_exists;
        if !status.upload_url.is_empty() {
            transfer.upload_url = status.upload_url;
        }
        if !status.commit_url.is_empty() {
            transfer.commit_url = status.commit_url;
        }
        Ok(UploadPhase::of(transfer))
    }

    /// Send `data` as the range starting at `offset`.
    ///
    /// On success the session's committed offset moves to the end of the
    /// range and is returned. A rejected offset surfaces as
    /// [`Error::OffsetVerifyFailed`]; call [`resume`](Self::resume) before
    /// sending anything else.
    pub async fn put_range(
        &self,
        transfer: &mut TransferSession,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<u64> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty upload range".into()));
        }
        let len = data.len() as u64;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= transfer.total_size)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "range of {len} bytes at {offset} exceeds file size {}",
                    transfer.total_size
                ))
            })?;

        let request = RangeRequest::new(&transfer.upload_url)
            .header("Content-Type", "application/octet-stream")
            .header("Edrive-UploadFileRange", format!("bytes={offset}-{end}"))
            .header("UploadFileId", &transfer.upload_id)
            .header("ResumePolicy", "1")
            .header("X-Request-ID", &transfer.request_id);

        tracing::debug!("upload {}: PUT bytes {offset}-{end}", transfer.upload_id);
        let response = self.transport().put(request, data).await?;

        if let Some(code) = response.error_code.as_deref() {
            if code == OFFSET_VERIFY_FAILED {
                return Err(Error::OffsetVerifyFailed {
                    context: format!("upload {}", transfer.upload_id),
                    offset: Some(offset),
                });
            }
            return Err(Error::from_api_code(
                code,
                format!("upload {} range {offset}-{end}", transfer.upload_id),
            ));
        }
        if !(200..300).contains(&response.status) {
            return Err(Error::Transport(format!(
                "upload {} range {offset}-{end} failed with status {}",
                transfer.upload_id, response.status
            )));
        }
        if let Some(acked) = response.acked_offset
            && acked != end
        {
            tracing::warn!(
                "upload {}: sent up to {end}, server acknowledged {acked}",
                transfer.upload_id
            );
            return Err(Error::OffsetVerifyFailed {
                context: format!("upload {}", transfer.upload_id),
                offset: Some(acked),
            });
        }

        transfer.committed_offset = end;
        Ok(end)
    }

    /// Finalize an upload
    pub async fn commit(&self, transfer: &TransferSession) -> Result<Entry> {
        let entry = self
            .session
            .store()
            .commit_upload(self.session.space(), transfer)
            .await?;
        tracing::debug!("upload {} committed as {}", transfer.upload_id, entry.id);
        Ok(entry)
    }

    /// Upload a seekable source end to end.
    ///
    /// Opens the session, asks the server where to continue, seeks the reader
    /// there and sends the remaining chunks in order before committing.
    pub async fn upload_reader<R>(&self, request: &UploadRequest, reader: &mut R) -> Result<Entry>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let mut transfer = self.begin_upload(request).await?;
        self.drive(&mut transfer, reader, |_| Ok(())).await
    }

    /// Upload a local file to `remote_path`, creating missing parent folders.
    ///
    /// With a state directory configured, progress is persisted after every
    /// chunk and an interrupted upload of the same content is resumed on the
    /// next call.
    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> Result<Entry> {
        let (normalized, _) = path::absolute_segments(remote_path)?;
        let (parent_path, name) = path::split_parent(&normalized).ok_or_else(|| {
            Error::InvalidArgument(format!("'{remote_path}' does not name a file"))
        })?;
        path::validate_name(&name)?;

        let digests = file_digests(local, self.chunk_size).await?;
        let parent = self.session.ensure_path(&parent_path).await?;
        let request = UploadRequest {
            parent_id: parent.id.clone(),
            name,
            size: digests.size,
            content_md5: digests.content_md5.clone(),
            slice_md5: digests.slice_md5,
            slice_size: self.chunk_size,
        };

        let mut file = tokio::fs::File::open(local).await?;
        let mut entry = match self.state_dir.clone() {
            None => self.upload_reader(&request, &mut file).await?,
            Some(dir) => {
                let mut state = match self.pending_state(&dir, &normalized, &request)? {
                    Some(state) => state,
                    None => {
                        let transfer = self.begin_upload(&request).await?;
                        UploadState::new(
                            &normalized,
                            *self.session.space(),
                            &request.content_md5,
                            transfer,
                        )
                        .with_source(local.display().to_string())
                    }
                };
                state.save(&dir)?;
                let mut transfer = state.session.clone();

                let result = self
                    .drive(&mut transfer, &mut file, |offset| {
                        state.record_progress(offset);
                        state.save(&dir)
                    })
                    .await;

                match &result {
                    Ok(_) => UploadState::delete(&dir, &transfer.upload_id)?,
                    Err(e) if e.requires_restart() || e.is_not_found() => {
                        UploadState::delete(&dir, &transfer.upload_id)?
                    }
                    Err(_) => {}
                }
                result?
            }
        };

        entry.parent_id = parent.id;
        entry.path = normalized;
        tracing::info!("uploaded {} -> {}", local.display(), entry.path);
        Ok(entry)
    }

    /// Persisted session for the same target and content, if one exists
    fn pending_state(
        &self,
        dir: &Path,
        target: &str,
        request: &UploadRequest,
    ) -> Result<Option<UploadState>> {
        for state in UploadState::find_pending(dir, target)? {
            if state.matches(self.session.space(), request.size, &request.content_md5) {
                tracing::info!(
                    "resuming upload {} of {target} ({:.0}% recorded)",
                    state.session.upload_id,
                    state.progress_percent()
                );
                return Ok(Some(state));
            }
            // Stale state for different content
            UploadState::delete(dir, &state.session.upload_id)?;
        }
        Ok(None)
    }

    /// Status check, seek, chunk loop and commit for an open session
    async fn drive<R, F>(
        &self,
        transfer: &mut TransferSession,
        reader: &mut R,
        mut on_progress: F,
    ) -> Result<Entry>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
        F: FnMut(u64) -> Result<()> + Send,
    {
        match self.resume(transfer).await? {
            UploadPhase::FileDataExists => {
                tracing::info!(
                    "upload {}: content already on server, committing",
                    transfer.upload_id
                );
            }
            UploadPhase::Uploading { offset } => {
                reader.seek(SeekFrom::Start(offset)).await?;
                for (start, len) in chunk_ranges(offset, transfer.total_size, self.chunk_size) {
                    let len = usize::try_from(len).map_err(|_| {
                        Error::InvalidArgument(format!("chunk of {len} bytes is too large"))
                    })?;
                    let mut buf = vec![0u8; len];
                    reader.read_exact(&mut buf).await?;
                    let committed = self.put_range(transfer, start, buf).await?;
                    on_progress(committed)?;
                }
            }
            UploadPhase::Init | UploadPhase::Committing | UploadPhase::Done => {}
        }

        self.commit(transfer).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::entry::{PERSONAL_ROOT_ID, Space};
    use crate::session::Session;
    use crate::traits::{MockPanStore, MockTransport, PutResponse};

    const CHUNK: u64 = super::super::MIN_CHUNK_SIZE;

    fn request(size: u64) -> UploadRequest {
        UploadRequest {
            parent_id: PERSONAL_ROOT_ID.to_string(),
            name: "data.bin".to_string(),
            size,
            content_md5: "C0FFEE".to_string(),
            slice_md5: "C0FFEE".to_string(),
            slice_size: CHUNK,
        }
    }

    fn transfer(size: u64) -> TransferSession {
        TransferSession {
            upload_id: "up-1".to_string(),
            total_size: size,
            committed_offset: 0,
            upload_url: "mem://upload/up-1".to_string(),
            commit_url: "mem://commit/up-1".to_string(),
            request_id: "req-1".to_string(),
            file_data_exists: false,
        }
    }

    fn status(committed: u64, exists: bool) -> UploadStatus {
        UploadStatus {
            upload_id: "up-1".to_string(),
            committed_offset: committed,
            file_data_exists: exists,
            upload_url: String::new(),
            commit_url: String::new(),
        }
    }

    fn ok_put() -> PutResponse {
        PutResponse {
            status: 200,
            error_code: None,
            acked_offset: None,
        }
    }

    fn controller(store: MockPanStore, transport: MockTransport) -> TransferController {
        let session = Session::new(Arc::new(store), Space::Personal);
        TransferController::new(session, Arc::new(transport)).with_chunk_size(CHUNK)
    }

    #[tokio::test]
    async fn test_put_range_builds_headers() {
        let mut transport = MockTransport::new();
        transport
            .expect_put()
            .withf(|req, body| {
                req.url == "mem://upload/up-1"
                    && req.header_value("Edrive-UploadFileRange") == Some("bytes=100-150")
                    && req.header_value("UploadFileId") == Some("up-1")
                    && req.header_value("ResumePolicy") == Some("1")
                    && req.header_value("X-Request-ID") == Some("req-1")
                    && body.len() == 50
            })
            .times(1)
            .returning(|_, _| Ok(ok_put()));

        let controller = controller(MockPanStore::new(), transport);
        let mut session = transfer(1000);
        session.committed_offset = 100;
        let committed = controller
            .put_range(&mut session, 100, vec![7u8; 50])
            .await
            .unwrap();
        assert_eq!(committed, 150);
        assert_eq!(session.committed_offset, 150);
    }

    #[tokio::test]
    async fn test_put_range_offset_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_put().returning(|_, _| {
            Ok(PutResponse {
                status: 400,
                error_code: Some("UploadOffsetVerifyFailed".to_string()),
                acked_offset: None,
            })
        });
        let controller = controller(MockPanStore::new(), transport);
        let mut session = transfer(1000);
        let err = controller
            .put_range(&mut session, 0, vec![1u8; 10])
            .await
            .unwrap_err();
        assert!(err.is_resumable());
        assert_eq!(session.committed_offset, 0);
    }

    #[tokio::test]
    async fn test_put_range_ack_mismatch() {
        let mut transport = MockTransport::new();
        transport.expect_put().returning(|_, _| {
            Ok(PutResponse {
                status: 200,
                error_code: None,
                acked_offset: Some(5),
            })
        });
        let controller = controller(MockPanStore::new(), transport);
        let mut session = transfer(1000);
        assert!(matches!(
            controller.put_range(&mut session, 0, vec![1u8; 10]).await,
            Err(Error::OffsetVerifyFailed { offset: Some(5), .. })
        ));
    }

    #[tokio::test]
    async fn test_put_range_rejects_overflow_and_empty() {
        let controller = controller(MockPanStore::new(), MockTransport::new());
        let mut session = transfer(10);
        assert!(matches!(
            controller.put_range(&mut session, 5, vec![0u8; 10]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.put_range(&mut session, 0, Vec::new()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.put_range(&mut session, u64::MAX - 1, vec![0u8; 10]).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(session.committed_offset, 0);
    }

    #[tokio::test]
    async fn test_upload_resumes_at_committed_offset() {
        let total = 3 * CHUNK;
        let mut store = MockPanStore::new();
        store
            .expect_init_upload()
            .times(1)
            .returning(move |_, _| Ok(transfer(total)));
        store
            .expect_upload_status()
            .times(1)
            .returning(|_, _| Ok(status(4096, false)));
        store
            .expect_commit_upload()
            .withf(move |_, t| t.committed_offset == total)
            .times(1)
            .returning(move |_, _| Ok(Entry::file("f1", PERSONAL_ROOT_ID, "data.bin", total, "C0FFEE")));

        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        let mut expected = 4096u64;
        for (start, len) in chunk_ranges(4096, total, CHUNK) {
            assert_eq!(start, expected);
            expected += len;
            let header = format!("bytes={start}-{}", start + len);
            transport
                .expect_put()
                .withf(move |req, body| {
                    req.header_value("Edrive-UploadFileRange") == Some(header.as_str())
                        && body.len() as u64 == len
                        && body[0] == (start % 251) as u8
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(ok_put()));
        }

        let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
        let controller = controller(store, transport);
        let entry = controller
            .upload_reader(&request(total), &mut Cursor::new(data))
            .await
            .unwrap();
        assert_eq!(entry.id, "f1");
    }

    #[tokio::test]
    async fn test_file_data_exists_skips_transfer() {
        let mut store = MockPanStore::new();
        store.expect_init_upload().returning(|_, _| {
            let mut t = transfer(100);
            t.file_data_exists = true;
            Ok(t)
        });
        store
            .expect_upload_status()
            .returning(|_, _| Ok(status(0, true)));
        store
            .expect_commit_upload()
            .times(1)
            .returning(|_, _| Ok(Entry::file("f1", PERSONAL_ROOT_ID, "data.bin", 100, "C0FFEE")));
        let mut transport = MockTransport::new();
        transport.expect_put().never();

        let controller = controller(store, transport);
        let entry = controller
            .upload_reader(&request(100), &mut Cursor::new(vec![0u8; 100]))
            .await
            .unwrap();
        assert_eq!(entry.id, "f1");
    }

    #[tokio::test]
    async fn test_failed_put_is_not_retried() {
        let mut store = MockPanStore::new();
        store.expect_init_upload().returning(|_, _| Ok(transfer(100)));
        store
            .expect_upload_status()
            .returning(|_, _| Ok(status(0, false)));
        store.expect_commit_upload().never();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut transport = MockTransport::new();
        transport.expect_put().returning(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport("connection reset".into()))
        });

        let controller = controller(store, transport);
        let err = controller
            .upload_reader(&request(100), &mut Cursor::new(vec![0u8; 100]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_status_failure_requires_restart() {
        let mut store = MockPanStore::new();
        store.expect_init_upload().returning(|_, _| Ok(transfer(10)));
        store
            .expect_upload_status()
            .returning(|_, _| Ok(status(10, false)));
        store
            .expect_commit_upload()
            .returning(|_, _| Err(Error::StatusVerifyFailed("up-1".into())));
        let mut transport = MockTransport::new();
        transport.expect_put().never();

        let controller = controller(store, transport);
        let err = controller
            .upload_reader(&request(10), &mut Cursor::new(vec![0u8; 10]))
            .await
            .unwrap_err();
        assert!(err.requires_restart());
    }

    #[tokio::test]
    async fn test_begin_upload_requires_parent() {
        let controller = controller(MockPanStore::new(), MockTransport::new());
        let mut req = request(1);
        req.parent_id.clear();
        assert!(matches!(
            controller.begin_upload(&req).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
