//! Download side of the transfer controller

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::TransferController;
use crate::error::{Error, Result};
use crate::traits::{ByteStream, RangeRequest};

/// Byte range of a download.
///
/// `end` is inclusive; `end == 0` means "to the end of the file". The zero
/// range requests the whole file without any range header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub end: u64,
}

impl ByteRange {
    /// The whole file
    pub const FULL: ByteRange = ByteRange { offset: 0, end: 0 };

    /// From `offset` to the end of the file
    pub const fn from_offset(offset: u64) -> Self {
        Self { offset, end: 0 }
    }

    /// Inclusive range `[offset, end]`
    pub const fn new(offset: u64, end: u64) -> Self {
        Self { offset, end }
    }

    /// Whether a range header has to be sent
    pub const fn is_ranged(&self) -> bool {
        self.offset != 0 || self.end != 0
    }

    /// `Range` header value, if any
    pub fn header_value(&self) -> Option<String> {
        match (self.is_ranged(), self.end) {
            (false, _) => None,
            (true, 0) => Some(format!("bytes={}-", self.offset)),
            (true, end) => Some(format!("bytes={}-{end}", self.offset)),
        }
    }
}

impl TransferController {
    /// Stream the bytes of a file, optionally restricted to a range
    pub async fn download(&self, file_id: &str, range: ByteRange) -> Result<ByteStream> {
        if file_id.is_empty() {
            return Err(Error::InvalidArgument("file id is required".into()));
        }
        if range.end != 0 && range.end < range.offset {
            return Err(Error::InvalidArgument(format!(
                "range end {} precedes offset {}",
                range.end, range.offset
            )));
        }

        let url = self
            .session
            .store()
            .download_url(self.session.space(), file_id)
            .await?;
        let mut request = RangeRequest::new(url);
        if let Some(value) = range.header_value() {
            request = request.header("Range", value);
        }

        tracing::debug!("download {file_id}: {range:?}");
        let response = self.transport().get(request).await?;
        match response.status {
            206 => Ok(response.body),
            200 if !range.is_ranged() => Ok(response.body),
            200 => {
                tracing::warn!("download {file_id}: server ignored range {range:?}");
                Err(Error::Transport(format!(
                    "download of {file_id} ignored the requested range starting at {}",
                    range.offset
                )))
            }
            404 => Err(Error::NotFound(format!("file {file_id}"))),
            416 => Err(Error::InvalidArgument(format!(
                "range starting at {} is not satisfiable for {file_id}",
                range.offset
            ))),
            status => Err(match response.error_code.as_deref() {
                Some(code) => Error::from_api_code(code, format!("download of {file_id}")),
                None => Error::Transport(format!(
                    "download of {file_id} failed with status {status}"
                )),
            }),
        }
    }

    /// Download a file to `dest`, continuing a partial local copy.
    ///
    /// Returns the final local size.
    pub async fn download_to_file(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let entry = self
            .session
            .store()
            .get_entry(self.session.space(), file_id)
            .await?;
        if entry.is_folder {
            return Err(Error::InvalidArgument(format!("{file_id} is a folder")));
        }

        let mut existing = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if existing > entry.size {
            tracing::warn!(
                "{} is larger than the remote file, downloading again",
                dest.display()
            );
            existing = 0;
        }
        if existing == entry.size && existing > 0 {
            tracing::debug!("{} already complete", dest.display());
            return Ok(existing);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(existing == 0)
            .append(existing > 0)
            .open(dest)
            .await?;

        if existing > 0 {
            tracing::info!("resuming {} at byte {existing}", dest.display());
        }
        let mut body = self
            .download(file_id, ByteRange::from_offset(existing))
            .await?;
        let mut written = existing;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written != entry.size {
            return Err(Error::Transport(format!(
                "download of {file_id} ended at {written} of {} bytes",
                entry.size
            )));
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;

    use super::*;
    use crate::entry::{Entry, Space};
    use crate::session::Session;
    use crate::traits::{GetResponse, MockPanStore, MockTransport};

    fn body(chunks: Vec<Vec<u8>>) -> ByteStream {
        stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    fn store_with_url() -> MockPanStore {
        let mut store = MockPanStore::new();
        store
            .expect_download_url()
            .returning(|_, id| Ok(format!("mem://download/{id}")));
        store
    }

    fn controller(store: MockPanStore, transport: MockTransport) -> TransferController {
        TransferController::new(Session::new(Arc::new(store), Space::Personal), Arc::new(transport))
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat()
    }

    #[test]
    fn test_byte_range_header() {
        assert_eq!(ByteRange::FULL.header_value(), None);
        assert_eq!(ByteRange::from_offset(100).header_value().as_deref(), Some("bytes=100-"));
        assert_eq!(ByteRange::new(0, 99).header_value().as_deref(), Some("bytes=0-99"));
        assert_eq!(ByteRange::new(10, 20).header_value().as_deref(), Some("bytes=10-20"));
    }

    #[tokio::test]
    async fn test_full_download_sends_no_range() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .withf(|req| req.url == "mem://download/f1" && req.header_value("Range").is_none())
            .times(1)
            .returning(|_| {
                Ok(GetResponse {
                    status: 200,
                    error_code: None,
                    body: body(vec![b"hello ".to_vec(), b"world".to_vec()]),
                })
            });
        let controller = controller(store_with_url(), transport);
        let stream = controller.download("f1", ByteRange::FULL).await.unwrap();
        assert_eq!(collect(stream).await, b"hello world");
    }

    #[tokio::test]
    async fn test_ranged_download() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .withf(|req| req.header_value("Range") == Some("bytes=6-"))
            .returning(|_| {
                Ok(GetResponse {
                    status: 206,
                    error_code: None,
                    body: body(vec![b"world".to_vec()]),
                })
            });
        let controller = controller(store_with_url(), transport);
        let stream = controller
            .download("f1", ByteRange::from_offset(6))
            .await
            .unwrap();
        assert_eq!(collect(stream).await, b"world");
    }

    #[tokio::test]
    async fn test_ignored_range_is_an_error() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|_| {
            Ok(GetResponse {
                status: 200,
                error_code: None,
                body: body(vec![b"hello world".to_vec()]),
            })
        });
        let controller = controller(store_with_url(), transport);
        assert!(matches!(
            controller.download("f1", ByteRange::from_offset(6)).await,
            Err(Error::Transport(_))
        ));
        // A bounded range from the start must not yield the whole file either
        assert!(matches!(
            controller.download("f1", ByteRange::new(0, 4)).await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_download_status_mapping() {
        let mut transport = MockTransport::new();
        transport.expect_get().returning(|req| {
            let status = if req.header_value("Range").is_some() { 416 } else { 404 };
            Ok(GetResponse {
                status,
                error_code: None,
                body: body(Vec::new()),
            })
        });
        let controller = controller(store_with_url(), transport);
        assert!(matches!(
            controller.download("f1", ByteRange::FULL).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            controller.download("f1", ByteRange::from_offset(500)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.download("f1", ByteRange::new(10, 5)).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_download_to_file_resumes() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, b"hello ").unwrap();

        let mut store = store_with_url();
        store
            .expect_get_entry()
            .returning(|_, id| Ok(Entry::file(id, "-11", "out.txt", 11, "X")));
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .withf(|req| req.header_value("Range") == Some("bytes=6-"))
            .times(1)
            .returning(|_| {
                Ok(GetResponse {
                    status: 206,
                    error_code: None,
                    body: body(vec![b"world".to_vec()]),
                })
            });

        let controller = controller(store, transport);
        let size = controller.download_to_file("f1", &dest).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");

        // Already complete: no further request
        assert_eq!(controller.download_to_file("f1", &dest).await.unwrap(), 11);
    }
}
