//! Byte transport for the in-memory drive
//!
//! Understands the `mem://upload/{id}` and `mem://download/{id}` URLs handed
//! out by [`MemoryStore`] and enforces the range rules of the real service:
//! an upload range must start exactly at the bytes already received.

use async_trait::async_trait;
use futures::StreamExt;

use pan_core::{Error, GetResponse, PutResponse, RangeRequest, Result, Transport};

use crate::store::MemoryStore;

const UPLOAD_PREFIX: &str = "mem://upload/";
const DOWNLOAD_PREFIX: &str = "mem://download/";

/// Chunk size of download bodies
const BODY_CHUNK: usize = 64 * 1024;

/// Parse `bytes=start-end` (end exclusive) from an upload range header
fn parse_upload_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Parse `bytes=start-[end]` (end inclusive) from a download range header
fn parse_download_range(value: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start.parse().ok()?, end))
}

fn rejected(status: u16, code: &str) -> PutResponse {
    PutResponse {
        status,
        error_code: Some(code.to_string()),
        acked_offset: None,
    }
}

fn empty_body(status: u16) -> GetResponse {
    GetResponse {
        status,
        error_code: None,
        body: futures::stream::empty().boxed(),
    }
}

#[async_trait]
impl Transport for MemoryStore {
    async fn put(&self, request: RangeRequest, body: Vec<u8>) -> Result<PutResponse> {
        let mut inner = self.inner.lock();
        inner.stats.put_calls += 1;

        if let Some(budget) = inner.put_budget.as_mut() {
            if *budget == 0 {
                return Err(Error::Transport("connection reset by peer".into()));
            }
            *budget -= 1;
        }

        let upload_id = request
            .url
            .strip_prefix(UPLOAD_PREFIX)
            .ok_or_else(|| Error::Transport(format!("unknown upload url {}", request.url)))?;
        let Some(upload) = inner.uploads.get_mut(upload_id) else {
            return Ok(rejected(404, "UploadFileNotFound"));
        };
        if request.header_value("UploadFileId") != Some(upload_id) {
            return Ok(rejected(400, "InvalidArgument"));
        }
        let Some((start, end)) = request
            .header_value("Edrive-UploadFileRange")
            .and_then(parse_upload_range)
        else {
            return Ok(rejected(400, "InvalidArgument"));
        };
        if end < start || end - start != body.len() as u64 {
            return Ok(rejected(400, "InvalidArgument"));
        }

        let received = upload.data.len() as u64;
        if start != received {
            tracing::debug!("upload {upload_id}: range starts at {start}, have {received}");
            return Ok(rejected(400, "UploadOffsetVerifyFailed"));
        }
        if end > upload.session.total_size {
            return Ok(rejected(400, "InvalidArgument"));
        }

        upload.data.extend_from_slice(&body);
        Ok(PutResponse {
            status: 200,
            error_code: None,
            acked_offset: Some(end),
        })
    }

    async fn get(&self, request: RangeRequest) -> Result<GetResponse> {
        let content = {
            let mut inner = self.inner.lock();
            inner.stats.get_calls += 1;
            let file_id = request
                .url
                .strip_prefix(DOWNLOAD_PREFIX)
                .ok_or_else(|| Error::Transport(format!("unknown download url {}", request.url)))?;
            inner
                .trees
                .values()
                .find_map(|t| t.nodes.get(file_id))
                .filter(|n| !n.entry.is_folder)
                .map(|n| n.content.clone())
        };
        let Some(content) = content else {
            return Ok(empty_body(404));
        };

        let len = content.len() as u64;
        let (status, slice) = match request.header_value("Range") {
            None => (200, content),
            Some(value) => {
                let Some((start, end)) = parse_download_range(value) else {
                    return Ok(empty_body(416));
                };
                let last = end.unwrap_or(len.saturating_sub(1)).min(len.saturating_sub(1));
                if start >= len || last < start {
                    return Ok(empty_body(416));
                }
                (206, content[start as usize..=last as usize].to_vec())
            }
        };

        let chunks: Vec<Result<Vec<u8>>> = slice
            .chunks(BODY_CHUNK)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(GetResponse {
            status,
            error_code: None,
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
