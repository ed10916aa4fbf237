//! Content digests used to open upload sessions

use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Uppercase hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode_upper(Md5::digest(data))
}

/// Size and digests of a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub size: u64,
    /// MD5 of the whole content
    pub content_md5: String,
    /// MD5 of the first `chunk_size` bytes
    pub slice_md5: String,
}

/// Stream a file once, computing the whole-content and first-chunk digests
pub async fn file_digests(path: &Path, chunk_size: u64) -> Result<FileDigests> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut content = Md5::new();
    let mut slice = Md5::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let data = &buf[..n];
        content.update(data);
        if size < chunk_size {
            let take = usize::try_from(chunk_size - size).map_or(n, |room| room.min(n));
            slice.update(&data[..take]);
        }
        size += n as u64;
    }

    Ok(FileDigests {
        size,
        content_md5: hex::encode_upper(content.finalize()),
        slice_md5: hex::encode_upper(slice.finalize()),
    })
}
