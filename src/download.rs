//! Streaming downloads to the local filesystem.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::StorageResult;
use crate::transport::StorageResponse;

/// What happens to an existing local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownloadMode {
    /// Truncate, or create it.
    #[default]
    Overwrite,
    /// Append to it, or create it.
    Append,
}

/// Writes a response body to `path`, chunk by chunk. Returns bytes written.
///
/// The file is opened only after the response arrived, so a failed request
/// leaves the local file untouched.
pub(crate) async fn write_body(
    response: StorageResponse,
    path: &Path,
    mode: DownloadMode,
) -> StorageResult<u64> {
    let mut options = OpenOptions::new();
    match mode {
        DownloadMode::Overwrite => options.write(true).create(true).truncate(true),
        DownloadMode::Append => options.append(true).create(true),
    };
    let mut file = options.open(path).await?;

    let mut body = response.body;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::debug!(path = %path.display(), bytes = written, ?mode, "download written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};

    #[tokio::test]
    async fn test_overwrite_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        tokio::fs::write(&path, "stale contents").await.unwrap();

        let response = StorageResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "first");
        assert_eq!(write_body(response, &path, DownloadMode::Overwrite).await.unwrap(), 5);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "first");

        let response = StorageResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "+second");
        write_body(response, &path, DownloadMode::Append).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "first+second");
    }

    #[tokio::test]
    async fn test_append_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        let response = StorageResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "x");
        write_body(response, &path, DownloadMode::Append).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "x");
    }
}
