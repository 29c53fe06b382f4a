//! File, directory and blob data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::copy::CopyState;
use crate::context::parse_http_date;
use crate::transport::StorageResponse;

/// Properties of a file or blob, read from a HEAD response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Last copy operation that targeted this object.
    pub copy: Option<CopyState>,
}

impl ObjectProperties {
    pub(crate) fn from_response(response: &StorageResponse) -> Self {
        Self {
            content_length: response.header_as("content-length").unwrap_or(0),
            content_type: response.header("content-type").map(String::from),
            content_md5: response.header("content-md5").map(String::from),
            etag: response.header("etag").map(String::from),
            last_modified: response.header("last-modified").and_then(parse_http_date),
            copy: CopyState::from_headers(&response.headers),
        }
    }
}

/// Kind of an entry in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File { content_length: u64 },
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }
}
