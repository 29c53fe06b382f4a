//! Concurrent state of the in-memory backend.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{
    gib_to_bytes, CopyProgress, CopyState, CopyStatus, DirectoryEntry, EntryKind,
    FileServiceProperties, Quota, SignedIdentifier,
};
use crate::transport::BodyStream;

type Key = (Arc<str>, Arc<str>);

fn key(account: &str, name: &str) -> Key {
    (Arc::from(account), Arc::from(name))
}

fn new_etag() -> String {
    format!("\"0x{}\"", uuid::Uuid::new_v4().simple())
}

pub(crate) fn content_md5(data: &[u8]) -> String {
    BASE64.encode(Md5::digest(data))
}

/// Parent of a `/`-separated path; the root is `""`.
pub(crate) fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn leaf_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, leaf)| leaf).unwrap_or(path)
}

/// The last copy that targeted an object.
#[derive(Debug, Clone)]
pub(crate) struct CopyRecord {
    pub id: String,
    pub status: CopyStatus,
    pub source: String,
    pub total: u64,
    /// Status polls left before a pending copy lands.
    pub polls_left: u32,
    pub completion_time: Option<DateTime<Utc>>,
    staged: Option<Snapshot>,
}

impl CopyRecord {
    pub fn state(&self) -> CopyState {
        let copied = match self.status {
            CopyStatus::Success => self.total,
            _ => 0,
        };
        CopyState {
            copy_id: self.id.clone(),
            status: self.status,
            source: Some(self.source.clone()),
            progress: Some(CopyProgress {
                copied,
                total: self.total,
            }),
            completion_time: self.completion_time,
            status_description: None,
        }
    }
}

/// Size of the zero chunks streamed for the sparse tail of an object.
const ZERO_CHUNK: u64 = 64 * 1024;

/// Content captured when a copy starts.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    data: Bytes,
    pub length: u64,
    md5: Option<String>,
}

/// A file or blob. Files may be sparse: `data` holds a prefix and the rest
/// up to `content_length` reads as zeros.
#[derive(Debug, Clone)]
pub(crate) struct ObjectModel {
    pub content_length: u64,
    data: Vec<u8>,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub copy: Option<CopyRecord>,
}

impl ObjectModel {
    pub fn sparse(content_length: u64, content_type: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            content_length,
            data: Vec::new(),
            content_type,
            content_md5: None,
            etag: new_etag(),
            last_modified: now,
            copy: None,
        }
    }

    pub fn with_content(data: &[u8], content_type: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            content_length: data.len() as u64,
            data: data.to_vec(),
            content_type,
            content_md5: Some(content_md5(data)),
            etag: new_etag(),
            last_modified: now,
            copy: None,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.etag = new_etag();
        self.last_modified = now;
    }

    /// Whole content, zero-filled past the written prefix.
    #[cfg(test)]
    pub fn content(&self) -> Bytes {
        let mut content = self.data.clone();
        content.resize(self.content_length as usize, 0);
        Bytes::from(content)
    }

    /// Written prefix and length, as a copy source sees them.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: Bytes::copy_from_slice(&self.data),
            length: self.content_length,
            md5: self.content_md5.clone(),
        }
    }

    /// Streams the inclusive byte range `start..=end`. The sparse tail is
    /// produced in zero chunks as it is read, never held whole.
    pub fn stream_range(&self, start: u64, end: u64) -> BodyStream {
        let stop = end.saturating_add(1).min(self.content_length);
        let start = start.min(stop);
        let written = self.data.len() as u64;
        let prefix = if start < written {
            Bytes::copy_from_slice(&self.data[start as usize..stop.min(written) as usize])
        } else {
            Bytes::new()
        };
        let zeros = stop - start.max(written.min(stop));
        let tail = stream::unfold(zeros, |left| async move {
            if left == 0 {
                return None;
            }
            let n = left.min(ZERO_CHUNK);
            Some((Ok(Bytes::from(vec![0u8; n as usize])), left - n))
        });
        stream::iter((!prefix.is_empty()).then(|| Ok(prefix)))
            .chain(tail)
            .boxed()
    }

    /// Streams the whole object.
    pub fn stream(&self) -> BodyStream {
        if self.content_length == 0 {
            return stream::empty().boxed();
        }
        self.stream_range(0, self.content_length - 1)
    }

    fn check_bounds(&self, offset: u64, len: u64) -> StorageResult<u64> {
        match offset.checked_add(len) {
            Some(end) if end <= self.content_length => Ok(end),
            _ => Err(StorageError::service(ServiceErrorCode::InvalidRange)),
        }
    }

    /// Writes `bytes` at `offset`; the range must lie inside the object.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8], now: DateTime<Utc>) -> StorageResult<()> {
        let end = self.check_bounds(offset, bytes.len() as u64)?;
        if (self.data.len() as u64) < end {
            self.data.resize(end as usize, 0);
        }
        self.data[offset as usize..end as usize].copy_from_slice(bytes);
        self.content_md5 = None;
        self.touch(now);
        Ok(())
    }

    /// Zeroes `len` bytes at `offset`. Only the written prefix is touched.
    pub fn clear_range(&mut self, offset: u64, len: u64, now: DateTime<Utc>) -> StorageResult<()> {
        let end = self.check_bounds(offset, len)?;
        let written = self.data.len() as u64;
        if offset < written {
            self.data[offset as usize..end.min(written) as usize].fill(0);
        }
        self.content_md5 = None;
        self.touch(now);
        Ok(())
    }

    pub fn has_pending_copy(&self) -> bool {
        matches!(self.copy, Some(ref c) if c.status == CopyStatus::Pending)
    }

    pub fn ensure_no_pending_copy(&self) -> StorageResult<()> {
        if self.has_pending_copy() {
            return Err(StorageError::service(ServiceErrorCode::PendingCopyOperation));
        }
        Ok(())
    }

    /// Starts a copy of `source` into this object. With no polls to wait
    /// for, the content lands immediately.
    pub fn begin_copy(
        &mut self,
        id: String,
        source: String,
        content: Snapshot,
        polls: u32,
        now: DateTime<Utc>,
    ) {
        let total = content.length;
        self.copy = Some(CopyRecord {
            id,
            status: CopyStatus::Pending,
            source,
            total,
            polls_left: polls,
            completion_time: None,
            staged: Some(content),
        });
        self.content_length = total;
        self.data.clear();
        self.touch(now);
        if polls == 0 {
            self.finish_copy(now);
        }
    }

    /// Counts one status poll against a pending copy.
    pub fn poll_copy(&mut self, now: DateTime<Utc>) {
        let Some(ref mut record) = self.copy else {
            return;
        };
        if record.status != CopyStatus::Pending {
            return;
        }
        record.polls_left = record.polls_left.saturating_sub(1);
        if record.polls_left == 0 {
            self.finish_copy(now);
        }
    }

    fn finish_copy(&mut self, now: DateTime<Utc>) {
        let Some(ref mut record) = self.copy else {
            return;
        };
        let content = record.staged.take().unwrap_or_default();
        record.status = CopyStatus::Success;
        record.completion_time = Some(now);
        self.content_length = content.length;
        self.content_md5 = content.md5;
        self.data = content.data.to_vec();
        self.touch(now);
    }

    /// Aborts the pending copy `id`. The object is left empty.
    pub fn abort_copy(&mut self, id: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let record = match self.copy {
            Some(ref mut record) if record.status == CopyStatus::Pending => record,
            _ => return Err(StorageError::service(ServiceErrorCode::NoPendingCopyOperation)),
        };
        if record.id != id {
            return Err(StorageError::service(ServiceErrorCode::CopyIdMismatch));
        }
        record.status = CopyStatus::Aborted;
        record.staged = None;
        record.completion_time = Some(now);
        self.content_length = 0;
        self.data.clear();
        self.content_md5 = None;
        self.touch(now);
        Ok(())
    }
}

/// A share: quota, stored policies and its directory tree.
#[derive(Debug, Clone)]
pub(crate) struct ShareModel {
    pub quota: Quota,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub policies: Vec<SignedIdentifier>,
    /// Every directory below the root, by full path.
    pub directories: BTreeSet<String>,
    /// Every file, by full path.
    pub files: BTreeMap<String, ObjectModel>,
}

impl ShareModel {
    fn new(quota: Quota, now: DateTime<Utc>) -> Self {
        Self {
            quota,
            etag: new_etag(),
            last_modified: now,
            policies: Vec::new(),
            directories: BTreeSet::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.etag = new_etag();
        self.last_modified = now;
    }

    /// Sum of the nominal lengths of every file.
    pub fn usage_bytes(&self) -> u64 {
        self.files.values().map(|f| f.content_length).sum()
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        path.is_empty() || self.directories.contains(path)
    }

    pub fn ensure_parent(&self, path: &str) -> StorageResult<()> {
        if self.directory_exists(parent_of(path)) {
            Ok(())
        } else {
            Err(StorageError::service(ServiceErrorCode::ParentNotFound))
        }
    }

    /// Fails when resizing a file from `old_len` to `new_len` grows usage
    /// past the quota. Shrinking is always allowed.
    pub fn check_growth(&self, old_len: u64, new_len: u64) -> StorageResult<()> {
        if new_len <= old_len {
            return Ok(());
        }
        if let Quota::Limit(gib) = self.quota {
            let usage = self.usage_bytes() - old_len + new_len;
            if usage > gib_to_bytes(gib) {
                return Err(StorageError::service(ServiceErrorCode::ShareSizeLimitReached));
            }
        }
        Ok(())
    }

    pub fn directory_is_empty(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        !self.directories.iter().any(|d| d.starts_with(&prefix))
            && !self.files.keys().any(|f| f.starts_with(&prefix))
    }

    /// Entries directly below `path`, directories first, each group sorted.
    pub fn list(&self, path: &str) -> Vec<DirectoryEntry> {
        let directories = self
            .directories
            .iter()
            .filter(|d| parent_of(d) == path)
            .map(|d| DirectoryEntry {
                name: leaf_of(d).to_string(),
                kind: EntryKind::Directory,
            });
        let files = self
            .files
            .iter()
            .filter(|(f, _)| parent_of(f) == path)
            .map(|(f, model)| DirectoryEntry {
                name: leaf_of(f).to_string(),
                kind: EntryKind::File {
                    content_length: model.content_length,
                },
            });
        directories.chain(files).collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ContainerModel {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub policies: Vec<SignedIdentifier>,
    pub blobs: BTreeMap<String, ObjectModel>,
}

impl ContainerModel {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            etag: new_etag(),
            last_modified: now,
            policies: Vec::new(),
            blobs: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.etag = new_etag();
        self.last_modified = now;
    }
}

/// All shares, containers and service settings, keyed by account.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    shares: DashMap<Key, ShareModel>,
    containers: DashMap<Key, ContainerModel>,
    file_service: DashMap<Arc<str>, FileServiceProperties>,
}

impl MemoryStore {
    /// Creates a share; exactly one of several racing creators wins.
    pub fn create_share(
        &self,
        account: &str,
        name: &str,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        match self.shares.entry(key(account, name)) {
            Entry::Occupied(_) => Err(StorageError::service(ServiceErrorCode::ShareAlreadyExists)),
            Entry::Vacant(slot) => {
                slot.insert(ShareModel::new(quota, now));
                Ok(())
            }
        }
    }

    pub fn delete_share(&self, account: &str, name: &str) -> StorageResult<()> {
        self.shares
            .remove(&key(account, name))
            .map(|_| ())
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ShareNotFound))
    }

    pub fn with_share<R>(
        &self,
        account: &str,
        name: &str,
        f: impl FnOnce(&ShareModel) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let share = self
            .shares
            .get(&key(account, name))
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ShareNotFound))?;
        f(share.value())
    }

    pub fn with_share_mut<R>(
        &self,
        account: &str,
        name: &str,
        f: impl FnOnce(&mut ShareModel) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut share = self
            .shares
            .get_mut(&key(account, name))
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ShareNotFound))?;
        f(share.value_mut())
    }

    /// Stored policies of a share as they stand now; empty if it is gone.
    pub fn share_policies(&self, account: &str, name: &str) -> Vec<SignedIdentifier> {
        self.shares
            .get(&key(account, name))
            .map(|s| s.policies.clone())
            .unwrap_or_default()
    }

    pub fn create_container(
        &self,
        account: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        match self.containers.entry(key(account, name)) {
            Entry::Occupied(_) => Err(StorageError::service(
                ServiceErrorCode::ContainerAlreadyExists,
            )),
            Entry::Vacant(slot) => {
                slot.insert(ContainerModel::new(now));
                Ok(())
            }
        }
    }

    pub fn delete_container(&self, account: &str, name: &str) -> StorageResult<()> {
        self.containers
            .remove(&key(account, name))
            .map(|_| ())
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ContainerNotFound))
    }

    pub fn with_container<R>(
        &self,
        account: &str,
        name: &str,
        f: impl FnOnce(&ContainerModel) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let container = self
            .containers
            .get(&key(account, name))
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ContainerNotFound))?;
        f(container.value())
    }

    pub fn with_container_mut<R>(
        &self,
        account: &str,
        name: &str,
        f: impl FnOnce(&mut ContainerModel) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut container = self
            .containers
            .get_mut(&key(account, name))
            .ok_or_else(|| StorageError::service(ServiceErrorCode::ContainerNotFound))?;
        f(container.value_mut())
    }

    pub fn container_policies(&self, account: &str, name: &str) -> Vec<SignedIdentifier> {
        self.containers
            .get(&key(account, name))
            .map(|c| c.policies.clone())
            .unwrap_or_default()
    }

    pub fn file_service_properties(&self, account: &str) -> FileServiceProperties {
        self.file_service
            .get(account)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn set_file_service_properties(&self, account: &str, properties: FileServiceProperties) {
        self.file_service.insert(Arc::from(account), properties);
    }
}
