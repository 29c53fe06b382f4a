//! Directory handle.

use http::Method;
use url::Url;

use super::{FileHandle, ShareHandle};
use crate::account::resource_url;
use crate::error::{true_unless, ErrorKind, StorageResult};
use crate::models::{validate_path_component, DirectoryEntry};
use crate::transport::StorageRequest;
use crate::xml::parse_directory_listing;

/// Splits `a/b/c` into components, dropping empty ones.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('/').filter(|s| !s.is_empty()).map(String::from)
}

/// Locator for a directory inside a share. The root directory has an
/// empty path.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    share: ShareHandle,
    path: Vec<String>,
    url: Url,
}

impl DirectoryHandle {
    pub(crate) fn new(share: ShareHandle, path: Vec<String>) -> Self {
        let mut segments: Vec<&str> = vec![share.name()];
        segments.extend(path.iter().map(String::as_str));
        let url = resource_url(share.endpoint(), &segments);
        Self { share, path, url }
    }

    pub fn share(&self) -> &ShareHandle {
        &self.share
    }

    /// Path from the share root, `/`-separated; empty for the root.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Handle to a directory below this one. `name` may contain `/`.
    pub fn subdirectory(&self, name: &str) -> DirectoryHandle {
        let mut path = self.path.clone();
        path.extend(split_path(name));
        DirectoryHandle::new(self.share.clone(), path)
    }

    /// Handle to a file in this directory. `name` may contain `/`.
    pub fn file(&self, name: &str) -> FileHandle {
        let mut path = self.path.clone();
        path.extend(split_path(name));
        FileHandle::new(self.share.clone(), path)
    }

    fn directory_request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.url.clone()).query("restype", "directory")
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        let result = self
            .share
            .pipeline()
            .send(self.directory_request(Method::HEAD))
            .await;
        true_unless(result.map(|_| ()), ErrorKind::NotFound)
    }

    /// Creates the directory. The parent must exist.
    pub async fn create(&self) -> StorageResult<()> {
        for component in &self.path {
            validate_path_component(component)?;
        }
        self.share
            .pipeline()
            .send(self.directory_request(Method::PUT))
            .await?;
        tracing::debug!(share = %self.share.name(), path = %self.path(), "directory created");
        Ok(())
    }

    pub async fn create_if_not_exists(&self) -> StorageResult<bool> {
        true_unless(self.create().await, ErrorKind::AlreadyExists)
    }

    /// Deletes the directory, which must be empty.
    pub async fn delete(&self) -> StorageResult<()> {
        self.share
            .pipeline()
            .send(self.directory_request(Method::DELETE))
            .await?;
        Ok(())
    }

    /// Lists files and directories directly below this one.
    pub async fn list(&self) -> StorageResult<Vec<DirectoryEntry>> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = self.directory_request(Method::GET).query("comp", "list");
            if let Some(ref marker) = marker {
                request = request.query("marker", marker);
            }
            let response = self.share.pipeline().send(request).await?;
            let listing = parse_directory_listing(&response.text().await?)?;
            entries.extend(listing.entries);
            match listing.next_marker {
                Some(next) => marker = Some(next),
                None => return Ok(entries),
            }
        }
    }
}
