//! File handle.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use http::Method;
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::ShareHandle;
use crate::account::{parse_resource_url, resource_url};
use crate::auth::{SasGrant, SasResource, SasTarget, SasToken};
use crate::config::ClientOptions;
use crate::copy::{self, CopySource};
use crate::download::{write_body, DownloadMode};
use crate::error::{true_unless, ErrorKind, StorageError, StorageResult};
use crate::models::{validate_path_component, CopyState, ObjectProperties, ServiceKind};
use crate::pipeline::{Credential, Pipeline};
use crate::transport::{StorageRequest, StorageResponse, Transport};

/// Largest range a single write may carry.
pub const MAX_RANGE_BYTES: usize = 4 * 1024 * 1024;

/// Locator for a file inside a share.
#[derive(Debug, Clone)]
pub struct FileHandle {
    share: ShareHandle,
    path: Vec<String>,
    url: Url,
}

impl FileHandle {
    pub(crate) fn new(share: ShareHandle, path: Vec<String>) -> Self {
        let mut segments: Vec<&str> = vec![share.name()];
        segments.extend(path.iter().map(String::as_str));
        let url = resource_url(share.endpoint(), &segments);
        Self { share, path, url }
    }

    /// Builds a handle from a SAS URL; requests are authorized by the token.
    pub fn from_sas_url(sas_url: &Url, transport: Arc<dyn Transport>) -> StorageResult<Self> {
        let parsed = parse_resource_url(sas_url, ServiceKind::File)?;
        if parsed.segments.is_empty() {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "SAS URL does not name a file",
            ));
        }
        let token = SasToken::parse(sas_url.query().unwrap_or_default())?;
        let pipeline = Pipeline::new(
            transport,
            Credential::Sas(Arc::new(token)),
            ClientOptions::default(),
        );
        let share = ShareHandle::new(&parsed.account, &parsed.endpoint, &parsed.root, pipeline);
        Ok(Self::new(share, parsed.segments))
    }

    pub fn share(&self) -> &ShareHandle {
        &self.share
    }

    /// Path from the share root, `/`-separated.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn account_name(&self) -> &str {
        self.share.account_name()
    }

    fn request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.url.clone())
    }

    /// An empty path addresses the share, not a file.
    fn ensure_named(&self) -> StorageResult<()> {
        if self.path.is_empty() {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "file path is empty",
            ));
        }
        Ok(())
    }

    async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        self.ensure_named()?;
        self.share.pipeline().send(request).await
    }

    /// One HEAD round trip; false when the file is not there.
    pub async fn exists(&self) -> StorageResult<bool> {
        let result = self.send(self.request(Method::HEAD)).await;
        true_unless(result.map(|_| ()), ErrorKind::NotFound)
    }

    pub async fn properties(&self) -> StorageResult<ObjectProperties> {
        let response = self.send(self.request(Method::HEAD)).await?;
        Ok(ObjectProperties::from_response(&response))
    }

    /// Creates (or resets) the file at `size` bytes of zeros.
    pub async fn create(&self, size: u64) -> StorageResult<()> {
        self.create_with_content_type(size, None).await
    }

    async fn create_with_content_type(
        &self,
        size: u64,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        for component in &self.path {
            validate_path_component(component)?;
        }
        let mut request = self
            .request(Method::PUT)
            .header("x-ms-type", "file")?
            .header("x-ms-content-length", size.to_string())?;
        if let Some(content_type) = content_type {
            request = request.header("x-ms-content-type", content_type)?;
        }
        self.send(request).await?;
        Ok(())
    }

    async fn put_range(&self, offset: u64, data: Bytes) -> StorageResult<()> {
        let end = offset + data.len() as u64 - 1;
        let request = self
            .request(Method::PUT)
            .query("comp", "range")
            .header("x-ms-range", format!("bytes={}-{}", offset, end))?
            .header("x-ms-write", "update")?
            .header("content-md5", BASE64.encode(Md5::digest(&data)))?
            .body(data);
        self.send(request).await?;
        Ok(())
    }

    /// Overwrites the file with `data`: one create, then range writes of
    /// at most [`MAX_RANGE_BYTES`].
    pub async fn upload_bytes(&self, data: impl Into<Bytes>) -> StorageResult<()> {
        self.upload(data.into(), "application/octet-stream").await
    }

    /// Overwrites the file with UTF-8 text.
    pub async fn upload_text(&self, text: &str) -> StorageResult<()> {
        self.upload(Bytes::copy_from_slice(text.as_bytes()), "text/plain; charset=utf-8")
            .await
    }

    async fn upload(&self, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.create_with_content_type(data.len() as u64, Some(content_type))
            .await?;
        let mut offset = 0usize;
        while offset < data.len() {
            let end = (offset + MAX_RANGE_BYTES).min(data.len());
            self.put_range(offset as u64, data.slice(offset..end)).await?;
            offset = end;
        }
        tracing::debug!(
            share = %self.share.name(),
            path = %self.path(),
            bytes = data.len(),
            "file uploaded"
        );
        Ok(())
    }

    pub async fn download_to_bytes(&self) -> StorageResult<Bytes> {
        self.send(self.request(Method::GET)).await?.bytes().await
    }

    pub async fn download_text(&self) -> StorageResult<String> {
        self.send(self.request(Method::GET)).await?.text().await
    }

    /// Streams the file into `destination`. Returns bytes written.
    pub async fn download_to_local(
        &self,
        destination: impl AsRef<Path>,
        mode: DownloadMode,
    ) -> StorageResult<u64> {
        let response = self.send(self.request(Method::GET)).await?;
        write_body(response, destination.as_ref(), mode).await
    }

    pub async fn delete(&self) -> StorageResult<()> {
        self.send(self.request(Method::DELETE)).await?;
        Ok(())
    }

    pub async fn delete_if_exists(&self) -> StorageResult<bool> {
        true_unless(self.delete().await, ErrorKind::NotFound)
    }

    /// Starts a server-side copy into this file.
    pub async fn start_copy(&self, source: &CopySource) -> StorageResult<CopyState> {
        self.ensure_named()?;
        copy::start_copy(
            self.share.pipeline(),
            &self.url,
            self.account_name(),
            ServiceKind::File,
            source,
        )
        .await
    }

    /// State of the last copy into this file, if any.
    pub async fn copy_status(&self) -> StorageResult<Option<CopyState>> {
        Ok(self.properties().await?.copy)
    }

    /// Polls until the last copy into this file finishes.
    pub async fn wait_for_copy(&self, poll_interval: Duration) -> StorageResult<CopyState> {
        copy::wait_until_terminal(poll_interval, || self.copy_status()).await
    }

    pub async fn abort_copy(&self, copy_id: &str) -> StorageResult<()> {
        self.ensure_named()?;
        copy::abort_copy(self.share.pipeline(), &self.url, copy_id).await
    }

    fn sas_target(&self) -> SasTarget {
        SasTarget {
            account: self.account_name().to_string(),
            service: ServiceKind::File,
            root: self.share.name().to_string(),
            path: Some(self.path()),
        }
    }

    /// Mints a SAS for this file. Local only.
    pub fn shared_access_signature(&self, grant: &SasGrant) -> StorageResult<SasToken> {
        self.ensure_named()?;
        let credential = self.share.pipeline().shared_key()?;
        SasToken::sign(&self.sas_target(), SasResource::File, grant, credential.key.secret())
    }

    /// File URL with a freshly minted SAS as its query.
    pub fn sas_url(&self, grant: &SasGrant) -> StorageResult<Url> {
        let mut url = self.url.clone();
        self.shared_access_signature(grant)?.apply_to(&mut url);
        Ok(url)
    }

    /// A copy source readable from any account or service.
    pub fn copy_source_with_sas(&self, grant: &SasGrant) -> StorageResult<CopySource> {
        CopySource::from_sas_url(self.sas_url(grant)?)
    }
}
