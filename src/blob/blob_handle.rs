//! Block blob handle.

use bytes::Bytes;
use http::Method;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::ContainerHandle;
use crate::account::{parse_resource_url, resource_url};
use crate::auth::{SasGrant, SasResource, SasTarget, SasToken};
use crate::config::ClientOptions;
use crate::copy::{self, CopySource};
use crate::download::{write_body, DownloadMode};
use crate::error::{true_unless, ErrorKind, StorageError, StorageResult};
use crate::models::{CopyState, ObjectProperties, ServiceKind};
use crate::pipeline::{Credential, Pipeline};
use crate::transport::{StorageRequest, StorageResponse, Transport};

/// Locator for a blob inside a container.
#[derive(Debug, Clone)]
pub struct BlobHandle {
    container: ContainerHandle,
    name: String,
    url: Url,
}

impl BlobHandle {
    pub(crate) fn new(container: ContainerHandle, name: &str) -> Self {
        let name: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = vec![container.name()];
        segments.extend(name.iter().copied());
        let url = resource_url(container.endpoint(), &segments);
        let name = name.join("/");
        Self {
            container,
            name,
            url,
        }
    }

    /// Builds a handle from a SAS URL; requests are authorized by the token.
    pub fn from_sas_url(sas_url: &Url, transport: Arc<dyn Transport>) -> StorageResult<Self> {
        let parsed = parse_resource_url(sas_url, ServiceKind::Blob)?;
        if parsed.segments.is_empty() {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "SAS URL does not name a blob",
            ));
        }
        let token = SasToken::parse(sas_url.query().unwrap_or_default())?;
        let pipeline = Pipeline::new(
            transport,
            Credential::Sas(Arc::new(token)),
            ClientOptions::default(),
        );
        let container =
            ContainerHandle::new(&parsed.account, &parsed.endpoint, &parsed.root, pipeline);
        Ok(Self::new(container, &parsed.segments.join("/")))
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn account_name(&self) -> &str {
        self.container.account_name()
    }

    fn request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.url.clone())
    }

    fn ensure_named(&self) -> StorageResult<()> {
        if self.name.is_empty() {
            return Err(StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                "blob name is empty",
            ));
        }
        Ok(())
    }

    async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        self.ensure_named()?;
        self.container.pipeline().send(request).await
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        let result = self.send(self.request(Method::HEAD)).await;
        true_unless(result.map(|_| ()), ErrorKind::NotFound)
    }

    pub async fn properties(&self) -> StorageResult<ObjectProperties> {
        let response = self.send(self.request(Method::HEAD)).await?;
        Ok(ObjectProperties::from_response(&response))
    }

    /// Overwrites the blob with `data` in a single put.
    pub async fn upload_bytes(&self, data: impl Into<Bytes>) -> StorageResult<()> {
        self.upload(data.into(), "application/octet-stream").await
    }

    pub async fn upload_text(&self, text: &str) -> StorageResult<()> {
        self.upload(Bytes::copy_from_slice(text.as_bytes()), "text/plain; charset=utf-8")
            .await
    }

    async fn upload(&self, data: Bytes, content_type: &str) -> StorageResult<()> {
        let len = data.len();
        let request = self
            .request(Method::PUT)
            .header("x-ms-blob-type", "BlockBlob")?
            .header("content-type", content_type)?
            .body(data);
        self.send(request).await?;
        tracing::debug!(
            container = %self.container.name(),
            blob = %self.name,
            bytes = len,
            "blob uploaded"
        );
        Ok(())
    }

    pub async fn download_to_bytes(&self) -> StorageResult<Bytes> {
        self.send(self.request(Method::GET)).await?.bytes().await
    }

    pub async fn download_text(&self) -> StorageResult<String> {
        self.send(self.request(Method::GET)).await?.text().await
    }

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

    /// Starts a server-side copy into this blob.
    pub async fn start_copy(&self, source: &CopySource) -> StorageResult<CopyState> {
        self.ensure_named()?;
        copy::start_copy(
            self.container.pipeline(),
            &self.url,
            self.account_name(),
            ServiceKind::Blob,
            source,
        )
        .await
    }

    pub async fn copy_status(&self) -> StorageResult<Option<CopyState>> {
        Ok(self.properties().await?.copy)
    }

    pub async fn wait_for_copy(&self, poll_interval: Duration) -> StorageResult<CopyState> {
        copy::wait_until_terminal(poll_interval, || self.copy_status()).await
    }

    pub async fn abort_copy(&self, copy_id: &str) -> StorageResult<()> {
        self.ensure_named()?;
        copy::abort_copy(self.container.pipeline(), &self.url, copy_id).await
    }

    /// Mints a SAS for this blob. Local only.
    pub fn shared_access_signature(&self, grant: &SasGrant) -> StorageResult<SasToken> {
        self.ensure_named()?;
        let credential = self.container.pipeline().shared_key()?;
        let target = SasTarget {
            account: self.account_name().to_string(),
            service: ServiceKind::Blob,
            root: self.container.name().to_string(),
            path: Some(self.name.clone()),
        };
        SasToken::sign(&target, SasResource::Blob, grant, credential.key.secret())
    }

    pub fn sas_url(&self, grant: &SasGrant) -> StorageResult<Url> {
        let mut url = self.url.clone();
        self.shared_access_signature(grant)?.apply_to(&mut url);
        Ok(url)
    }

    pub fn copy_source_with_sas(&self, grant: &SasGrant) -> StorageResult<CopySource> {
        CopySource::from_sas_url(self.sas_url(grant)?)
    }
}
