//! File share handle.

use http::Method;
use url::Url;

use super::{DirectoryHandle, FileHandle};
use crate::account::resource_url;
use crate::acl;
use crate::auth::{SasGrant, SasResource, SasTarget, SasToken};
use crate::context::parse_http_date;
use crate::error::{true_unless, ErrorKind, StorageResult};
use crate::models::{
    validate_resource_name, Quota, ServiceKind, SharePropertiesSnapshot, ShareStats,
    SharedAccessPolicy, SignedIdentifier,
};
use crate::pipeline::Pipeline;
use crate::transport::StorageRequest;
use crate::xml::parse_share_stats;

/// Locator for one share. Holds no remote state.
#[derive(Debug, Clone)]
pub struct ShareHandle {
    account: String,
    name: String,
    endpoint: Url,
    url: Url,
    pipeline: Pipeline,
}

impl ShareHandle {
    pub(crate) fn new(account: &str, endpoint: &Url, name: &str, pipeline: Pipeline) -> Self {
        Self {
            account: account.to_string(),
            name: name.to_string(),
            endpoint: endpoint.clone(),
            url: resource_url(endpoint, &[name]),
            pipeline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn account_name(&self) -> &str {
        &self.account
    }

    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn share_request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.url.clone()).query("restype", "share")
    }

    /// Creates the share; fails with `AlreadyExists` if it is there.
    pub async fn create(&self) -> StorageResult<()> {
        validate_resource_name("share", &self.name)?;
        self.pipeline.send(self.share_request(Method::PUT)).await?;
        tracing::info!(share = %self.name, "share created");
        Ok(())
    }

    /// Creates the share unless it exists. Returns true if this call
    /// created it; concurrent callers never see an error for the race.
    pub async fn create_if_not_exists(&self) -> StorageResult<bool> {
        true_unless(self.create().await, ErrorKind::AlreadyExists)
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        let result = self.pipeline.send(self.share_request(Method::HEAD)).await;
        true_unless(result.map(|_| ()), ErrorKind::NotFound)
    }

    pub async fn delete(&self) -> StorageResult<()> {
        self.pipeline.send(self.share_request(Method::DELETE)).await?;
        tracing::info!(share = %self.name, "share deleted");
        Ok(())
    }

    pub async fn delete_if_exists(&self) -> StorageResult<bool> {
        true_unless(self.delete().await, ErrorKind::NotFound)
    }

    pub fn root_directory(&self) -> DirectoryHandle {
        DirectoryHandle::new(self.clone(), Vec::new())
    }

    /// Shorthand for `root_directory().subdirectory(path)`.
    pub fn directory(&self, path: &str) -> DirectoryHandle {
        self.root_directory().subdirectory(path)
    }

    /// Shorthand for `root_directory().file(path)`.
    pub fn file(&self, path: &str) -> FileHandle {
        self.root_directory().file(path)
    }

    /// Current usage of the share.
    pub async fn get_stats(&self) -> StorageResult<ShareStats> {
        let request = self.share_request(Method::GET).query("comp", "stats");
        let response = self.pipeline.send(request).await?;
        parse_share_stats(&response.text().await?)
    }

    /// Reads the share properties into a snapshot.
    pub async fn fetch_properties(&self) -> StorageResult<SharePropertiesSnapshot> {
        let response = self.pipeline.send(self.share_request(Method::HEAD)).await?;
        Ok(SharePropertiesSnapshot::fetched(
            Quota::from_header(response.header("x-ms-share-quota"))?,
            response.header("etag").unwrap_or_default().to_string(),
            response.header("last-modified").and_then(parse_http_date),
        ))
    }

    /// Pushes a snapshot's settings to the service. Last write wins.
    pub async fn set_properties(&self, properties: &SharePropertiesSnapshot) -> StorageResult<()> {
        let request = self
            .share_request(Method::PUT)
            .query("comp", "properties")
            .header("x-ms-share-quota", properties.quota().header_value())?;
        self.pipeline.send(request).await?;
        tracing::debug!(share = %self.name, quota = ?properties.quota(), "share properties set");
        Ok(())
    }

    pub async fn get_access_policies(&self) -> StorageResult<Vec<SignedIdentifier>> {
        acl::get_access_policies(&self.pipeline, &self.url, "share").await
    }

    /// Replaces the stored policy set (at most five).
    pub async fn set_access_policies(&self, identifiers: &[SignedIdentifier]) -> StorageResult<()> {
        acl::set_access_policies(&self.pipeline, &self.url, "share", identifiers).await
    }

    /// Stores a named policy, replacing one with the same id.
    pub async fn add_access_policy(
        &self,
        id: &str,
        policy: SharedAccessPolicy,
    ) -> StorageResult<()> {
        let mut identifiers = self.get_access_policies().await?;
        acl::upsert_policy(&mut identifiers, id, policy);
        self.set_access_policies(&identifiers).await
    }

    /// Removes a named policy, revoking every token minted against it.
    /// Returns false if no such policy was stored.
    pub async fn remove_access_policy(&self, id: &str) -> StorageResult<bool> {
        let mut identifiers = self.get_access_policies().await?;
        let before = identifiers.len();
        identifiers.retain(|identifier| identifier.id != id);
        if identifiers.len() == before {
            return Ok(false);
        }
        self.set_access_policies(&identifiers).await?;
        tracing::info!(share = %self.name, policy = id, "access policy removed");
        Ok(true)
    }

    fn sas_target(&self) -> SasTarget {
        SasTarget {
            account: self.account.clone(),
            service: ServiceKind::File,
            root: self.name.clone(),
            path: None,
        }
    }

    /// Mints a SAS covering every file in the share. Local only.
    pub fn shared_access_signature(&self, grant: &SasGrant) -> StorageResult<SasToken> {
        let credential = self.pipeline.shared_key()?;
        SasToken::sign(&self.sas_target(), SasResource::Share, grant, credential.key.secret())
    }

    /// Share URL with a freshly minted SAS as its query.
    pub fn sas_url(&self, grant: &SasGrant) -> StorageResult<Url> {
        let mut url = self.url.clone();
        self.shared_access_signature(grant)?.apply_to(&mut url);
        Ok(url)
    }
}
