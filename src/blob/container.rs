//! Blob container handle.

use http::Method;
use url::Url;

use super::BlobHandle;
use crate::account::resource_url;
use crate::acl;
use crate::auth::{SasGrant, SasResource, SasTarget, SasToken};
use crate::error::{true_unless, ErrorKind, StorageResult};
use crate::models::{validate_resource_name, ServiceKind, SharedAccessPolicy, SignedIdentifier};
use crate::pipeline::Pipeline;
use crate::transport::StorageRequest;

/// Locator for one blob container.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    account: String,
    name: String,
    endpoint: Url,
    url: Url,
    pipeline: Pipeline,
}

impl ContainerHandle {
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

    /// Handle to a blob. `name` may contain `/`.
    pub fn blob(&self, name: &str) -> BlobHandle {
        BlobHandle::new(self.clone(), name)
    }

    fn container_request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.url.clone()).query("restype", "container")
    }

    pub async fn create(&self) -> StorageResult<()> {
        validate_resource_name("container", &self.name)?;
        self.pipeline.send(self.container_request(Method::PUT)).await?;
        tracing::info!(container = %self.name, "container created");
        Ok(())
    }

    pub async fn create_if_not_exists(&self) -> StorageResult<bool> {
        true_unless(self.create().await, ErrorKind::AlreadyExists)
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        let result = self.pipeline.send(self.container_request(Method::HEAD)).await;
        true_unless(result.map(|_| ()), ErrorKind::NotFound)
    }

    pub async fn delete(&self) -> StorageResult<()> {
        self.pipeline
            .send(self.container_request(Method::DELETE))
            .await?;
        Ok(())
    }

    pub async fn delete_if_exists(&self) -> StorageResult<bool> {
        true_unless(self.delete().await, ErrorKind::NotFound)
    }

    pub async fn get_access_policies(&self) -> StorageResult<Vec<SignedIdentifier>> {
        acl::get_access_policies(&self.pipeline, &self.url, "container").await
    }

    pub async fn set_access_policies(&self, identifiers: &[SignedIdentifier]) -> StorageResult<()> {
        acl::set_access_policies(&self.pipeline, &self.url, "container", identifiers).await
    }

    pub async fn add_access_policy(
        &self,
        id: &str,
        policy: SharedAccessPolicy,
    ) -> StorageResult<()> {
        let mut identifiers = self.get_access_policies().await?;
        acl::upsert_policy(&mut identifiers, id, policy);
        self.set_access_policies(&identifiers).await
    }

    pub async fn remove_access_policy(&self, id: &str) -> StorageResult<bool> {
        let mut identifiers = self.get_access_policies().await?;
        let before = identifiers.len();
        identifiers.retain(|identifier| identifier.id != id);
        if identifiers.len() == before {
            return Ok(false);
        }
        self.set_access_policies(&identifiers).await?;
        Ok(true)
    }

    /// Mints a SAS covering every blob in the container. Local only.
    pub fn shared_access_signature(&self, grant: &SasGrant) -> StorageResult<SasToken> {
        let credential = self.pipeline.shared_key()?;
        let target = SasTarget {
            account: self.account.clone(),
            service: ServiceKind::Blob,
            root: self.name.clone(),
            path: None,
        };
        SasToken::sign(&target, SasResource::Container, grant, credential.key.secret())
    }

    pub fn sas_url(&self, grant: &SasGrant) -> StorageResult<Url> {
        let mut url = self.url.clone();
        self.shared_access_signature(grant)?.apply_to(&mut url);
        Ok(url)
    }
}
