//! Blob service: containers and block blobs.

mod blob_handle;
mod container;

pub use blob_handle::BlobHandle;
pub use container::ContainerHandle;

use url::Url;

use crate::pipeline::Pipeline;

/// Entry point to the blob service of one account.
#[derive(Debug, Clone)]
pub struct BlobServiceClient {
    account: String,
    endpoint: Url,
    pipeline: Pipeline,
}

impl BlobServiceClient {
    pub(crate) fn new(account: &str, endpoint: Url, pipeline: Pipeline) -> Self {
        Self {
            account: account.to_string(),
            endpoint,
            pipeline,
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Handle to a container. No network call.
    pub fn container(&self, name: &str) -> ContainerHandle {
        ContainerHandle::new(&self.account, &self.endpoint, name, self.pipeline.clone())
    }
}
