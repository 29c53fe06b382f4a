//! File service: shares, directories and files.

mod directory;
mod file_handle;
mod share;

pub use directory::DirectoryHandle;
pub use file_handle::{FileHandle, MAX_RANGE_BYTES};
pub use share::ShareHandle;

use http::Method;
use url::Url;

use crate::error::StorageResult;
use crate::models::FileServiceProperties;
use crate::pipeline::Pipeline;
use crate::transport::StorageRequest;
use crate::xml::{parse_service_properties, serialize_service_properties};

/// Entry point to the file service of one account.
#[derive(Debug, Clone)]
pub struct FileServiceClient {
    account: String,
    endpoint: Url,
    pipeline: Pipeline,
}

impl FileServiceClient {
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

    /// Handle to a share. No network call; the share may not exist.
    pub fn share(&self, name: &str) -> ShareHandle {
        ShareHandle::new(&self.account, &self.endpoint, name, self.pipeline.clone())
    }

    fn properties_request(&self, method: Method) -> StorageRequest {
        StorageRequest::new(method, self.endpoint.clone())
            .query("restype", "service")
            .query("comp", "properties")
    }

    /// Reads metrics and CORS settings.
    pub async fn get_service_properties(&self) -> StorageResult<FileServiceProperties> {
        let response = self.pipeline.send(self.properties_request(Method::GET)).await?;
        parse_service_properties(&response.text().await?)
    }

    /// Replaces metrics and CORS settings. Out-of-range retention is
    /// rejected before anything is sent.
    pub async fn set_service_properties(
        &self,
        properties: &FileServiceProperties,
    ) -> StorageResult<()> {
        properties.validate()?;
        let request = self
            .properties_request(Method::PUT)
            .header("content-type", "application/xml")?
            .body(serialize_service_properties(properties));
        self.pipeline.send(request).await?;
        tracing::debug!(account = %self.account, "file service properties updated");
        Ok(())
    }
}
