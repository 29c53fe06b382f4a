//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use futures::StreamExt;

use super::{StorageRequest, StorageResponse, Transport};
use crate::config::ClientOptions;
use crate::error::{StorageError, StorageResult};

/// Sends requests over HTTP(S) to a real storage endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport honoring the timeout and user agent in `options`.
    pub fn new(options: &ClientOptions) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        let StorageRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StorageError::from))
            .boxed();

        Ok(StorageResponse {
            status,
            headers,
            body,
        })
    }
}
