//! Transport seam between the client handles and the storage backend.
//!
//! A [`Transport`] carries one fully-built [`StorageRequest`] to the backend
//! and hands back the raw [`StorageResponse`]. It only fails for network-level
//! problems; non-success statuses are returned as responses and mapped to
//! errors by the pipeline. Timeouts belong to the transport, not the handles.

mod remote;

pub use remote::HttpTransport;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use crate::error::{ErrorKind, StorageError, StorageResult};

/// Streaming response body.
pub type BodyStream = BoxStream<'static, StorageResult<Bytes>>;

/// Sends requests to a storage backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse>;
}

/// An outgoing REST request.
#[derive(Debug, Clone)]
pub struct StorageRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StorageRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Sets a header, rejecting values that are not valid header text.
    pub fn header(mut self, name: &'static str, value: impl AsRef<str>) -> StorageResult<Self> {
        let value = HeaderValue::from_str(value.as_ref()).map_err(|_| {
            StorageError::with_message(
                ErrorKind::InvalidConfiguration,
                format!("invalid value for header {}", name),
            )
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of a header.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response from the backend.
pub struct StorageResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for StorageResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl StorageResponse {
    /// Creates a response with an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: stream::empty().boxed(),
        }
    }

    /// Creates a response whose body is already in memory.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let body = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a header parsed into `T`.
    pub fn header_as<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.header(name).and_then(|v| v.parse().ok())
    }

    /// Returns the x-ms-request-id header value.
    pub fn request_id(&self) -> Option<&str> {
        self.header("x-ms-request-id")
    }

    /// Collects the whole body.
    pub async fn bytes(self) -> StorageResult<Bytes> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Collects the whole body as UTF-8 text.
    pub async fn text(self) -> StorageResult<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            StorageError::with_message(ErrorKind::Transport, "response body is not valid UTF-8")
        })
    }
}

/// Returns the URL with any `sig` query value masked, for logging.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "sig" { "REDACTED".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_masks_signature() {
        let url =
            Url::parse("https://a.file.core.windows.net/s/f?sv=2021-10-04&sig=abc%2Bdef").unwrap();
        let redacted = redact_url(&url);
        assert!(redacted.contains("sig=REDACTED"));
        assert!(redacted.contains("sv=2021-10-04"));
        assert!(!redacted.contains("abc"));
    }

    #[tokio::test]
    async fn test_response_body_collects() {
        let response = StorageResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "hello");
        assert_eq!(response.text().await.unwrap(), "hello");
    }
}
