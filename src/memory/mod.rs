//! In-memory storage backend.
//!
//! [`MemoryTransport`] answers requests the way the storage service does:
//! it resolves the account from the host, authenticates with SharedKey or a
//! service SAS, routes on `(method, restype, comp)` and replies with the
//! same status codes, headers and XML bodies. Hosts must be production
//! style, `{account}.{file|blob}.{suffix}`.

mod blob;
mod copy;
mod file;
mod store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::sync::atomic::{AtomicU64, Ordering};
use url::{Host, Url};
use uuid::Uuid;

use crate::auth::{authenticate, AccessRequirement, AuthMethod};
use crate::config::DEFAULT_API_VERSION;
use crate::context::{format_http_date, RequestContext};
use crate::error::{ServiceErrorCode, StorageError, StorageResult};
use crate::models::{ServiceKind, SignedIdentifier};
use crate::transport::{redact_url, BodyStream, StorageRequest, StorageResponse, Transport};
use crate::xml::serialize_error;

use store::{MemoryStore, ObjectModel};

/// A storage backend living in process memory.
#[derive(Debug)]
pub struct MemoryTransport {
    store: MemoryStore,
    accounts: DashMap<String, String>,
    pending_copy_polls: u32,
    clock_offset: Mutex<Duration>,
    requests: AtomicU64,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            store: MemoryStore::default(),
            accounts: DashMap::new(),
            pending_copy_polls: 0,
            clock_offset: Mutex::new(Duration::zero()),
            requests: AtomicU64::new(0),
        }
    }
}

impl MemoryTransport {
    /// A backend with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account and its base64 key.
    pub fn with_account(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.register_account(name, key);
        self
    }

    /// Copies stay pending for `polls` status reads before they land.
    /// Zero (the default) completes copies immediately.
    pub fn with_pending_copy_polls(mut self, polls: u32) -> Self {
        self.pending_copy_polls = polls;
        self
    }

    pub fn register_account(&self, name: impl Into<String>, key: impl Into<String>) {
        self.accounts.insert(name.into(), key.into());
    }

    /// Moves the backend clock forward, for expiry checks.
    pub fn advance_clock(&self, by: Duration) {
        *self.clock_offset.lock() += by;
    }

    /// The backend's notion of the current time.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_offset.lock()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn account_key(&self, account: &str) -> StorageResult<String> {
        self.accounts
            .get(account)
            .map(|key| key.value().clone())
            .ok_or_else(|| {
                StorageError::service_with_message(
                    ServiceErrorCode::InvalidUri,
                    format!("account '{}' is not registered", account),
                )
            })
    }

    fn handle(&self, request: &StorageRequest) -> StorageResult<StorageResponse> {
        let (account, service) = resolve_host(&request.url)?;
        let account_key = self.account_key(&account)?;
        let mut segments = path_segments(&request.url);
        let root = if segments.is_empty() {
            None
        } else {
            Some(segments.remove(0))
        };

        let call = Call {
            ctx: RequestContext::new(request, &account),
            account: &account,
            account_key: &account_key,
            service,
            root,
            path: segments,
            body: &request.body,
            now: self.now(),
        };

        match service {
            ServiceKind::File => file::route(self, &call),
            ServiceKind::Blob => blob::route(self, &call),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let is_head = request.method == http::Method::HEAD;
        match self.handle(&request) {
            Ok(response) => {
                tracing::trace!(
                    method = %request.method,
                    url = %redact_url(&request.url),
                    status = %response.status,
                    "memory backend request"
                );
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(
                    method = %request.method,
                    url = %redact_url(&request.url),
                    code = err.effective_service_code().as_str(),
                    "memory backend rejected request"
                );
                Ok(error_response(&err, is_head))
            }
        }
    }
}

/// Splits `{account}.{service}.{suffix}` into account and service.
fn resolve_host(url: &Url) -> StorageResult<(String, ServiceKind)> {
    let bad_host = || {
        StorageError::service_with_message(
            ServiceErrorCode::InvalidUri,
            format!("'{}' is not an account host", url.host_str().unwrap_or_default()),
        )
    };
    let Some(Host::Domain(domain)) = url.host() else {
        return Err(bad_host());
    };
    let mut labels = domain.split('.');
    match (labels.next(), labels.next().and_then(ServiceKind::from_label)) {
        (Some(account), Some(service)) if !account.is_empty() => {
            Ok((account.to_string(), service))
        }
        _ => Err(bad_host()),
    }
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// One request, resolved against its account.
pub(crate) struct Call<'a> {
    pub ctx: RequestContext<'a>,
    pub account: &'a str,
    pub account_key: &'a str,
    pub service: ServiceKind,
    /// Share or container name.
    pub root: Option<String>,
    /// Path below the root.
    pub path: Vec<String>,
    pub body: &'a Bytes,
    pub now: DateTime<Utc>,
}

impl Call<'_> {
    pub fn method(&self) -> &str {
        self.ctx.method.as_str()
    }

    pub fn path_str(&self) -> String {
        self.path.join("/")
    }

    /// Authenticates the call; `policies` yields the stored policies of
    /// the share or container a SAS names.
    pub fn authorize(
        &self,
        requirement: AccessRequirement,
        policies: impl FnOnce(&str) -> Vec<SignedIdentifier>,
    ) -> StorageResult<AuthMethod> {
        authenticate(&self.ctx, self.account_key, &requirement, self.now, policies)
    }

    /// Required header, or `MissingRequiredHeader`.
    pub fn require_header(&self, name: &str) -> StorageResult<&str> {
        self.ctx.header(name).ok_or_else(|| {
            StorageError::service_with_message(
                ServiceErrorCode::MissingRequiredHeader,
                format!("header '{}' is required", name),
            )
        })
    }

    /// Fails with `Md5Mismatch` when the request carries a Content-MD5 that
    /// does not match its body.
    pub fn check_content_md5(&self) -> StorageResult<()> {
        if let Some(expected) = self.ctx.header("content-md5") {
            if expected != store::content_md5(self.body) {
                return Err(StorageError::service(ServiceErrorCode::Md5Mismatch));
            }
        }
        Ok(())
    }

    pub fn body_text(&self) -> StorageResult<&str> {
        std::str::from_utf8(self.body)
            .map_err(|_| StorageError::service(ServiceErrorCode::InvalidXmlDocument))
    }

    /// `scheme://host/` of the request.
    pub fn service_endpoint(&self) -> String {
        format!(
            "{}://{}/",
            self.ctx.url.scheme(),
            self.ctx.url.host_str().unwrap_or_default()
        )
    }
}

/// Response under construction, with the headers every reply carries.
pub(crate) struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
        .header("x-ms-request-id", Uuid::new_v4().to_string())
        .header("x-ms-version", DEFAULT_API_VERSION)
        .header("date", format_http_date(&Utc::now()))
    }

    /// Sets a header. `name` must be lowercase; values that are not valid
    /// header text are dropped.
    pub fn header(mut self, name: &'static str, value: impl AsRef<str>) -> Self {
        if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn etag(self, etag: &str, last_modified: &DateTime<Utc>) -> Self {
        self.header("etag", etag)
            .header("last-modified", format_http_date(last_modified))
    }

    /// Property headers of a file or blob, including its copy record.
    pub fn object(mut self, object: &ObjectModel) -> Self {
        self = self
            .etag(&object.etag, &object.last_modified)
            .header("content-length", object.content_length.to_string());
        if let Some(ref content_type) = object.content_type {
            self = self.header("content-type", content_type);
        }
        if let Some(ref md5) = object.content_md5 {
            self = self.header("content-md5", md5);
        }
        if let Some(ref record) = object.copy {
            let state = record.state();
            self = self
                .header("x-ms-copy-id", &state.copy_id)
                .header("x-ms-copy-status", state.status.as_str())
                .header("x-ms-copy-source", &record.source);
            if let Some(progress) = state.progress {
                self = self.header(
                    "x-ms-copy-progress",
                    format!("{}/{}", progress.copied, progress.total),
                );
            }
            if let Some(ref time) = state.completion_time {
                self = self.header("x-ms-copy-completion-time", format_http_date(time));
            }
        }
        self
    }

    pub fn xml(self, xml: String) -> Self {
        let mut reply = self.header("content-type", "application/xml");
        reply.body = Bytes::from(xml);
        reply
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn finish(self) -> StorageResponse {
        StorageResponse::from_bytes(self.status, self.headers, self.body)
    }

    /// Finishes with a body produced as it is read.
    pub fn finish_streaming(self, body: BodyStream) -> StorageResponse {
        let mut response = StorageResponse::new(self.status);
        response.headers = self.headers;
        response.body = body;
        response
    }
}

/// Builds the service error reply for `err`. HEAD replies carry no body.
fn error_response(err: &StorageError, is_head: bool) -> StorageResponse {
    let code = err.effective_service_code();
    let status = err.status.unwrap_or_else(|| code.status_code());
    let reply = Reply::new(status).header("x-ms-error-code", code.as_str());
    if is_head {
        reply.finish()
    } else {
        reply.xml(serialize_error(code.as_str(), &err.message)).finish()
    }
}

fn unsupported() -> StorageError {
    StorageError::service(ServiceErrorCode::UnsupportedHttpVerb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_host() {
        let url = Url::parse("https://acct.file.core.windows.net/share").unwrap();
        assert_eq!(resolve_host(&url).unwrap(), ("acct".to_string(), ServiceKind::File));

        let url = Url::parse("http://acct.blob.localhost:8080/c").unwrap();
        assert_eq!(resolve_host(&url).unwrap().1, ServiceKind::Blob);

        let url = Url::parse("http://127.0.0.1:10000/devstoreaccount1/c").unwrap();
        assert!(resolve_host(&url).is_err());
        let url = Url::parse("https://acct.queue.core.windows.net/q").unwrap();
        assert!(resolve_host(&url).is_err());
    }

    #[test]
    fn test_path_segments_are_decoded() {
        let url = Url::parse("https://a.file.core.windows.net/s/my%20dir/f.txt").unwrap();
        assert_eq!(path_segments(&url), vec!["s", "my dir", "f.txt"]);
    }

    #[tokio::test]
    async fn test_unknown_account_is_an_error_response() {
        let transport = MemoryTransport::new();
        let request = StorageRequest::new(
            http::Method::GET,
            Url::parse("https://nobody.file.core.windows.net/s?restype=share").unwrap(),
        );
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.header("x-ms-error-code"), Some("InvalidUri"));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_clock_advances() {
        let transport = MemoryTransport::new();
        let before = transport.now();
        transport.advance_clock(Duration::hours(25));
        assert!(transport.now() - before >= Duration::hours(25));
    }
}
