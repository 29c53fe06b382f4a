//! Common test utilities.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

use azfiles_rs::{
    ClientOptions, ConnectionConfig, MemoryTransport, StorageAccount, StorageRequest, Transport,
    DEV_ACCOUNT_KEY,
};

pub const ACCOUNT: &str = "teststore";

pub const OTHER_ACCOUNT: &str = "otherstore";

/// Key of [`OTHER_ACCOUNT`]; any base64 works.
pub const OTHER_ACCOUNT_KEY: &str = "b3RoZXJzdG9yZS1rZXktZm9yLXRlc3RpbmctcHVycG9zZXMtb25seQ==";

pub fn connection_string(account: &str, key: &str) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={};AccountKey={};EndpointSuffix=core.windows.net",
        account, key
    )
}

/// An account talking to an in-memory backend.
pub struct TestAccount {
    pub backend: Arc<MemoryTransport>,
    pub account: StorageAccount,
}

impl TestAccount {
    pub fn new() -> Self {
        Self::with_backend(MemoryTransport::new())
    }

    /// Copies stay pending for `polls` status reads.
    pub fn with_pending_copies(polls: u32) -> Self {
        Self::with_backend(MemoryTransport::new().with_pending_copy_polls(polls))
    }

    fn with_backend(backend: MemoryTransport) -> Self {
        let backend = Arc::new(backend.with_account(ACCOUNT, DEV_ACCOUNT_KEY));
        let account = account_on(&backend, ACCOUNT, DEV_ACCOUNT_KEY);
        Self { backend, account }
    }

    /// A second account on the same backend.
    pub fn other_account(&self) -> StorageAccount {
        self.backend.register_account(OTHER_ACCOUNT, OTHER_ACCOUNT_KEY);
        account_on(&self.backend, OTHER_ACCOUNT, OTHER_ACCOUNT_KEY)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.backend.clone()
    }
}

pub fn account_on(backend: &Arc<MemoryTransport>, name: &str, key: &str) -> StorageAccount {
    let config = ConnectionConfig::parse(&connection_string(name, key)).unwrap();
    StorageAccount::with_transport(config, ClientOptions::default(), backend.clone()).unwrap()
}

/// Returns a share or container name no other test uses.
pub fn unique_name(prefix: &str) -> String {
    format!("{}{:08x}", prefix, rand::random::<u32>())
}

/// Serves a memory backend over HTTP on random local ports, one per
/// service, so the HTTP transport can be tested end to end.
pub struct BridgeServer {
    pub file_url: String,
    pub blob_url: String,
}

impl BridgeServer {
    pub async fn start(backend: Arc<MemoryTransport>, account: &str) -> Self {
        let file_url = serve(backend.clone(), format!("{}.file.localhost", account)).await;
        let blob_url = serve(backend, format!("{}.blob.localhost", account)).await;
        Self { file_url, blob_url }
    }

    pub fn connection_string(&self, account: &str, key: &str) -> String {
        format!(
            "DefaultEndpointsProtocol=http;AccountName={};AccountKey={};FileEndpoint={};BlobEndpoint={}",
            account, key, self.file_url, self.blob_url
        )
    }
}

async fn serve(backend: Arc<MemoryTransport>, host: String) -> String {
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let backend = backend.clone();
            let host = host.clone();
            async move { forward(backend, host, method, uri, headers, body).await }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

/// Replays a request against the backend with the account host restored.
async fn forward(
    backend: Arc<MemoryTransport>,
    host: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = Url::parse(&format!("http://{}{}", host, path_and_query)).unwrap();

    let mut request = StorageRequest::new(method, url).body(body);
    request.headers = headers;

    let response = backend.send(request).await.unwrap();
    let status = response.status;
    let headers = response.headers.clone();
    let body = response.bytes().await.unwrap();

    let mut reply = Response::new(Body::from(body));
    *reply.status_mut() = status;
    *reply.headers_mut() = headers;
    reply
}
