//! End-to-end tests of the HTTP transport against a local server.

mod common;

use std::sync::Arc;

use common::{BridgeServer, ACCOUNT, OTHER_ACCOUNT_KEY};

use azfiles_rs::{
    ClientOptions, ConnectionConfig, DownloadMode, ErrorKind, MemoryTransport,
    StorageAccount, DEV_ACCOUNT_KEY,
};

async fn http_account() -> (Arc<MemoryTransport>, BridgeServer, StorageAccount) {
    let backend = Arc::new(MemoryTransport::new().with_account(ACCOUNT, DEV_ACCOUNT_KEY));
    let server = BridgeServer::start(backend.clone(), ACCOUNT).await;
    let config =
        ConnectionConfig::parse(&server.connection_string(ACCOUNT, DEV_ACCOUNT_KEY)).unwrap();
    let account = StorageAccount::new(config, ClientOptions::default()).unwrap();
    (backend, server, account)
}

#[tokio::test]
async fn test_file_round_trip_over_http() {
    let (backend, _server, account) = http_account().await;
    let share = account.file_service_client().share("wire");

    assert!(share.create_if_not_exists().await.unwrap());
    assert!(!share.create_if_not_exists().await.unwrap());

    let file = share.file("hello.txt");
    assert!(!file.exists().await.unwrap());
    file.upload_text("over the wire").await.unwrap();
    assert!(file.exists().await.unwrap());
    assert_eq!(file.download_text().await.unwrap(), "over the wire");

    assert!(backend.request_count() >= 7);
}

#[tokio::test]
async fn test_download_to_local_over_http() {
    let (_backend, _server, account) = http_account().await;
    let share = account.file_service_client().share("stream");
    share.create().await.unwrap();
    let file = share.file("payload.bin");
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    file.upload_bytes(data.clone()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("payload.bin");
    let written = file
        .download_to_local(&target, DownloadMode::Overwrite)
        .await
        .unwrap();

    assert_eq!(written, data.len() as u64);
    assert_eq!(std::fs::read(&target).unwrap(), data);
}

#[tokio::test]
async fn test_service_errors_over_http() {
    let (_backend, _server, account) = http_account().await;
    let share = account.file_service_client().share("errors");

    let err = share.file("missing.txt").download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.status.map(|s| s.as_u16()), Some(404));
    assert!(err.request_id.is_some());

    share.create().await.unwrap();
    let err = share.create().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_wrong_key_is_rejected_over_http() {
    let (_backend, server, _account) = http_account().await;
    let config =
        ConnectionConfig::parse(&server.connection_string(ACCOUNT, OTHER_ACCOUNT_KEY)).unwrap();
    let impostor = StorageAccount::new(config, ClientOptions::default()).unwrap();

    let err = impostor
        .file_service_client()
        .share("guarded")
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_blob_over_http() {
    let (_backend, _server, account) = http_account().await;
    let container = account.blob_service_client().container("wire");
    container.create().await.unwrap();

    let blob = container.blob("a.txt");
    blob.upload_text("blob over http").await.unwrap();

    assert_eq!(blob.download_text().await.unwrap(), "blob over http");
    assert!(blob.delete_if_exists().await.unwrap());
    assert!(!blob.exists().await.unwrap());
}
