//! Share and directory operation tests.

mod common;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;

use common::{connection_string, unique_name, TestAccount, ACCOUNT};

use azfiles_rs::models::{gib_to_bytes, Quota};
use azfiles_rs::{
    ClientOptions, ConnectionConfig, ErrorKind, ServiceErrorCode, StorageAccount, StorageRequest,
    StorageResponse, StorageResult, Transport, DEV_ACCOUNT_KEY,
};

/// Answers every request with the same headers.
struct CannedHeaders(HeaderMap);

#[async_trait]
impl Transport for CannedHeaders {
    async fn send(&self, _request: StorageRequest) -> StorageResult<StorageResponse> {
        Ok(StorageResponse::from_bytes(StatusCode::OK, self.0.clone(), ""))
    }
}

#[tokio::test]
async fn test_create_if_not_exists_reports_creation() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share(&unique_name("logs"));

    assert!(share.create_if_not_exists().await.unwrap());
    assert!(!share.create_if_not_exists().await.unwrap());
    assert!(share.exists().await.unwrap());
}

#[tokio::test]
async fn test_create_existing_share_fails() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("reports");
    share.create().await.unwrap();

    let err = share.create().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);
    assert!(err.has_service_code(ServiceErrorCode::ShareAlreadyExists));
}

#[tokio::test]
async fn test_concurrent_create_has_one_winner() {
    let test = TestAccount::new();
    let files = test.account.file_service_client();

    let attempts = (0..8).map(|_| {
        let share = files.share("contended");
        tokio::spawn(async move { share.create_if_not_exists().await.unwrap() })
    });
    let results = futures::future::join_all(attempts).await;

    let created = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_invalid_share_name_is_rejected_locally() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("Bad_Name");

    let err = share.create().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    assert_eq!(test.backend.request_count(), 0);
}

#[tokio::test]
async fn test_delete_share() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("scratch");
    share.create().await.unwrap();

    assert!(share.delete_if_exists().await.unwrap());
    assert!(!share.exists().await.unwrap());
    assert!(!share.delete_if_exists().await.unwrap());
    assert_eq!(share.delete().await.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_quota_round_trip() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("quota");
    share.create().await.unwrap();

    let mut properties = share.fetch_properties().await.unwrap();
    assert_eq!(properties.quota(), Quota::Unset);
    assert!(!properties.is_modified());

    properties.set_quota(Quota::Limit(10));
    assert!(properties.is_modified());
    share.set_properties(&properties).await.unwrap();

    let fetched = share.fetch_properties().await.unwrap();
    assert_eq!(fetched.quota(), Quota::Limit(10));
    assert_ne!(fetched.etag(), properties.etag());
}

#[tokio::test]
async fn test_quota_below_usage_blocks_growth_only() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("full");
    share.create().await.unwrap();

    let big = share.file("big.bin");
    big.create(gib_to_bytes(3)).await.unwrap();

    let mut properties = share.fetch_properties().await.unwrap();
    properties.set_quota(Quota::Limit(1));
    share.set_properties(&properties).await.unwrap();

    assert_eq!(share.fetch_properties().await.unwrap().quota(), Quota::Limit(1));
    assert_eq!(share.get_stats().await.unwrap().usage_gib(), 3);

    // Existing data stays readable and shrinking is allowed
    assert!(big.exists().await.unwrap());
    big.create(gib_to_bytes(2)).await.unwrap();

    let err = share.file("more.txt").upload_text("x").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    assert!(!share.file("more.txt").exists().await.unwrap());
}

#[tokio::test]
async fn test_quota_caps_uploads() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("capped");
    share.create().await.unwrap();

    let mut properties = share.fetch_properties().await.unwrap();
    properties.set_quota(Quota::Limit(1));
    share.set_properties(&properties).await.unwrap();

    share.file("a.bin").create(gib_to_bytes(1)).await.unwrap();
    let err = share.file("b.bin").create(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    assert!(err.has_service_code(ServiceErrorCode::ShareSizeLimitReached));
}

#[tokio::test]
async fn test_stats_track_usage() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("stats");
    share.create().await.unwrap();
    assert_eq!(share.get_stats().await.unwrap().usage_bytes, 0);

    share.file("a.txt").upload_text("hello").await.unwrap();
    share.file("b.txt").upload_text("world!").await.unwrap();
    assert_eq!(share.get_stats().await.unwrap().usage_bytes, 11);

    share.file("a.txt").delete().await.unwrap();
    assert_eq!(share.get_stats().await.unwrap().usage_bytes, 6);
}

#[tokio::test]
async fn test_missing_share_is_not_found() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("nowhere");

    assert!(!share.exists().await.unwrap());
    assert_eq!(share.get_stats().await.unwrap_err().kind, ErrorKind::NotFound);
    assert_eq!(share.fetch_properties().await.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_directory_tree() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("tree");
    share.create().await.unwrap();

    let logs = share.directory("logs");
    assert!(logs.create_if_not_exists().await.unwrap());
    assert!(!logs.create_if_not_exists().await.unwrap());
    logs.subdirectory("2024").create().await.unwrap();
    logs.file("today.log").upload_text("started").await.unwrap();

    let entries = logs.list().await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["2024", "today.log"]);
    assert!(entries[0].is_directory());
    assert!(!entries[1].is_directory());

    let root = share.root_directory().list().await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "logs");
}

#[tokio::test]
async fn test_directory_needs_parent() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("orphans");
    share.create().await.unwrap();

    let err = share.directory("a/b").create().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.has_service_code(ServiceErrorCode::ParentNotFound));

    let err = share.file("a/b.txt").upload_text("x").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_non_empty_directory_fails() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("busy");
    share.create().await.unwrap();

    let dir = share.directory("data");
    dir.create().await.unwrap();
    dir.file("x.txt").upload_text("x").await.unwrap();

    let err = dir.delete().await.unwrap_err();
    assert!(err.has_service_code(ServiceErrorCode::DirectoryNotEmpty));

    dir.file("x.txt").delete().await.unwrap();
    dir.delete().await.unwrap();
    assert!(!dir.exists().await.unwrap());
}

#[tokio::test]
async fn test_malformed_quota_header_fails_fetch() {
    let mut headers = HeaderMap::new();
    headers.insert("x-ms-share-quota", HeaderValue::from_static("plenty"));
    headers.insert("etag", HeaderValue::from_static("\"0x1\""));
    let config = ConnectionConfig::parse(&connection_string(ACCOUNT, DEV_ACCOUNT_KEY)).unwrap();
    let transport = Arc::new(CannedHeaders(headers));
    let account =
        StorageAccount::with_transport(config, ClientOptions::default(), transport).unwrap();

    let err = account
        .file_service_client()
        .share("odd")
        .fetch_properties()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
}
