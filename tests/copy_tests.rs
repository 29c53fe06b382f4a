//! Server-side copy tests.

mod common;

use chrono::Duration;
use std::time::Duration as StdDuration;

use common::TestAccount;

use azfiles_rs::models::{CopyStatus, SasPermission, SasPermissions, SharedAccessPolicy};
use azfiles_rs::{CopySource, ErrorKind, FileHandle, SasGrant, ServiceErrorCode};

const POLL: StdDuration = StdDuration::from_millis(1);

fn read_grant() -> SasGrant {
    SasGrant::AdHoc(SharedAccessPolicy::valid_for(
        SasPermissions::read_only(),
        Duration::hours(1),
    ))
}

async fn source_file(test: &TestAccount, text: &str) -> FileHandle {
    let share = test.account.file_service_client().share("source");
    share.create_if_not_exists().await.unwrap();
    let file = share.file("original.txt");
    file.upload_text(text).await.unwrap();
    file
}

#[tokio::test]
async fn test_copy_within_share() {
    let test = TestAccount::new();
    let source = source_file(&test, "copy me").await;
    let target = source.share().file("duplicate.txt");

    let started = target.start_copy(&CopySource::from_file(&source)).await.unwrap();
    assert_eq!(started.status, CopyStatus::Success);

    let state = target.copy_status().await.unwrap().unwrap();
    assert_eq!(state.copy_id, started.copy_id);
    assert_eq!(state.status, CopyStatus::Success);
    assert!(state.completion_time.is_some());

    assert_eq!(target.download_text().await.unwrap(), "copy me");
    let properties = target.properties().await.unwrap();
    assert_eq!(properties.content_type.as_deref(), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn test_copy_between_shares() {
    let test = TestAccount::new();
    let source = source_file(&test, "across shares").await;
    let backup = test.account.file_service_client().share("backup");
    backup.create().await.unwrap();

    let target = backup.file("original.txt");
    target.start_copy(&CopySource::from_file(&source)).await.unwrap();

    assert_eq!(target.download_text().await.unwrap(), "across shares");
}

#[tokio::test]
async fn test_pending_copy_completes() {
    let test = TestAccount::with_pending_copies(3);
    let source = source_file(&test, "slow copy").await;
    let target = source.share().file("later.txt");

    let started = target.start_copy(&CopySource::from_file(&source)).await.unwrap();
    assert_eq!(started.status, CopyStatus::Pending);

    let pending = target.copy_status().await.unwrap().unwrap();
    assert_eq!(pending.status, CopyStatus::Pending);
    assert_eq!(pending.progress.unwrap().copied, 0);

    let done = target.wait_for_copy(POLL).await.unwrap();
    assert_eq!(done.status, CopyStatus::Success);
    assert_eq!(done.copy_id, started.copy_id);
    assert_eq!(target.download_text().await.unwrap(), "slow copy");
}

#[tokio::test]
async fn test_abort_pending_copy() {
    let test = TestAccount::with_pending_copies(100);
    let source = source_file(&test, "never arrives").await;
    let target = source.share().file("aborted.txt");

    let started = target.start_copy(&CopySource::from_file(&source)).await.unwrap();
    target.abort_copy(&started.copy_id).await.unwrap();

    let state = target.copy_status().await.unwrap().unwrap();
    assert_eq!(state.status, CopyStatus::Aborted);
    assert_eq!(target.properties().await.unwrap().content_length, 0);

    let err = target.abort_copy(&started.copy_id).await.unwrap_err();
    assert!(err.has_service_code(ServiceErrorCode::NoPendingCopyOperation));
}

#[tokio::test]
async fn test_abort_with_wrong_id() {
    let test = TestAccount::with_pending_copies(100);
    let source = source_file(&test, "data").await;
    let target = source.share().file("busy.txt");

    target.start_copy(&CopySource::from_file(&source)).await.unwrap();

    let err = target.abort_copy("not-the-copy-id").await.unwrap_err();
    assert!(err.has_service_code(ServiceErrorCode::CopyIdMismatch));

    // A second copy onto the same destination waits for the first
    let err = target.start_copy(&CopySource::from_file(&source)).await.unwrap_err();
    assert!(err.has_service_code(ServiceErrorCode::PendingCopyOperation));
}

#[tokio::test]
async fn test_cross_service_copy_needs_sas() {
    let test = TestAccount::new();
    let source = source_file(&test, "to blobs").await;
    let container = test.account.blob_service_client().container("mirror");
    container.create().await.unwrap();
    let blob = container.blob("original.txt");

    let before = test.backend.request_count();
    let err = blob.start_copy(&CopySource::from_file(&source)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    assert_eq!(test.backend.request_count(), before);

    let with_sas = source.copy_source_with_sas(&read_grant()).unwrap();
    blob.start_copy(&with_sas).await.unwrap();
    let state = blob.wait_for_copy(POLL).await.unwrap();

    assert_eq!(state.status, CopyStatus::Success);
    assert_eq!(blob.download_text().await.unwrap(), "to blobs");
}

#[tokio::test]
async fn test_blob_to_file_copy() {
    let test = TestAccount::new();
    let container = test.account.blob_service_client().container("inbox");
    container.create().await.unwrap();
    let blob = container.blob("upload.bin");
    blob.upload_bytes(vec![1u8, 2, 3, 4]).await.unwrap();

    let share = test.account.file_service_client().share("landing");
    share.create().await.unwrap();
    let target = share.file("upload.bin");

    let source = blob.copy_source_with_sas(&read_grant()).unwrap();
    target.start_copy(&source).await.unwrap();

    assert_eq!(target.download_to_bytes().await.unwrap().as_ref(), &[1u8, 2, 3, 4]);
}

#[tokio::test]
async fn test_cross_account_copy() {
    let test = TestAccount::new();
    let source = source_file(&test, "between accounts").await;

    let other = test.other_account();
    let share = other.file_service_client().share("inbound");
    share.create().await.unwrap();
    let target = share.file("received.txt");

    let err = target.start_copy(&CopySource::from_file(&source)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);

    let with_sas = source.copy_source_with_sas(&read_grant()).unwrap();
    target.start_copy(&with_sas).await.unwrap();
    assert_eq!(target.download_text().await.unwrap(), "between accounts");
}

#[tokio::test]
async fn test_copy_source_sas_must_grant_read() {
    let test = TestAccount::new();
    let source = source_file(&test, "write only").await;
    let target = source.share().file("denied.txt");

    let write_only = SasGrant::AdHoc(SharedAccessPolicy::valid_for(
        SasPermissions::default().with(SasPermission::Write),
        Duration::hours(1),
    ));
    let err = target
        .start_copy(&source.copy_source_with_sas(&write_only).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
    assert!(err.has_service_code(ServiceErrorCode::CannotVerifyCopySource));
}

#[tokio::test]
async fn test_copy_missing_source() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("empty");
    share.create().await.unwrap();

    let err = share
        .file("target.txt")
        .start_copy(&CopySource::from_file(&share.file("missing.txt")))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_wait_without_copy() {
    let test = TestAccount::new();
    let source = source_file(&test, "plain upload").await;

    let err = source.wait_for_copy(POLL).await.unwrap_err();
    assert!(err.has_service_code(ServiceErrorCode::NoPendingCopyOperation));
}
