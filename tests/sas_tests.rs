//! Shared access signature tests.

mod common;

use chrono::Duration;

use common::TestAccount;

use azfiles_rs::models::{SasPermission, SasPermissions, SharedAccessPolicy};
use azfiles_rs::{BlobHandle, ErrorKind, FileHandle, SasGrant, ShareHandle};

fn grant(permissions: SasPermissions, hours: i64) -> SasGrant {
    SasGrant::AdHoc(SharedAccessPolicy::valid_for(permissions, Duration::hours(hours)))
}

async fn share_with_file(test: &TestAccount) -> (ShareHandle, FileHandle) {
    let share = test.account.file_service_client().share("secured");
    share.create().await.unwrap();
    let file = share.file("report.txt");
    file.upload_text("quarterly numbers").await.unwrap();
    (share, file)
}

#[tokio::test]
async fn test_read_token_reads_but_cannot_write() {
    let test = TestAccount::new();
    let (_, file) = share_with_file(&test).await;

    let url = file.sas_url(&grant(SasPermissions::read_only(), 24)).unwrap();
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();

    assert_eq!(reader.download_text().await.unwrap(), "quarterly numbers");
    assert!(reader.exists().await.unwrap());

    let err = reader.upload_text("tampered").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
    assert_eq!(file.download_text().await.unwrap(), "quarterly numbers");
}

#[tokio::test]
async fn test_token_expires() {
    let test = TestAccount::new();
    let (_, file) = share_with_file(&test).await;

    let url = file.sas_url(&grant(SasPermissions::read_only(), 24)).unwrap();
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();
    reader.download_text().await.unwrap();

    test.backend.advance_clock(Duration::hours(25));

    let err = reader.download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_token_does_not_open_other_files() {
    let test = TestAccount::new();
    let (share, file) = share_with_file(&test).await;
    share.file("other.txt").upload_text("private").await.unwrap();

    let mut url = file.sas_url(&grant(SasPermissions::read_only(), 1)).unwrap();
    url.set_path("/secured/other.txt");
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();

    let err = reader.download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_tampered_signature_is_rejected() {
    let test = TestAccount::new();
    let (_, file) = share_with_file(&test).await;

    let url = file.sas_url(&grant(SasPermissions::read_only(), 1)).unwrap();
    // Widening the permissions invalidates the signature
    let tampered = url.as_str().replace("sp=r", "sp=rw");
    let reader = FileHandle::from_sas_url(&tampered.parse().unwrap(), test.transport()).unwrap();

    let err = reader.download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_share_token_covers_its_files() {
    let test = TestAccount::new();
    let (share, _) = share_with_file(&test).await;

    let permissions = SasPermissions::read_write().with(SasPermission::Create);
    let token = share.shared_access_signature(&grant(permissions, 1)).unwrap();

    let mut url = share.file("fresh.txt").url().clone();
    token.apply_to(&mut url);
    let writer = FileHandle::from_sas_url(&url, test.transport()).unwrap();
    writer.upload_text("written with a share token").await.unwrap();

    assert_eq!(
        share.file("fresh.txt").download_text().await.unwrap(),
        "written with a share token"
    );
}

#[tokio::test]
async fn test_sas_cannot_manage_shares() {
    let test = TestAccount::new();
    let (share, file) = share_with_file(&test).await;

    let url = share.sas_url(&grant(SasPermissions::all(), 1)).unwrap();
    assert!(url.query().unwrap().contains("sr=s"));

    let url = file.sas_url(&grant(SasPermissions::all(), 1)).unwrap();
    let holder = FileHandle::from_sas_url(&url, test.transport()).unwrap();
    let err = holder.share().delete().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
    assert!(share.exists().await.unwrap());
}

#[tokio::test]
async fn test_sas_handle_cannot_mint_tokens() {
    let test = TestAccount::new();
    let (_, file) = share_with_file(&test).await;

    let url = file.sas_url(&grant(SasPermissions::read_only(), 1)).unwrap();
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();

    let err = reader
        .shared_access_signature(&grant(SasPermissions::read_only(), 1))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
}

#[tokio::test]
async fn test_stored_policy_grants_and_revokes() {
    let test = TestAccount::new();
    let (share, file) = share_with_file(&test).await;

    let policy = SharedAccessPolicy::valid_for(SasPermissions::read_only(), Duration::hours(24));
    share.add_access_policy("readers", policy).await.unwrap();
    assert_eq!(share.get_access_policies().await.unwrap().len(), 1);

    let url = file.sas_url(&SasGrant::stored("readers")).unwrap();
    assert!(url.query().unwrap().contains("si=readers"));
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();
    assert_eq!(reader.download_text().await.unwrap(), "quarterly numbers");

    assert!(share.remove_access_policy("readers").await.unwrap());
    assert!(!share.remove_access_policy("readers").await.unwrap());

    let err = reader.download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_ad_hoc_token_survives_policy_removal() {
    let test = TestAccount::new();
    let (share, file) = share_with_file(&test).await;
    let policy = SharedAccessPolicy::valid_for(SasPermissions::read_only(), Duration::hours(24));
    share.add_access_policy("readers", policy).await.unwrap();

    let url = file.sas_url(&grant(SasPermissions::read_only(), 24)).unwrap();
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();
    assert_eq!(reader.download_text().await.unwrap(), "quarterly numbers");

    // Ad hoc tokens do not consult the share's policy set
    assert!(share.remove_access_policy("readers").await.unwrap());
    share.set_access_policies(&[]).await.unwrap();
    assert!(share.get_access_policies().await.unwrap().is_empty());

    assert_eq!(reader.download_text().await.unwrap(), "quarterly numbers");
}

#[tokio::test]
async fn test_unknown_stored_policy_is_rejected() {
    let test = TestAccount::new();
    let (_, file) = share_with_file(&test).await;

    let url = file.sas_url(&SasGrant::stored("nobody")).unwrap();
    let reader = FileHandle::from_sas_url(&url, test.transport()).unwrap();

    let err = reader.download_text().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_container_policy_and_blob_token() {
    let test = TestAccount::new();
    let container = test.account.blob_service_client().container("archive");
    container.create().await.unwrap();
    let blob = container.blob("2024.tar");
    blob.upload_bytes(vec![7u8; 32]).await.unwrap();

    let policy = SharedAccessPolicy::valid_for(SasPermissions::read_only(), Duration::hours(1));
    container.add_access_policy("fetch", policy).await.unwrap();

    let url = blob.sas_url(&SasGrant::stored("fetch")).unwrap();
    let reader = BlobHandle::from_sas_url(&url, test.transport()).unwrap();
    assert_eq!(reader.download_to_bytes().await.unwrap().as_ref(), &[7u8; 32]);

    let err = reader.delete().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AuthorizationFailed);
}

#[tokio::test]
async fn test_too_many_policies_are_refused_locally() {
    let test = TestAccount::new();
    let (share, _) = share_with_file(&test).await;

    for id in ["a", "b", "c", "d", "e"] {
        let policy = SharedAccessPolicy::valid_for(SasPermissions::read_only(), Duration::hours(1));
        share.add_access_policy(id, policy).await.unwrap();
    }

    let before = test.backend.request_count();
    let policy = SharedAccessPolicy::valid_for(SasPermissions::read_only(), Duration::hours(1));
    let err = share.add_access_policy("f", policy).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    // Only the read of the current policy set went out
    assert_eq!(test.backend.request_count() - before, 1);
}
