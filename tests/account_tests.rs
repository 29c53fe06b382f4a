//! Connection string and account construction tests.

mod common;

use common::{connection_string, TestAccount, ACCOUNT};

use azfiles_rs::{ErrorKind, StorageAccount, DEV_ACCOUNT_KEY};

#[test]
fn test_accounts_build_without_network() {
    let account =
        StorageAccount::from_connection_string(&connection_string(ACCOUNT, DEV_ACCOUNT_KEY))
            .unwrap();

    assert_eq!(
        account.file_endpoint().as_str(),
        "https://teststore.file.core.windows.net/"
    );
    assert_eq!(
        account.blob_endpoint().as_str(),
        "https://teststore.blob.core.windows.net/"
    );
}

#[tokio::test]
async fn test_handles_share_the_account_pipeline() {
    let test = TestAccount::new();
    let share = test.account.file_service_client().share("handles");
    share.create().await.unwrap();

    let file = share.directory("a").file("b.txt");
    assert_eq!(file.path(), "a/b.txt");
    assert_eq!(file.account_name(), ACCOUNT);
    assert_eq!(
        file.url().as_str(),
        "https://teststore.file.core.windows.net/handles/a/b.txt"
    );
}

#[tokio::test]
async fn test_unknown_account_is_rejected_by_backend() {
    let test = TestAccount::new();
    let stranger = common::account_on(&test.backend, "stranger", DEV_ACCOUNT_KEY);

    let err = stranger
        .file_service_client()
        .share("any")
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
}
