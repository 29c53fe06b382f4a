//! File service metrics configuration tests.

mod common;

use common::TestAccount;

use azfiles_rs::models::{MetricsConfig, MetricsGranularity, MetricsLevel};
use azfiles_rs::ErrorKind;

#[tokio::test]
async fn test_metrics_default_to_disabled() {
    let test = TestAccount::new();
    let properties = test
        .account
        .file_service_client()
        .get_service_properties()
        .await
        .unwrap();

    assert_eq!(properties.hour_metrics.level, MetricsLevel::None);
    assert_eq!(properties.minute_metrics.level, MetricsLevel::None);
    assert!(properties.cors.is_empty());
}

#[tokio::test]
async fn test_metrics_round_trip() {
    let test = TestAccount::new();
    let files = test.account.file_service_client();

    let mut properties = files.get_service_properties().await.unwrap();
    properties.set_metrics(
        MetricsGranularity::Hour,
        MetricsConfig::new(MetricsLevel::ServiceAndApi, Some(14)),
    );
    properties.set_metrics(
        MetricsGranularity::Minute,
        MetricsConfig::new(MetricsLevel::Service, None),
    );
    files.set_service_properties(&properties).await.unwrap();

    let fetched = files.get_service_properties().await.unwrap();
    let hour = fetched.metrics(MetricsGranularity::Hour);
    assert_eq!(hour.level, MetricsLevel::ServiceAndApi);
    assert_eq!(hour.retention_days, Some(14));
    let minute = fetched.metrics(MetricsGranularity::Minute);
    assert_eq!(minute.level, MetricsLevel::Service);
    assert_eq!(minute.retention_days, None);
}

#[tokio::test]
async fn test_out_of_range_retention_is_rejected_locally() {
    let test = TestAccount::new();
    let files = test.account.file_service_client();
    let mut properties = files.get_service_properties().await.unwrap();
    properties.set_metrics(
        MetricsGranularity::Hour,
        MetricsConfig::new(MetricsLevel::Service, Some(400)),
    );

    let before = test.backend.request_count();
    let err = files.set_service_properties(&properties).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    assert_eq!(test.backend.request_count(), before);

    let fetched = files.get_service_properties().await.unwrap();
    assert_eq!(fetched.hour_metrics.level, MetricsLevel::None);
}

#[tokio::test]
async fn test_metrics_are_per_account() {
    let test = TestAccount::new();
    let files = test.account.file_service_client();
    let mut properties = files.get_service_properties().await.unwrap();
    properties.set_metrics(
        MetricsGranularity::Hour,
        MetricsConfig::new(MetricsLevel::Service, Some(7)),
    );
    files.set_service_properties(&properties).await.unwrap();

    let other = test.other_account().file_service_client();
    let untouched = other.get_service_properties().await.unwrap();
    assert_eq!(untouched.hour_metrics.level, MetricsLevel::None);
}

#[test]
fn test_metrics_level_parse() {
    assert_eq!(MetricsLevel::parse("service-and-api").unwrap(), MetricsLevel::ServiceAndApi);
    assert_eq!(MetricsLevel::parse("None").unwrap(), MetricsLevel::None);
    assert_eq!(
        MetricsLevel::parse("verbose").unwrap_err().kind,
        ErrorKind::InvalidConfiguration
    );
}
