//! Contract Test: Renewal Decision & Persistence
//!
//! Constraints verified:
//! - A missing certificate is issued with the group's full name list
//! - A certificate outside the threshold is left alone with no ACME order
//! - An unparseable certificate is replaced
//! - Persisted certificates re-inspect to the expiry that was issued
//! - Registration happens at most once per run

mod common;

use certrenew_core::inspector;
use certrenew_core::store::cert_paths;
use certrenew_core::{DomainOutcome, ProviderRegistry, Renewer};
use chrono::TimeDelta;
use common::*;

fn registry_with_mock() -> (ProviderRegistry, MockChallengeProvider) {
    let mut registry = ProviderRegistry::new();
    let provider = MockChallengeProvider::new();
    provider.register_as(&mut registry, "mock");
    (registry, provider)
}

#[tokio::test]
async fn absent_certificate_is_obtained_with_all_names() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, provider) = registry_with_mock();
    let config = config_in(
        dir.path(),
        vec![domain(&["example.com", "www.example.com"], "mock").with_credential("api_token", "t")],
    );

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert_eq!(report.renewed(), 1);
    assert_eq!(renewer.client().obtain_call_count(), 1);

    let requests = renewer.client().requests();
    assert_eq!(requests[0].domains, vec!["example.com", "www.example.com"]);
    assert!(requests[0].bundle);

    assert_eq!(provider.presented(), vec!["example.com", "www.example.com"]);
    assert_eq!(provider.cleanup_call_count(), 2);

    let paths = cert_paths(&config.cert_dir, &config.domains[0].names);
    assert!(paths.certificate.exists());
    assert!(paths.private_key.exists());
}

#[tokio::test]
async fn valid_certificate_is_skipped_without_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, provider) = registry_with_mock();
    let group = domain(&["example.com"], "mock").with_credential("api_token", "t");
    let config = config_in(dir.path(), vec![group.clone()]);

    write_existing_cert(&config.cert_dir, &group.names, 90);
    let paths = cert_paths(&config.cert_dir, &group.names);
    let before = std::fs::read(&paths.certificate).unwrap();

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert_eq!(report.skipped(), 1);
    assert_eq!(renewer.client().obtain_call_count(), 0);
    assert!(provider.presented().is_empty());

    match report.outcome("example.com") {
        Some(DomainOutcome::Skipped { remaining, .. }) => {
            assert!(*remaining > TimeDelta::days(89));
            assert!(*remaining <= TimeDelta::days(90));
        }
        other => panic!("expected Skipped, got {:?}", other),
    }

    assert_eq!(std::fs::read(&paths.certificate).unwrap(), before);
}

#[tokio::test]
async fn certificate_inside_threshold_is_renewed() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let group = domain(&["example.com"], "mock").with_credential("api_token", "t");
    let config = config_in(dir.path(), vec![group.clone()]);

    write_existing_cert(&config.cert_dir, &group.names, 10);

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert_eq!(report.renewed(), 1);
    assert_eq!(renewer.client().obtain_call_count(), 1);
}

#[tokio::test]
async fn expired_certificate_is_renewed() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let group = domain(&["example.com"], "mock").with_credential("api_token", "t");
    let config = config_in(dir.path(), vec![group.clone()]);

    write_existing_cert(&config.cert_dir, &group.names, -3);

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    assert_eq!(renewer.run().await.renewed(), 1);
}

#[tokio::test]
async fn garbage_certificate_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let group = domain(&["example.com"], "mock").with_credential("api_token", "t");
    let config = config_in(dir.path(), vec![group.clone()]);

    let paths = cert_paths(&config.cert_dir, &group.names);
    std::fs::create_dir_all(&config.cert_dir).unwrap();
    std::fs::write(&paths.certificate, b"garbage").unwrap();

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert_eq!(report.renewed(), 1);
    assert!(inspector::inspect(&paths.certificate).await.is_ok());
}

#[tokio::test]
async fn persisted_certificate_reinspects_to_issued_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let group = domain(&["example.com"], "mock").with_credential("api_token", "t");
    let config = config_in(dir.path(), vec![group.clone()]);

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    let issued_not_after = match report.outcome("example.com") {
        Some(DomainOutcome::Renewed { not_after }) => not_after.unwrap(),
        other => panic!("expected Renewed, got {:?}", other),
    };

    let paths = cert_paths(&config.cert_dir, &group.names);
    let state = inspector::inspect(&paths.certificate).await.unwrap();
    assert_eq!(state.not_after, Some(issued_not_after));

    // A second run sees the fresh certificate and leaves it alone
    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;
    assert_eq!(report.skipped(), 1);
    assert_eq!(renewer.client().obtain_call_count(), 0);
}

#[tokio::test]
async fn registration_happens_once_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let config = config_in(
        dir.path(),
        vec![
            domain(&["a.example.com"], "mock").with_credential("api_token", "t"),
            domain(&["b.example.com"], "mock").with_credential("api_token", "t"),
            domain(&["c.example.com"], "mock").with_credential("api_token", "t"),
        ],
    );

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert_eq!(report.renewed(), 3);
    assert_eq!(renewer.client().register_call_count(), 1);
    assert_eq!(renewer.account().registration().map(String::as_str), Some("admin@example.com#0"));
}

#[tokio::test]
async fn failed_registration_is_retried_by_next_domain() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let config = config_in(
        dir.path(),
        vec![
            domain(&["a.example.com"], "mock").with_credential("api_token", "t"),
            domain(&["b.example.com"], "mock").with_credential("api_token", "t"),
            domain(&["c.example.com"], "mock").with_credential("api_token", "t"),
        ],
    );

    let client = MockAcmeClient::new().failing_registrations(1);
    let mut renewer = Renewer::new(&config, &registry, client, test_account());
    let report = renewer.run().await;

    assert!(matches!(
        report.outcome("a.example.com"),
        Some(DomainOutcome::Failed(certrenew_core::Error::Registration(_)))
    ));
    assert_eq!(report.renewed(), 2);
    assert_eq!(renewer.client().register_call_count(), 2);
}

#[tokio::test]
async fn threshold_defaults_to_thirty_days() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, _provider) = registry_with_mock();
    let fresh = domain(&["fresh.example.com"], "mock").with_credential("api_token", "t");
    let stale = domain(&["stale.example.com"], "mock").with_credential("api_token", "t");
    let mut config = config_in(dir.path(), vec![fresh.clone(), stale.clone()]);
    config.renew_before = 0;

    write_existing_cert(&config.cert_dir, &fresh.names, 31);
    write_existing_cert(&config.cert_dir, &stale.names, 29);

    let mut renewer = Renewer::new(&config, &registry, MockAcmeClient::new(), test_account());
    let report = renewer.run().await;

    assert!(matches!(
        report.outcome("fresh.example.com"),
        Some(DomainOutcome::Skipped { .. })
    ));
    assert!(matches!(
        report.outcome("stale.example.com"),
        Some(DomainOutcome::Renewed { .. })
    ));
}
