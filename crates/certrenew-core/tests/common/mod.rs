//! Test doubles and common utilities for renewal flow tests
//!
//! The doubles count their calls through shared `Arc` counters so a test
//! can keep a handle while the renewer owns the instance.

#![allow(dead_code)]

use certrenew_core::error::{Error, Result};
use certrenew_core::traits::{ChallengeProvider, IssuedCertificate, ObtainRequest};
use certrenew_core::{Account, AcmeClient, DomainConfig, ProviderRegistry, RenewConfig};
use rcgen::{CertificateParams, KeyPair};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Self-signed PEM certificate for `names` expiring `days` from now
pub fn pem_valid_for_days(names: &[String], days: i64) -> (String, String) {
    let not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    pem_expiring_at(names, not_after)
}

/// Self-signed PEM certificate and key with a fixed NotAfter
pub fn pem_expiring_at(names: &[String], not_after: time::OffsetDateTime) -> (String, String) {
    let mut params = CertificateParams::new(names.to_vec()).unwrap();
    params.not_before = not_after - time::Duration::days(90);
    params.not_after = not_after;
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// Write a certificate for `names` into `cert_dir` the way the store names it
pub fn write_existing_cert(cert_dir: &Path, names: &[String], days: i64) {
    std::fs::create_dir_all(cert_dir).unwrap();
    let (cert, key) = pem_valid_for_days(names, days);
    std::fs::write(cert_dir.join(format!("{}.crt", names[0])), cert).unwrap();
    std::fs::write(cert_dir.join(format!("{}.key", names[0])), key).unwrap();
}

/// Configuration with the given domain groups, writing into `root`
pub fn config_in(root: &Path, domains: Vec<DomainConfig>) -> RenewConfig {
    RenewConfig {
        email: "admin@example.com".to_string(),
        domains,
        cert_dir: root.join("certs"),
        account_dir: root.join("accounts"),
        post_renew_hooks: Vec::new(),
        renew_before: 30,
        acme_directory: "https://acme.invalid/directory".to_string(),
    }
}

/// Fresh, unregistered account
pub fn test_account() -> Account<String> {
    Account::new("admin@example.com", certrenew_core::AccountKey::generate().unwrap())
}

pub fn domain(names: &[&str], provider: &str) -> DomainConfig {
    DomainConfig::new(names.iter().map(|n| n.to_string()).collect(), provider)
}

/// A mock AcmeClient that issues self-signed certificates
pub struct MockAcmeClient {
    /// Call counter for register()
    register_call_count: Arc<AtomicUsize>,
    /// Call counter for obtain()
    obtain_call_count: Arc<AtomicUsize>,
    /// Requests passed to obtain()
    requests: Arc<Mutex<Vec<ObtainRequest>>>,
    /// Number of upcoming register() calls that fail
    failing_registrations: Arc<AtomicUsize>,
    /// Canonical names whose obtain() fails
    failing_domains: Vec<String>,
    /// Validity of issued certificates
    validity_days: i64,
}

impl MockAcmeClient {
    pub fn new() -> Self {
        Self {
            register_call_count: Arc::new(AtomicUsize::new(0)),
            obtain_call_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            failing_registrations: Arc::new(AtomicUsize::new(0)),
            failing_domains: Vec::new(),
            validity_days: 90,
        }
    }

    /// Fail the next `n` registrations
    pub fn failing_registrations(self, n: usize) -> Self {
        self.failing_registrations.store(n, Ordering::SeqCst);
        self
    }

    /// Fail obtain() for a canonical name
    pub fn failing_domain(mut self, name: &str) -> Self {
        self.failing_domains.push(name.to_string());
        self
    }

    /// Get the number of times register() was called
    pub fn register_call_count(&self) -> usize {
        self.register_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times obtain() was called
    pub fn obtain_call_count(&self) -> usize {
        self.obtain_call_count.load(Ordering::SeqCst)
    }

    /// Get every request passed to obtain()
    pub fn requests(&self) -> Vec<ObtainRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AcmeClient for MockAcmeClient {
    type Registration = String;

    async fn register(&self, account: &Account<String>) -> Result<String> {
        let n = self.register_call_count.fetch_add(1, Ordering::SeqCst);

        let pending = self.failing_registrations.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_registrations.store(pending - 1, Ordering::SeqCst);
            return Err(Error::registration("server unavailable"));
        }

        Ok(format!("{}#{}", account.email(), n))
    }

    async fn obtain(
        &self,
        account: &Account<String>,
        request: &ObtainRequest,
        provider: &dyn ChallengeProvider,
    ) -> Result<IssuedCertificate> {
        self.obtain_call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        assert!(account.registration().is_some(), "obtain before registration");

        let canonical = request.domains[0].clone();
        if self.failing_domains.contains(&canonical) {
            return Err(Error::acme("order rejected"));
        }

        for name in &request.domains {
            provider.present(name, "token", "token.thumbprint").await?;
        }
        for name in &request.domains {
            provider.cleanup(name, "token", "token.thumbprint").await?;
        }

        let (certificate, private_key) = pem_valid_for_days(&request.domains, self.validity_days);
        Ok(IssuedCertificate {
            domain: canonical,
            certificate,
            private_key,
        })
    }
}

/// A mock ChallengeProvider that tracks calls
#[derive(Clone)]
pub struct MockChallengeProvider {
    /// Domains passed to present()
    presented: Arc<Mutex<Vec<String>>>,
    /// Call counter for cleanup()
    cleanup_call_count: Arc<AtomicUsize>,
}

impl MockChallengeProvider {
    pub fn new() -> Self {
        Self {
            presented: Arc::new(Mutex::new(Vec::new())),
            cleanup_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the domains presented so far
    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }

    /// Get the number of times cleanup() was called
    pub fn cleanup_call_count(&self) -> usize {
        self.cleanup_call_count.load(Ordering::SeqCst)
    }

    /// Create a new MockChallengeProvider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            presented: Arc::clone(&other.presented),
            cleanup_call_count: Arc::clone(&other.cleanup_call_count),
        }
    }

    /// Register under `name`; the factory requires an `api_token` credential
    pub fn register_as(&self, registry: &mut ProviderRegistry, name: &str) {
        let shared = self.clone();
        registry.register_provider(
            name,
            move |config: &DomainConfig| -> Result<Box<dyn ChallengeProvider>> {
                config.credential("api_token")?;
                Ok(Box::new(MockChallengeProvider::sharing_counters_with(&shared)))
            },
        );
    }
}

#[async_trait::async_trait]
impl ChallengeProvider for MockChallengeProvider {
    async fn present(&self, domain: &str, _token: &str, _key_auth: &str) -> Result<()> {
        self.presented.lock().unwrap().push(domain.to_string());
        Ok(())
    }

    async fn cleanup(&self, _domain: &str, _token: &str, _key_auth: &str) -> Result<()> {
        self.cleanup_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
