// # Challenge Provider Trait
//
// Defines the interface for publishing DNS-01 challenge records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `certrenew-provider-cloudflare` crate
// - Porkbun: `certrenew-provider-porkbun` crate
// - Hurricane Electric: `certrenew-provider-hurricane` crate
// - Tencent Cloud DNSPod: `certrenew-provider-tencentcloud` crate
//
// ## Usage
//
// ```rust,ignore
// use certrenew_core::ChallengeProvider;
//
// async fn solve(provider: &dyn ChallengeProvider, key_auth: &str) -> certrenew_core::Result<()> {
//     provider.present("example.com", "token", key_auth).await?;
//     // ... ACME server validates ...
//     provider.cleanup("example.com", "token", key_auth).await
// }
// ```

use async_trait::async_trait;
use std::time::Duration;

use crate::config::DomainConfig;

/// How long the ACME client waits for a challenge record, and how often it checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeTimeout {
    /// Upper bound for propagation and validation
    pub timeout: Duration,
    /// Delay between checks
    pub interval: Duration,
}

impl ChallengeTimeout {
    /// Create a new timeout policy
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for ChallengeTimeout {
    /// 120 seconds, polled every 2 seconds
    fn default() -> Self {
        Self::new(Duration::from_secs(120), Duration::from_secs(2))
    }
}

/// Trait for DNS-01 challenge backends
///
/// A provider creates the `_acme-challenge` TXT record for a domain and
/// removes it again once the ACME server has validated it.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// - ✅ Perform API calls to their own DNS endpoints
/// - ✅ Remember whatever they need (e.g. record ids) to clean up later
/// - ❌ No retry logic or backoff (a failed run is retried by the next invocation)
/// - ❌ No decisions about whether a certificate needs renewal
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Publish the TXT record for a challenge
    ///
    /// # Parameters
    ///
    /// - `domain`: The identifier being validated (e.g. "example.com")
    /// - `token`: The ACME challenge token
    /// - `key_auth`: The key authorization; the record value is derived from it
    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> crate::Result<()>;

    /// Remove the TXT record published by [`present`](Self::present)
    async fn cleanup(&self, domain: &str, token: &str, key_auth: &str) -> crate::Result<()>;

    /// Custom propagation timeout, if this backend has one
    ///
    /// Backends without a preference return `None` and the caller falls
    /// back to [`ChallengeTimeout::default`].
    fn timeout(&self) -> Option<ChallengeTimeout> {
        None
    }

    /// Whether challenges must be solved one at a time
    ///
    /// Backends that hold a single TXT value per record name return `true`;
    /// the ACME client then presents, validates and cleans up each
    /// challenge before presenting the next one.
    fn sequential(&self) -> bool {
        false
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing challenge providers from configuration
///
/// Implemented for any `Fn(&DomainConfig) -> Result<Box<dyn ChallengeProvider>>`,
/// so plain functions can be registered directly.
pub trait ChallengeProviderFactory: Send + Sync {
    /// Create a ChallengeProvider instance for one domain group
    ///
    /// Fails with [`crate::Error::MissingCredential`] when a required
    /// credential is absent.
    fn create(&self, config: &DomainConfig) -> crate::Result<Box<dyn ChallengeProvider>>;
}

impl<F> ChallengeProviderFactory for F
where
    F: Fn(&DomainConfig) -> crate::Result<Box<dyn ChallengeProvider>> + Send + Sync,
{
    fn create(&self, config: &DomainConfig) -> crate::Result<Box<dyn ChallengeProvider>> {
        self(config)
    }
}
