// # ACME Client Trait
//
// The boundary between the renewal engine and the ACME protocol
// implementation. The engine supplies an [`Account`] and a resolved
// [`ChallengeProvider`]; the client hands back a registration handle and,
// on obtain, the issued certificate chain with its private key.

use async_trait::async_trait;

use crate::account::Account;
use crate::traits::ChallengeProvider;

/// A certificate order for one domain group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainRequest {
    /// All names to include, canonical name first
    pub domains: Vec<String>,
    /// Return the leaf certificate concatenated with its issuer chain
    pub bundle: bool,
}

impl ObtainRequest {
    /// Create a bundled request for the given names
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            bundle: true,
        }
    }
}

/// Certificate material returned by a successful order
#[derive(Clone)]
pub struct IssuedCertificate {
    /// Canonical domain the certificate was ordered for
    pub domain: String,
    /// PEM certificate (chain when bundled)
    pub certificate: String,
    /// PEM private key matching the certificate
    pub private_key: String,
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("domain", &self.domain)
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<REDACTED>")
            .finish()
    }
}

/// Trait for ACME protocol clients
///
/// # Registration
///
/// `register` performs account registration (terms of service accepted)
/// for the account's key. The engine calls it at most once per run and
/// caches the returned handle in the [`Account`].
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Opaque registration handle
    type Registration: Send + Sync;

    /// Register (or look up) the ACME account for this key
    async fn register(
        &self,
        account: &Account<Self::Registration>,
    ) -> crate::Result<Self::Registration>;

    /// Order, validate and download a certificate through `provider`
    ///
    /// The account is guaranteed to carry a registration.
    async fn obtain(
        &self,
        account: &Account<Self::Registration>,
        request: &ObtainRequest,
        provider: &dyn ChallengeProvider,
    ) -> crate::Result<IssuedCertificate>;
}
