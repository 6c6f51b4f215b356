//! ACME client for certrenew
//!
//! Implements [`certrenew_core::AcmeClient`] on top of `instant-acme`.
//!
//! ## Order flow
//!
//! 1. Create an order for every name of the domain group
//! 2. Publish the DNS-01 record of each pending authorization through the
//!    [`ChallengeProvider`]
//! 3. Wait until every record is visible through the system resolver
//! 4. Mark the challenges ready and poll the order until it is ready
//! 5. Finalize with a CSR signed by a freshly generated key
//! 6. Download the certificate chain
//!
//! Providers that report [`ChallengeProvider::sequential`] run steps 2 to 4
//! for one challenge at a time and remove its record before publishing the
//! next one.
//!
//! Published records are always removed again, whether the order
//! succeeded or not.

pub mod propagation;

use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    AccountBuilder, AuthorizationStatus, ChallengeType, Identifier, Key, NewOrder, Order,
    OrderStatus,
};
use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{debug, info, warn};

use certrenew_core::config::LETSENCRYPT_PRODUCTION;
use certrenew_core::dns01;
use certrenew_core::error::{Error, Result};
use certrenew_core::Account;
use certrenew_core::traits::{
    AcmeClient, ChallengeProvider, ChallengeTimeout, IssuedCertificate, ObtainRequest,
};

use crate::propagation::PropagationChecker;

/// Upper bound for certificate issuance after finalization
const ISSUANCE_TIMEOUT: Duration = Duration::from_secs(60);

/// One DNS-01 challenge taken from an order
#[derive(Debug, Clone)]
struct PendingChallenge {
    domain: String,
    token: String,
    key_authorization: String,
    url: String,
}

/// ACME client backed by `instant-acme`
#[derive(Debug, Clone)]
pub struct InstantAcmeClient {
    directory_url: String,
}

impl InstantAcmeClient {
    /// Create a client for an ACME directory URL
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
        }
    }

    /// The directory this client talks to
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// Register the account key and its contact through `builder`
    ///
    /// `newAccount` with an existing key returns that account, so this is
    /// safe to repeat. The contact is set with a separate account update
    /// because keyed registration always sends an empty contact list.
    async fn register_with(
        &self,
        builder: AccountBuilder,
        account: &Account<instant_acme::Account>,
    ) -> Result<instant_acme::Account> {
        let contact = format!("mailto:{}", account.email());
        let der = account.private_key().pkcs8_der().to_vec();

        let key = Key::from_pkcs8_der(PrivatePkcs8KeyDer::from(der.clone()))
            .map_err(|e| Error::registration(format!("Unusable account key: {}", e)))?;

        let (acme_account, _credentials) = builder
            .create_from_key(
                (key, PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))),
                self.directory_url.clone(),
            )
            .await
            .map_err(|e| Error::registration(e.to_string()))?;

        acme_account
            .update_contacts(&[contact.as_str()])
            .await
            .map_err(|e| Error::registration(format!("Failed to set contact {}: {}", contact, e)))?;

        info!(
            email = %account.email(),
            account_id = %acme_account.id(),
            directory = %self.directory_url,
            "ACME account ready"
        );

        Ok(acme_account)
    }
}

impl Default for InstantAcmeClient {
    fn default() -> Self {
        Self::new(LETSENCRYPT_PRODUCTION)
    }
}

#[async_trait]
impl AcmeClient for InstantAcmeClient {
    type Registration = instant_acme::Account;

    async fn register(
        &self,
        account: &Account<instant_acme::Account>,
    ) -> Result<instant_acme::Account> {
        let builder = instant_acme::Account::builder()
            .map_err(|e| Error::registration(format!("Failed to build HTTP client: {}", e)))?;

        self.register_with(builder, account).await
    }

    async fn obtain(
        &self,
        account: &Account<instant_acme::Account>,
        request: &ObtainRequest,
        provider: &dyn ChallengeProvider,
    ) -> Result<IssuedCertificate> {
        let acme_account = account
            .registration()
            .ok_or_else(|| Error::acme("Account is not registered"))?;

        let policy = provider.timeout().unwrap_or_default();

        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();

        info!(domains = ?request.domains, provider = provider.provider_name(), "Creating certificate order");

        let mut order = acme_account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| Error::acme(format!("Failed to create order: {}", e)))?;

        let challenges = collect_challenges(&mut order).await?;

        let mut steps = OrderSteps {
            order: &mut order,
            checker: PropagationChecker::from_system_conf(policy),
            policy,
        };
        solve_challenges(&mut steps, provider, &challenges).await?;

        let (chain, private_key) = finalize(&mut order, &request.domains).await?;
        let certificate = if request.bundle {
            chain
        } else {
            leaf_only(&chain).to_string()
        };

        Ok(IssuedCertificate {
            domain: request.domains.first().cloned().unwrap_or_default(),
            certificate,
            private_key,
        })
    }
}

/// Server-side steps of solving a challenge
#[async_trait]
trait ChallengeSteps: Send {
    /// Wait until the challenge record is visible in DNS
    async fn wait_visible(&mut self, challenge: &PendingChallenge) -> Result<()>;

    /// Ask the server to validate the challenge
    async fn set_ready(&mut self, challenge: &PendingChallenge) -> Result<()>;

    /// Wait until the server has validated this challenge
    async fn wait_validated(&mut self, challenge: &PendingChallenge) -> Result<()>;

    /// Wait until every authorization of the order is valid
    async fn wait_order_ready(&mut self) -> Result<()>;
}

struct OrderSteps<'a> {
    order: &'a mut Order,
    checker: PropagationChecker,
    policy: ChallengeTimeout,
}

#[async_trait]
impl<'a> ChallengeSteps for OrderSteps<'a> {
    async fn wait_visible(&mut self, challenge: &PendingChallenge) -> Result<()> {
        let record = dns01::challenge_info(&challenge.domain, &challenge.key_authorization);
        self.checker.wait_for(&record.fqdn, &record.value).await
    }

    async fn set_ready(&mut self, challenge: &PendingChallenge) -> Result<()> {
        set_challenge_ready(self.order, &challenge.url).await
    }

    async fn wait_validated(&mut self, challenge: &PendingChallenge) -> Result<()> {
        wait_for_authorization(self.order, &challenge.url, self.policy).await
    }

    async fn wait_order_ready(&mut self) -> Result<()> {
        wait_for_ready(self.order, self.policy).await
    }
}

/// Present, validate and clean up every challenge of an order
///
/// Returns once the order is ready for finalization. Every record that was
/// presented has been cleaned up when this returns, on success or failure.
async fn solve_challenges<S: ChallengeSteps>(
    steps: &mut S,
    provider: &dyn ChallengeProvider,
    challenges: &[PendingChallenge],
) -> Result<()> {
    if provider.sequential() {
        for challenge in challenges {
            present(provider, challenge).await?;

            let solved = async {
                steps.wait_visible(challenge).await?;
                steps.set_ready(challenge).await?;
                steps.wait_validated(challenge).await
            }
            .await;

            cleanup(provider, challenge).await;
            solved?;
        }

        return steps.wait_order_ready().await;
    }

    let mut presented = Vec::with_capacity(challenges.len());
    let mut outcome = Ok(());
    for challenge in challenges {
        match present(provider, challenge).await {
            Ok(()) => presented.push(challenge),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    if outcome.is_ok() {
        outcome = validate_all(steps, challenges).await;
    }

    for challenge in presented {
        cleanup(provider, challenge).await;
    }

    outcome
}

async fn validate_all<S: ChallengeSteps>(steps: &mut S, challenges: &[PendingChallenge]) -> Result<()> {
    for challenge in challenges {
        steps.wait_visible(challenge).await?;
    }

    for challenge in challenges {
        steps.set_ready(challenge).await?;
    }

    steps.wait_order_ready().await
}

async fn present(provider: &dyn ChallengeProvider, challenge: &PendingChallenge) -> Result<()> {
    provider
        .present(&challenge.domain, &challenge.token, &challenge.key_authorization)
        .await
}

async fn cleanup(provider: &dyn ChallengeProvider, challenge: &PendingChallenge) {
    if let Err(e) = provider
        .cleanup(&challenge.domain, &challenge.token, &challenge.key_authorization)
        .await
    {
        warn!(domain = %challenge.domain, "Failed to clean up challenge record: {}", e);
    }
}

/// Take the DNS-01 challenge of every authorization that is not yet valid
async fn collect_challenges(order: &mut Order) -> Result<Vec<PendingChallenge>> {
    let mut authorizations = order.authorizations();
    let mut challenges = Vec::new();

    while let Some(result) = authorizations.next().await {
        let mut authz =
            result.map_err(|e| Error::acme(format!("Failed to get authorization: {}", e)))?;

        let domain = match &authz.identifier().identifier {
            Identifier::Dns(domain) => domain.clone(),
            _ => continue,
        };

        if authz.status == AuthorizationStatus::Valid {
            debug!(domain = %domain, "Authorization already valid");
            continue;
        }

        let challenge = authz
            .challenge(ChallengeType::Dns01)
            .ok_or_else(|| Error::acme(format!("No DNS-01 challenge offered for {}", domain)))?;

        challenges.push(PendingChallenge {
            domain,
            token: challenge.token.clone(),
            key_authorization: challenge.key_authorization().as_str().to_string(),
            url: challenge.url.clone(),
        });
    }

    Ok(challenges)
}

/// Tell the server the challenge at `url` can be validated
async fn set_challenge_ready(order: &mut Order, url: &str) -> Result<()> {
    let mut authorizations = order.authorizations();

    while let Some(result) = authorizations.next().await {
        let mut authz =
            result.map_err(|e| Error::acme(format!("Failed to get authorization: {}", e)))?;

        let offers_url = authz
            .challenges
            .iter()
            .any(|c| c.url == url && c.r#type == ChallengeType::Dns01);

        if offers_url {
            if let Some(mut challenge) = authz.challenge(ChallengeType::Dns01) {
                challenge
                    .set_ready()
                    .await
                    .map_err(|e| Error::acme(format!("Failed to set challenge ready: {}", e)))?;
                return Ok(());
            }
        }
    }

    Err(Error::acme(format!("Challenge not found for URL: {}", url)))
}

/// Poll the authorization offering `url` until the server has validated it
async fn wait_for_authorization(order: &mut Order, url: &str, policy: ChallengeTimeout) -> Result<()> {
    let deadline = tokio::time::Instant::now() + policy.timeout;
    let mut authorizations = order.authorizations();

    while let Some(result) = authorizations.next().await {
        let mut authz =
            result.map_err(|e| Error::acme(format!("Failed to get authorization: {}", e)))?;

        if !authz.challenges.iter().any(|c| c.url == url) {
            continue;
        }

        loop {
            let status = authz
                .refresh()
                .await
                .map_err(|e| Error::acme(format!("Failed to refresh authorization: {}", e)))?
                .status;

            match status {
                AuthorizationStatus::Valid => return Ok(()),
                AuthorizationStatus::Pending => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(Error::acme(format!(
                            "Timed out after {}s waiting for challenge validation",
                            policy.timeout.as_secs()
                        )));
                    }
                    debug!(challenge = %url, "Authorization pending, waiting");
                    tokio::time::sleep(policy.interval).await;
                }
                other => {
                    return Err(Error::acme(format!(
                        "Authorization became {:?} during validation",
                        other
                    )));
                }
            }
        }
    }

    Err(Error::acme(format!("Challenge not found for URL: {}", url)))
}

/// Poll the order until the server has validated every challenge
async fn wait_for_ready(order: &mut Order, policy: ChallengeTimeout) -> Result<()> {
    let deadline = tokio::time::Instant::now() + policy.timeout;

    loop {
        let state = order
            .refresh()
            .await
            .map_err(|e| Error::acme(format!("Failed to refresh order: {}", e)))?;

        match state.status {
            OrderStatus::Ready => return Ok(()),
            OrderStatus::Invalid => {
                return Err(Error::acme("Order became invalid during validation"));
            }
            OrderStatus::Valid => {
                return Err(Error::acme("Order is already valid; nothing to finalize"));
            }
            _ => {
                if tokio::time::Instant::now() > deadline {
                    return Err(Error::acme(format!(
                        "Timed out after {}s waiting for challenge validation",
                        policy.timeout.as_secs()
                    )));
                }
                debug!(status = ?state.status, "Order not ready yet, waiting");
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

/// Submit a CSR for `domains` and download the issued chain
///
/// Returns the PEM chain and the PEM private key of the new certificate.
async fn finalize(order: &mut Order, domains: &[String]) -> Result<(String, String)> {
    let cert_key = rcgen::KeyPair::generate()
        .map_err(|e| Error::acme(format!("Failed to generate certificate key: {}", e)))?;

    let params = rcgen::CertificateParams::new(domains.to_vec())
        .map_err(|e| Error::acme(format!("Failed to create CSR params: {}", e)))?;

    let csr = params
        .serialize_request(&cert_key)
        .map_err(|e| Error::acme(format!("Failed to serialize CSR: {}", e)))?;

    order
        .finalize_csr(csr.der())
        .await
        .map_err(|e| Error::acme(format!("Failed to finalize order: {}", e)))?;

    let deadline = tokio::time::Instant::now() + ISSUANCE_TIMEOUT;
    let chain = loop {
        let state = order
            .refresh()
            .await
            .map_err(|e| Error::acme(format!("Failed to refresh order: {}", e)))?;

        match state.status {
            OrderStatus::Valid => {
                let chain = order
                    .certificate()
                    .await
                    .map_err(|e| Error::acme(format!("Failed to download certificate: {}", e)))?;
                break chain.ok_or_else(|| Error::acme("No certificate in response"))?;
            }
            OrderStatus::Invalid => {
                return Err(Error::acme("Order became invalid during finalization"));
            }
            _ => {
                if tokio::time::Instant::now() > deadline {
                    return Err(Error::acme("Timed out waiting for certificate"));
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    };

    Ok((chain, cert_key.serialize_pem()))
}

/// First certificate of a PEM chain
fn leaf_only(chain: &str) -> &str {
    const END: &str = "-----END CERTIFICATE-----";
    match chain.find(END) {
        Some(pos) => {
            let end = pos + END.len();
            let end = if chain[end..].starts_with('\n') { end + 1 } else { end };
            &chain[..end]
        }
        None => chain,
    }
}
