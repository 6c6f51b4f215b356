//! Renewal orchestrator
//!
//! The [`Renewer`] walks the configured domain groups one after another and
//! drives each through the same sequence:
//!
//! ```text
//! ResolveProvider ─► EnsureRegistration ─► InspectCertificate
//!                                                │
//!                                     ┌──────────┴──────────┐
//!                                     ▼                     ▼
//!                                   Skip                  Obtain
//!                                                           │
//!                                                           ▼
//!                                                  Persist ─► RunHooks
//! ```
//!
//! ## Error isolation
//!
//! Every failure inside a domain group (unknown provider, missing
//! credential, registration, ACME order, writing files) ends that group's
//! work for this run. The next group is processed normally. Hook failures
//! are only logged.
//!
//! ## Registration
//!
//! The ACME registration handle is the only state carried from one domain
//! group to the next. It is requested the first time a group needs it and
//! cached in the [`Account`] afterwards, so a run registers at most once.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::config::{DomainConfig, RenewConfig};
use crate::error::{Error, Result};
use crate::hooks;
use crate::inspector::{self, CertificateState, RenewalDecision};
use crate::registry::ProviderRegistry;
use crate::store;
use crate::traits::{AcmeClient, ObtainRequest};

/// Result of processing one domain group
#[derive(Debug)]
pub enum DomainOutcome {
    /// A new certificate was obtained and written
    Renewed {
        /// Expiry of the new certificate, if it could be read back
        not_after: Option<DateTime<Utc>>,
    },

    /// The current certificate is still valid long enough
    Skipped {
        /// Time left before expiry
        remaining: TimeDelta,
        /// Expiry of the current certificate
        not_after: Option<DateTime<Utc>>,
    },

    /// Processing stopped with an error
    Failed(Error),
}

impl DomainOutcome {
    /// True for [`DomainOutcome::Failed`]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome for a named domain group
#[derive(Debug)]
pub struct DomainReport {
    /// Canonical name of the group
    pub domain: String,
    /// What happened
    pub outcome: DomainOutcome,
}

/// Summary of one run
#[derive(Debug)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Per-domain results, in configuration order
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    /// Number of renewed groups
    pub fn renewed(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Renewed { .. }))
    }

    /// Number of skipped groups
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Skipped { .. }))
    }

    /// Number of failed groups
    pub fn failed(&self) -> usize {
        self.count(DomainOutcome::is_failed)
    }

    /// Outcome for a canonical domain name
    pub fn outcome(&self, domain: &str) -> Option<&DomainOutcome> {
        self.domains
            .iter()
            .find(|r| r.domain == domain)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&DomainOutcome) -> bool) -> usize {
        self.domains.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Renewal orchestrator
///
/// ## Lifecycle
///
/// 1. Build a [`ProviderRegistry`] and an [`Account`]
/// 2. Create with [`Renewer::new()`]
/// 3. Call [`Renewer::run()`] once per invocation
pub struct Renewer<'r, C: AcmeClient> {
    /// ACME protocol client
    client: C,

    /// Provider lookup table, filled by the caller
    registry: &'r ProviderRegistry,

    /// Account identity with its cached registration
    account: Account<C::Registration>,

    /// Domain groups to process, in order
    domains: Vec<DomainConfig>,

    /// Where certificates are written
    cert_dir: PathBuf,

    /// Commands run after each successful renewal
    post_renew_hooks: Vec<String>,

    /// Renewal threshold in days
    renew_before_days: i64,
}

impl<'r, C: AcmeClient> Renewer<'r, C> {
    /// Create a new renewer
    ///
    /// # Parameters
    ///
    /// - `config`: Validated configuration
    /// - `registry`: Registry with every provider the configuration may name
    /// - `client`: ACME client implementation
    /// - `account`: Account loaded from the account directory
    pub fn new(
        config: &RenewConfig,
        registry: &'r ProviderRegistry,
        client: C,
        account: Account<C::Registration>,
    ) -> Self {
        Self {
            client,
            registry,
            account,
            domains: config.domains.clone(),
            cert_dir: config.cert_dir.clone(),
            post_renew_hooks: config.post_renew_hooks.clone(),
            renew_before_days: config.renew_before_days(),
        }
    }

    /// The account, including any registration cached during a run
    pub fn account(&self) -> &Account<C::Registration> {
        &self.account
    }

    /// The ACME client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Process every configured domain group once
    pub async fn run(&mut self) -> RunReport {
        let started_at = Utc::now();
        info!(
            "Renewal run started at {} ({} domain groups, renew before {} days)",
            started_at.to_rfc3339(),
            self.domains.len(),
            self.renew_before_days
        );

        let domains = self.domains.clone();
        let mut reports = Vec::with_capacity(domains.len());

        for domain in &domains {
            let name = domain.canonical_name().to_string();
            let outcome = match self.process_domain(domain).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(domain = %name, provider = %domain.provider, "Renewal failed: {}", e);
                    DomainOutcome::Failed(e)
                }
            };
            reports.push(DomainReport {
                domain: name,
                outcome,
            });
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            domains: reports,
        };

        info!(
            renewed = report.renewed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Renewal run finished at {} (took {}s)",
            report.finished_at.to_rfc3339(),
            (report.finished_at - report.started_at).num_seconds()
        );

        report
    }

    /// Process a single domain group
    async fn process_domain(&mut self, domain: &DomainConfig) -> Result<DomainOutcome> {
        let name = domain.canonical_name();
        debug!(domain = %name, names = ?domain.names, provider = %domain.provider, "Processing domain group");

        let provider = self.registry.resolve(domain)?;

        self.ensure_registration().await?;

        let paths = store::cert_paths(&self.cert_dir, &domain.names);
        let state = match inspector::inspect(&paths.certificate).await {
            Ok(state) => state,
            Err(e) => {
                warn!(domain = %name, "Existing certificate unusable, renewing: {}", e);
                CertificateState::absent()
            }
        };

        if RenewalDecision::evaluate(&state, self.renew_before_days) == RenewalDecision::Skip {
            info!(
                domain = %name,
                "Certificate still valid for {} days (expires {}), skipping",
                state.remaining.num_days(),
                state
                    .not_after
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            );
            return Ok(DomainOutcome::Skipped {
                remaining: state.remaining,
                not_after: state.not_after,
            });
        }

        if state.is_absent() {
            info!(domain = %name, "No certificate found, requesting a new one");
        } else {
            info!(
                domain = %name,
                "Certificate expires in {} days, renewing",
                state.remaining.num_days()
            );
        }

        let request = ObtainRequest::new(domain.names.clone());
        let issued = self
            .client
            .obtain(&self.account, &request, provider.as_ref())
            .await?;

        store::ensure_dir(&self.cert_dir).await?;
        store::save_certificate(&paths, &issued).await?;

        let not_after = match inspector::not_after_from_pem(issued.certificate.as_bytes()) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(domain = %name, "Could not read expiry of new certificate: {}", e);
                None
            }
        };

        info!(
            domain = %name,
            certificate = %paths.certificate.display(),
            "Certificate written{}",
            not_after
                .map(|t| format!(", valid until {}", t.to_rfc3339()))
                .unwrap_or_default()
        );

        hooks::run_hooks(name, &self.post_renew_hooks).await;

        Ok(DomainOutcome::Renewed { not_after })
    }

    /// Register the account unless a handle is already cached
    async fn ensure_registration(&mut self) -> Result<()> {
        if self.account.is_registered() {
            return Ok(());
        }

        let registration = self.client.register(&self.account).await?;
        self.account.set_registration(registration);
        info!(email = %self.account.email(), "ACME account registered");
        Ok(())
    }
}
