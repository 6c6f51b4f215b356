//! DNS propagation checks for DNS-01 challenges
//!
//! Before the ACME server is told a challenge is ready, the TXT record must
//! be visible through the system resolver. Lookups are repeated every
//! `interval` until `timeout` is exhausted. The resolver keeps no cache,
//! so a negative answer from an early poll never hides a later record.

use std::net::SocketAddr;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use certrenew_core::ChallengeTimeout;
use certrenew_core::error::{Error, Result};

/// Polls the resolver until a TXT record carries the expected value
pub struct PropagationChecker {
    resolver: TokioAsyncResolver,
    policy: ChallengeTimeout,
}

impl PropagationChecker {
    /// Checker using the system resolver configuration
    ///
    /// Falls back to the library's default upstreams when the system
    /// configuration cannot be read.
    pub fn from_system_conf(policy: ChallengeTimeout) -> Self {
        let (config, opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("Failed to read system resolver configuration, using defaults: {}", e);
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };

        Self::with_config(config, opts, policy)
    }

    /// Checker querying a single nameserver over plain DNS
    pub fn with_nameserver(addr: SocketAddr, policy: ChallengeTimeout) -> Self {
        let servers = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], servers);
        Self::with_config(config, ResolverOpts::default(), policy)
    }

    fn with_config(config: ResolverConfig, mut opts: ResolverOpts, policy: ChallengeTimeout) -> Self {
        opts.cache_size = 0;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            policy,
        }
    }

    /// Wait until `fqdn` has a TXT record equal to `expected`
    pub async fn wait_for(&self, fqdn: &str, expected: &str) -> Result<()> {
        let start = Instant::now();
        let deadline = start + self.policy.timeout;

        debug!(
            record = %fqdn,
            timeout_secs = self.policy.timeout.as_secs(),
            "Waiting for DNS propagation"
        );

        loop {
            match self.has_value(fqdn, expected).await {
                Ok(true) => {
                    debug!(
                        record = %fqdn,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => trace!(record = %fqdn, "Record not yet propagated"),
                Err(e) => warn!(record = %fqdn, error = %e, "DNS lookup error"),
            }

            if Instant::now() + self.policy.interval > deadline {
                return Err(Error::acme(format!(
                    "TXT record {} not visible after {}s",
                    fqdn,
                    self.policy.timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }

    async fn has_value(
        &self,
        fqdn: &str,
        expected: &str,
    ) -> std::result::Result<bool, hickory_resolver::error::ResolveError> {
        // absolute name so the resolver does not apply search domains
        let name = format!("{}.", fqdn.trim_end_matches('.'));

        match self.resolver.txt_lookup(name).await {
            Ok(records) => Ok(records.iter().any(|txt| txt.to_string() == expected)),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(false),
                _ => Err(e),
            },
        }
    }
}
