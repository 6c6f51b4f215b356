// # Hurricane Electric DNS-01 Provider
//
// Updates dynamic TXT records hosted on dns.he.net. HE cannot create
// records through an API: the `_acme-challenge` TXT record must already
// exist with "Enable entry for dynamic dns" ticked, and its DDNS key is the
// credential used here.
//
// ## Credentials
//
// | key | format |
// |-----|--------|
// | `api_key` | `token`, or `example.com:token1,example.org:token2` |
//
// A bare token is used for every domain. The mapped form picks the token of
// the most specific listed domain containing the challenge name.
//
// ## API Reference
//
// - Update: POST `https://dyn.dns.he.net/nic/update`
//   form fields `hostname`, `password`, `txt`
// - Success bodies start with `good` or `nochg`
//
// Cleanup overwrites the value with `.` since records cannot be deleted.
//
// A dynamic record holds one value, so challenges sharing a record name
// (`example.com` and `*.example.com`) are solved one after another.

use async_trait::async_trait;
use certrenew_core::dns01::{candidate_zones, challenge_fqdn, challenge_info};
use certrenew_core::traits::{ChallengeProvider, ChallengeProviderFactory, ChallengeTimeout};
use certrenew_core::{DomainConfig, Error, ProviderRegistry, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Provider name used in configuration
pub const PROVIDER_NAME: &str = "hurricane";

/// Hurricane Electric dynamic DNS endpoint
const HE_UPDATE_URL: &str = "https://dyn.dns.he.net/nic/update";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholder written on cleanup
const CLEARED_VALUE: &str = ".";

/// DDNS keys for dynamic TXT records
#[derive(Clone, PartialEq, Eq)]
pub enum Tokens {
    /// One key for every domain
    Single(String),
    /// Keys per domain
    PerDomain(HashMap<String, String>),
}

impl std::fmt::Debug for Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tokens::Single(_) => f.write_str("Single(<REDACTED>)"),
            Tokens::PerDomain(map) => {
                let mut domains: Vec<_> = map.keys().collect();
                domains.sort();
                f.debug_tuple("PerDomain").field(&domains).finish()
            }
        }
    }
}

impl Tokens {
    /// Parse the `api_key` credential
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "api_key"));
        }

        if !raw.contains(':') {
            return Ok(Tokens::Single(raw.to_string()));
        }

        let mut map = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((domain, token)) = entry.split_once(':') else {
                return Err(Error::config(
                    "hurricane: malformed api_key entry, expected domain:token",
                ));
            };
            let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
            let token = token.trim();
            if domain.is_empty() || token.is_empty() {
                return Err(Error::config(
                    "hurricane: api_key entries need both a domain and a token",
                ));
            }
            map.insert(domain, token.to_string());
        }

        if map.is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "api_key"));
        }
        Ok(Tokens::PerDomain(map))
    }

    /// Token for `domain`, trying the name itself and then its parents
    pub fn token_for(&self, domain: &str) -> Option<&str> {
        match self {
            Tokens::Single(token) => Some(token),
            Tokens::PerDomain(map) => {
                let name = domain
                    .trim_start_matches("*.")
                    .trim_end_matches('.')
                    .to_ascii_lowercase();
                candidate_zones(&name)
                    .into_iter()
                    .find_map(|candidate| map.get(&candidate).map(String::as_str))
            }
        }
    }
}

/// Hurricane Electric DNS-01 provider
pub struct HurricaneProvider {
    /// ⚠️ NEVER log these values
    tokens: Tokens,
    update_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HurricaneProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HurricaneProvider")
            .field("tokens", &self.tokens)
            .field("update_url", &self.update_url)
            .finish()
    }
}

impl HurricaneProvider {
    /// Create a new Hurricane Electric provider from the raw `api_key` value
    pub fn new(api_key: &str) -> Result<Self> {
        let tokens = Tokens::parse(api_key)?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            tokens,
            update_url: HE_UPDATE_URL.to_string(),
            client,
        })
    }

    /// Point the provider at a different update endpoint
    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = url.into();
        self
    }

    async fn update(&self, domain: &str, txt: &str) -> Result<()> {
        let hostname = challenge_fqdn(domain);
        let token = self.tokens.token_for(domain).ok_or_else(|| {
            Error::provider(PROVIDER_NAME, format!("No DDNS key configured for {}", domain))
        })?;

        let response = self
            .client
            .post(&self.update_url)
            .form(&[("hostname", hostname.as_str()), ("password", token), ("txt", txt)])
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to read response: {}", e)))?;
        let body = body.trim();

        if !status.is_success() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Update of {} failed with status {}: {}", hostname, status, body),
            ));
        }

        // badauth, nohost, abuse, ... arrive with HTTP 200
        if body.starts_with("good") || body.starts_with("nochg") {
            tracing::debug!("Hurricane update for {}: {}", hostname, body);
            Ok(())
        } else {
            Err(Error::provider(
                PROVIDER_NAME,
                format!("Update of {} rejected: {}", hostname, body),
            ))
        }
    }
}

#[async_trait]
impl ChallengeProvider for HurricaneProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        self.update(domain, &record.value).await?;
        tracing::info!("Updated Hurricane Electric TXT record {}", record.fqdn);
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, _key_auth: &str) -> Result<()> {
        self.update(domain, CLEARED_VALUE).await
    }

    fn timeout(&self) -> Option<ChallengeTimeout> {
        Some(ChallengeTimeout::new(
            Duration::from_secs(300),
            Duration::from_secs(10),
        ))
    }

    fn sequential(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Hurricane Electric providers
pub struct HurricaneFactory;

impl ChallengeProviderFactory for HurricaneFactory {
    fn create(&self, config: &DomainConfig) -> Result<Box<dyn ChallengeProvider>> {
        let api_key = config.credential("api_key")?;
        Ok(Box::new(HurricaneProvider::new(api_key)?))
    }
}

/// Register the Hurricane Electric provider with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, HurricaneFactory);
}
