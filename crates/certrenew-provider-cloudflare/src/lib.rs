// # Cloudflare DNS-01 Provider
//
// This crate publishes ACME DNS-01 challenge records through the
// Cloudflare API v4.
//
// ## Behaviour
//
// - ✅ Zone auto-discovery by walking the record's parent names, or an explicit `zone_id`
// - ✅ One TXT record per challenge (TTL 120), deleted again on cleanup
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401/403, 404, 429, 5xx)
// - ❌ NO retry logic (a failed run is retried by the next invocation)
//
// ## Credentials
//
// | key | required | meaning |
// |-----|----------|---------|
// | `api_token` | yes | API token with Zone:DNS:Edit permission |
// | `zone_id` | no | Skip zone discovery |
//
// The API token never appears in logs or `Debug` output.
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use certrenew_core::dns01::{candidate_zones, challenge_info};
use certrenew_core::traits::{ChallengeProvider, ChallengeTimeout};
use certrenew_core::{DomainConfig, Error, ProviderRegistry, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Provider name used in configuration
pub const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL of challenge records
const RECORD_TTL: u32 = 120;

/// Cloudflare DNS-01 provider
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone ID (optional, auto-detected from the record name otherwise)
    zone_id: Option<String>,

    /// API base URL
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// (fqdn, value) → (zone id, record id) of records created by `present`
    records: Mutex<HashMap<(String, String), (String, String)>>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Optional zone ID (auto-detected when absent)
    pub fn new(api_token: impl Into<String>, zone_id: Option<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "api_token"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Get the zone ID for a record
    ///
    /// If zone_id is set, returns it directly. Otherwise, queries the
    /// parent names of `fqdn` from most to least specific until Cloudflare
    /// knows one of them as a zone.
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn get_zone_id(&self, fqdn: &str) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        for zone_name in candidate_zones(fqdn) {
            tracing::debug!("Looking up zone ID for: {}", zone_name);

            let url = format!("{}/zones", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[("name", zone_name.as_str())])
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

            let json = read_json(response, "Zone lookup").await?;
            let zones = json["result"].as_array().ok_or_else(|| {
                Error::provider(PROVIDER_NAME, "Invalid response format: result is not an array")
            })?;

            if let Some(zone) = zones.first() {
                let zone_id = zone["id"].as_str().ok_or_else(|| {
                    Error::provider(PROVIDER_NAME, "Invalid response format: zone.id is not a string")
                })?;
                tracing::debug!("Found zone {} ({})", zone_name, zone_id);
                return Ok(zone_id.to_string());
            }
        }

        Err(Error::provider(
            PROVIDER_NAME,
            format!("No Cloudflare zone found for {}", fqdn),
        ))
    }

    /// Create a TXT record and return its ID
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "TXT", "name": "_acme-challenge.example.com", "content": "...", "ttl": 120}
    /// ```
    async fn create_txt_record(&self, zone_id: &str, fqdn: &str, value: &str) -> Result<String> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let payload = serde_json::json!({
            "type": "TXT",
            "name": fqdn,
            "content": value,
            "ttl": RECORD_TTL,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let json = read_json(response, "Record creation").await?;
        let record_id = json["result"]["id"].as_str().ok_or_else(|| {
            Error::provider(PROVIDER_NAME, "Invalid response format: result.id is not a string")
        })?;

        Ok(record_id.to_string())
    }

    /// Delete a record by ID
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        read_json(response, "Record deletion").await?;
        Ok(())
    }
}

/// Check the HTTP status and Cloudflare's `success` flag, returning the body
async fn read_json(response: reqwest::Response, action: &str) -> Result<Value> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        // Map HTTP status codes to specific errors
        let message = match status.as_u16() {
            401 | 403 => format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
            404 => format!("{} failed: not found. Status: {}", action, status),
            429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
            500..=599 => format!("Cloudflare server error (transient): {} - {}", status, error_text),
            _ => format!("{} failed: {} - {}", action, status, error_text),
        };
        return Err(Error::provider(PROVIDER_NAME, message));
    }

    let json: Value = response
        .json()
        .await
        .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e)))?;

    if json["success"].as_bool() == Some(false) {
        let errors = json["errors"]
            .as_array()
            .map(|errs| {
                errs.iter()
                    .filter_map(|e| e["message"].as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
        return Err(Error::provider(
            PROVIDER_NAME,
            format!("{} failed: {}", action, errors),
        ));
    }

    Ok(json)
}

#[async_trait]
impl ChallengeProvider for CloudflareProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let zone_id = self.get_zone_id(&record.fqdn).await?;
        let record_id = self
            .create_txt_record(&zone_id, &record.fqdn, &record.value)
            .await?;

        tracing::info!("Created Cloudflare TXT record {} ({})", record.fqdn, record_id);
        self.records
            .lock()
            .insert((record.fqdn, record.value), (zone_id, record_id));
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let known = self
            .records
            .lock()
            .remove(&(record.fqdn.clone(), record.value.clone()));

        let Some((zone_id, record_id)) = known else {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Unknown TXT record for {}", record.fqdn),
            ));
        };

        self.delete_record(&zone_id, &record_id).await?;
        tracing::info!("Deleted Cloudflare TXT record {}", record.fqdn);
        Ok(())
    }

    fn timeout(&self) -> Option<ChallengeTimeout> {
        Some(ChallengeTimeout::new(
            Duration::from_secs(120),
            Duration::from_secs(2),
        ))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl certrenew_core::ChallengeProviderFactory for CloudflareFactory {
    fn create(&self, config: &DomainConfig) -> Result<Box<dyn ChallengeProvider>> {
        let api_token = config.credential("api_token")?;
        let zone_id = config.optional_credential("zone_id").map(str::to_string);
        Ok(Box::new(CloudflareProvider::new(api_token, zone_id)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use certrenew_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// certrenew_provider_cloudflare::register(&mut registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, CloudflareFactory);
}

#[cfg(test)]
mod tests {
    use super::*;
    use certrenew_core::ChallengeProviderFactory;
    use certrenew_core::dns01::txt_value;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn domain_config() -> DomainConfig {
        DomainConfig::new(vec!["www.example.com".into()], PROVIDER_NAME)
    }

    #[test]
    fn test_factory_creation() {
        let config = domain_config()
            .with_credential("api_token", "test_token")
            .with_credential("zone_id", "test_zone");
        assert!(CloudflareFactory.create(&config).is_ok());
    }

    #[test]
    fn test_factory_missing_token() {
        let err = CloudflareFactory.create(&domain_config()).err().expect("expected create to fail");
        assert!(matches!(err, Error::MissingCredential { ref key, .. } if key == "api_token"));
    }

    #[test]
    fn test_provider_timeout() {
        let provider = CloudflareProvider::new("token", None).unwrap();
        let timeout = provider.timeout().unwrap();
        assert_eq!(timeout.timeout, Duration::from_secs(120));
        assert_eq!(timeout.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", None).unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[tokio::test]
    async fn test_present_and_cleanup_with_zone_discovery() {
        let server = MockServer::start().await;

        // www.example.com is not a zone, example.com is
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "www.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example.com"))
            .and(header("authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": [{"id": "zone123", "name": "example.com"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone123/dns_records"))
            .and(body_partial_json(serde_json::json!({
                "type": "TXT",
                "name": "_acme-challenge.www.example.com",
                "content": txt_value("key-auth"),
                "ttl": 120
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": {"id": "rec456"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/zones/zone123/dns_records/rec456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": {"id": "rec456"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("test_token", None)
            .unwrap()
            .with_base_url(server.uri());

        provider.present("www.example.com", "tok", "key-auth").await.unwrap();
        provider.cleanup("www.example.com", "tok", "key-auth").await.unwrap();
    }

    #[tokio::test]
    async fn test_preconfigured_zone_skips_lookup() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zones/fixed/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "result": {"id": "r1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("t", Some("fixed".into()))
            .unwrap()
            .with_base_url(server.uri());

        provider.present("example.com", "tok", "ka").await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zones/z/dns_records"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new("t", Some("z".into()))
            .unwrap()
            .with_base_url(server.uri());

        let err = provider.present("example.com", "tok", "ka").await.unwrap_err();
        match err {
            Error::Provider { provider, message } => {
                assert_eq!(provider, "cloudflare");
                assert!(message.contains("Authentication failed"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cleanup_of_unknown_record_fails() {
        let provider = CloudflareProvider::new("t", Some("z".into())).unwrap();
        assert!(provider.cleanup("example.com", "tok", "ka").await.is_err());
    }
}
