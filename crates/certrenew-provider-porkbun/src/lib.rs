// # Porkbun DNS-01 Provider
//
// Publishes ACME DNS-01 challenge records through the Porkbun JSON API v3.
//
// ## Credentials
//
// | key | required |
// |-----|----------|
// | `api_key` | yes |
// | `secret_api_key` | yes |
//
// Every API call is a POST carrying both keys in the JSON body. Neither key
// appears in logs or `Debug` output.
//
// ## API Reference
//
// - Retrieve records: POST `/dns/retrieve/:domain` (used to find the zone)
// - Create record: POST `/dns/create/:domain`
// - Delete record: POST `/dns/delete/:domain/:id`

use async_trait::async_trait;
use certrenew_core::dns01::{candidate_zones, challenge_info, relative_name};
use certrenew_core::traits::{ChallengeProvider, ChallengeProviderFactory, ChallengeTimeout};
use certrenew_core::{DomainConfig, Error, ProviderRegistry, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Provider name used in configuration
pub const PROVIDER_NAME: &str = "porkbun";

/// Porkbun API base URL
const PORKBUN_API_BASE: &str = "https://api.porkbun.com/api/json/v3";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Porkbun rejects TTLs below 600 seconds
const RECORD_TTL: &str = "600";

#[derive(Serialize)]
struct Auth<'a> {
    apikey: &'a str,
    secretapikey: &'a str,
}

#[derive(Serialize)]
struct CreateRecord<'a> {
    #[serde(flatten)]
    auth: Auth<'a>,
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    content: &'a str,
    ttl: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    /// Numeric or string depending on the endpoint
    #[serde(default)]
    id: Option<Value>,
}

/// Porkbun DNS-01 provider
pub struct PorkbunProvider {
    /// ⚠️ NEVER log this value
    api_key: String,
    /// ⚠️ NEVER log this value
    secret_api_key: String,
    base_url: String,
    client: reqwest::Client,
    /// (fqdn, value) → (zone, record id)
    records: Mutex<HashMap<(String, String), (String, String)>>,
}

impl std::fmt::Debug for PorkbunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PorkbunProvider")
            .field("api_key", &"<REDACTED>")
            .field("secret_api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PorkbunProvider {
    /// Create a new Porkbun provider
    pub fn new(api_key: impl Into<String>, secret_api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let secret_api_key = secret_api_key.into();

        if api_key.trim().is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "api_key"));
        }
        if secret_api_key.trim().is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "secret_api_key"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            secret_api_key,
            base_url: PORKBUN_API_BASE.to_string(),
            client,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth(&self) -> Auth<'_> {
        Auth {
            apikey: &self.api_key,
            secretapikey: &self.secret_api_key,
        }
    }

    async fn call(&self, endpoint: &str, body: &impl Serialize) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to read response: {}", e)))?;

        // Porkbun reports errors as {"status":"ERROR","message":...}, usually with HTTP 400
        let parsed: ApiResponse = serde_json::from_str(&text).map_err(|_| {
            Error::provider(
                PROVIDER_NAME,
                format!("Unexpected response ({}): {}", status, text.trim()),
            )
        })?;

        if parsed.status != "SUCCESS" {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!(
                    "{} failed ({}): {}",
                    endpoint,
                    status,
                    parsed.message.as_deref().unwrap_or("no message")
                ),
            ));
        }

        Ok(parsed)
    }

    /// Find the registered domain that contains `fqdn`
    async fn find_zone(&self, fqdn: &str) -> Result<String> {
        let mut last_error = None;

        for zone in candidate_zones(fqdn) {
            match self.call(&format!("/dns/retrieve/{}", zone), &self.auth()).await {
                Ok(_) => {
                    tracing::debug!("Porkbun zone for {} is {}", fqdn, zone);
                    return Ok(zone);
                }
                Err(e) => {
                    tracing::debug!("{} is not a Porkbun zone: {}", zone, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::provider(PROVIDER_NAME, format!("No Porkbun domain found for {}", fqdn))
        }))
    }
}

#[async_trait]
impl ChallengeProvider for PorkbunProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let zone = self.find_zone(&record.fqdn).await?;
        let name = relative_name(&record.fqdn, &zone);

        let body = CreateRecord {
            auth: self.auth(),
            name: &name,
            record_type: "TXT",
            content: &record.value,
            ttl: RECORD_TTL,
        };

        let response = self.call(&format!("/dns/create/{}", zone), &body).await?;
        let id = match response.id {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    "Invalid response format: missing record id",
                ));
            }
        };

        tracing::info!("Created Porkbun TXT record {} ({})", record.fqdn, id);
        self.records
            .lock()
            .insert((record.fqdn, record.value), (zone, id));
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let known = self
            .records
            .lock()
            .remove(&(record.fqdn.clone(), record.value.clone()));

        let Some((zone, id)) = known else {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Unknown TXT record for {}", record.fqdn),
            ));
        };

        self.call(&format!("/dns/delete/{}/{}", zone, id), &self.auth())
            .await?;
        tracing::info!("Deleted Porkbun TXT record {}", record.fqdn);
        Ok(())
    }

    fn timeout(&self) -> Option<ChallengeTimeout> {
        Some(ChallengeTimeout::new(
            Duration::from_secs(600),
            Duration::from_secs(10),
        ))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Porkbun providers
pub struct PorkbunFactory;

impl ChallengeProviderFactory for PorkbunFactory {
    fn create(&self, config: &DomainConfig) -> Result<Box<dyn ChallengeProvider>> {
        let api_key = config.credential("api_key")?;
        let secret_api_key = config.credential("secret_api_key")?;
        Ok(Box::new(PorkbunProvider::new(api_key, secret_api_key)?))
    }
}

/// Register the Porkbun provider with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, PorkbunFactory);
}

#[cfg(test)]
mod tests {
    use super::*;
    use certrenew_core::dns01::txt_value;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> PorkbunProvider {
        PorkbunProvider::new("pk1_key", "sk1_secret")
            .unwrap()
            .with_base_url(server.uri())
    }

    #[test]
    fn test_factory_requires_both_keys() {
        let config = DomainConfig::new(vec!["example.com".into()], PROVIDER_NAME)
            .with_credential("api_key", "pk");
        let err = PorkbunFactory.create(&config).err().expect("expected create to fail");
        assert!(matches!(err, Error::MissingCredential { ref key, .. } if key == "secret_api_key"));

        let config = config.with_credential("secret_api_key", "sk");
        assert!(PorkbunFactory.create(&config).is_ok());
    }

    #[test]
    fn test_timeout_and_debug() {
        let provider = PorkbunProvider::new("pk1_key", "sk1_secret").unwrap();
        assert_eq!(
            provider.timeout(),
            Some(ChallengeTimeout::new(Duration::from_secs(600), Duration::from_secs(10)))
        );
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("pk1_key"));
        assert!(!debug.contains("sk1_secret"));
    }

    #[tokio::test]
    async fn test_present_and_cleanup() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dns/retrieve/www.example.com"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": "ERROR", "message": "Invalid domain."
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/dns/retrieve/example.com"))
            .and(body_partial_json(serde_json::json!({
                "apikey": "pk1_key", "secretapikey": "sk1_secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "SUCCESS", "records": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/dns/create/example.com"))
            .and(body_partial_json(serde_json::json!({
                "name": "_acme-challenge.www",
                "type": "TXT",
                "content": txt_value("ka"),
                "ttl": "600"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "SUCCESS", "id": 106926659
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/dns/delete/example.com/106926659"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "SUCCESS"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.present("www.example.com", "tok", "ka").await.unwrap();
        provider.cleanup("www.example.com", "tok", "ka").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_domain_reports_api_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "status": "ERROR", "message": "Invalid domain."
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .present("example.com", "tok", "ka")
            .await
            .unwrap_err();
        match err {
            Error::Provider { provider, message } => {
                assert_eq!(provider, "porkbun");
                assert!(message.contains("Invalid domain."));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }
}
