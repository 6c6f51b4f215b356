// # Tencent Cloud DNSPod DNS-01 Provider
//
// Publishes ACME DNS-01 challenge records through the DNSPod API
// (version 2021-03-23), signed with TC3-HMAC-SHA256.
//
// ## Credentials
//
// | key | required |
// |-----|----------|
// | `secret_id` | yes |
// | `secret_key` | yes |
// | `region` | no |
//
// ## API Reference
//
// - DescribeDomainList: find the zone (longest matching suffix)
// - CreateRecord: TXT record on the default line, TTL 600
// - DeleteRecord: by the id returned from CreateRecord
//
// Every action is a POST to `/` with the action name in `X-TC-Action`.
// Failures come back as HTTP 200 with `Response.Error`.

pub mod signer;

use async_trait::async_trait;
use certrenew_core::dns01::{challenge_info, relative_name};
use certrenew_core::traits::{ChallengeProvider, ChallengeProviderFactory};
use certrenew_core::{DomainConfig, Error, ProviderRegistry, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

use crate::signer::{CONTENT_TYPE, SigningRequest};

/// Provider name used in configuration
pub const PROVIDER_NAME: &str = "tencentcloud";

/// DNSPod API endpoint
const DNSPOD_ENDPOINT: &str = "https://dnspod.tencentcloudapi.com";

/// Product name used in the signing scope
const SERVICE: &str = "dnspod";

/// API version sent as `X-TC-Version`
const API_VERSION: &str = "2021-03-23";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL of challenge records
const RECORD_TTL: u32 = 600;

/// DNSPod's default resolution line
const DEFAULT_LINE: &str = "默认";

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Value,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct DomainList {
    #[serde(rename = "DomainList", default)]
    domain_list: Vec<DomainItem>,
}

#[derive(Deserialize)]
struct DomainItem {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
struct CreatedRecord {
    #[serde(rename = "RecordId")]
    record_id: u64,
}

/// Tencent Cloud DNSPod DNS-01 provider
pub struct TencentCloudProvider {
    secret_id: String,
    /// ⚠️ NEVER log this value
    secret_key: String,
    region: Option<String>,
    endpoint: String,
    client: reqwest::Client,
    /// (fqdn, value) → (zone, record id)
    records: Mutex<HashMap<(String, String), (String, u64)>>,
}

impl std::fmt::Debug for TencentCloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TencentCloudProvider")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<REDACTED>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl TencentCloudProvider {
    /// Create a new Tencent Cloud provider
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        region: Option<String>,
    ) -> Result<Self> {
        let secret_id = secret_id.into();
        let secret_key = secret_key.into();

        if secret_id.trim().is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "secret_id"));
        }
        if secret_key.trim().is_empty() {
            return Err(Error::missing_credential(PROVIDER_NAME, "secret_key"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            secret_id,
            secret_key,
            region: region.filter(|r| !r.trim().is_empty()),
            endpoint: DNSPOD_ENDPOINT.to_string(),
            client,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Host header value for the configured endpoint
    fn host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Invalid endpoint {}: {}", self.endpoint, e))
        })?;
        let host = url.host_str().ok_or_else(|| {
            Error::provider(PROVIDER_NAME, format!("Endpoint {} has no host", self.endpoint))
        })?;

        Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Invoke one API action and decode its `Response` object
    async fn call<T: DeserializeOwned>(&self, action: &str, body: Value) -> Result<T> {
        let payload = body.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let host = self.host()?;

        let authorization = signer::authorization(
            &self.secret_id,
            &self.secret_key,
            &SigningRequest {
                host: &host,
                service: SERVICE,
                timestamp,
                payload: &payload,
            },
        )?;

        let mut request = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &host)
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Version", API_VERSION);
        if let Some(ref region) = self.region {
            request = request.header("X-TC-Region", region);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("{} failed with status {}: {}", action, status, body.trim()),
            ));
        }

        let envelope: Envelope = response.json().await.map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse {} response: {}", action, e))
        })?;

        if let Some(error) = envelope.response.get("Error") {
            let error: ApiError = serde_json::from_value(error.clone())?;
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("{} failed: {} ({})", action, error.message, error.code),
            ));
        }

        serde_json::from_value(envelope.response).map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Unexpected {} response: {}", action, e))
        })
    }

    /// Find the DNSPod domain with the longest suffix match for `fqdn`
    async fn find_zone(&self, fqdn: &str) -> Result<String> {
        let list: DomainList = self
            .call("DescribeDomainList", json!({ "Limit": 3000 }))
            .await?;

        list.domain_list
            .into_iter()
            .map(|d| d.name.trim_end_matches('.').to_ascii_lowercase())
            .filter(|zone| fqdn == zone.as_str() || fqdn.ends_with(&format!(".{}", zone)))
            .max_by_key(|zone| zone.len())
            .ok_or_else(|| {
                Error::provider(PROVIDER_NAME, format!("No DNSPod domain found for {}", fqdn))
            })
    }
}

#[async_trait]
impl ChallengeProvider for TencentCloudProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let zone = self.find_zone(&record.fqdn).await?;

        let mut sub_domain = relative_name(&record.fqdn, &zone);
        if sub_domain.is_empty() {
            sub_domain = "@".to_string();
        }

        let created: CreatedRecord = self
            .call(
                "CreateRecord",
                json!({
                    "Domain": zone,
                    "SubDomain": sub_domain,
                    "RecordType": "TXT",
                    "RecordLine": DEFAULT_LINE,
                    "Value": record.value,
                    "TTL": RECORD_TTL,
                }),
            )
            .await?;

        tracing::info!(
            "Created DNSPod TXT record {} ({})",
            record.fqdn,
            created.record_id
        );
        self.records
            .lock()
            .insert((record.fqdn, record.value), (zone, created.record_id));
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_auth: &str) -> Result<()> {
        let record = challenge_info(domain, key_auth);
        let known = self
            .records
            .lock()
            .remove(&(record.fqdn.clone(), record.value.clone()));

        let Some((zone, record_id)) = known else {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Unknown TXT record for {}", record.fqdn),
            ));
        };

        let _: Value = self
            .call(
                "DeleteRecord",
                json!({ "Domain": zone, "RecordId": record_id }),
            )
            .await?;
        tracing::info!("Deleted DNSPod TXT record {}", record.fqdn);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Tencent Cloud providers
pub struct TencentCloudFactory;

impl ChallengeProviderFactory for TencentCloudFactory {
    fn create(&self, config: &DomainConfig) -> Result<Box<dyn ChallengeProvider>> {
        let secret_id = config.credential("secret_id")?;
        let secret_key = config.credential("secret_key")?;
        let region = config.optional_credential("region").map(str::to_string);
        Ok(Box::new(TencentCloudProvider::new(
            secret_id, secret_key, region,
        )?))
    }
}

/// Register the Tencent Cloud provider with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, TencentCloudFactory);
}
