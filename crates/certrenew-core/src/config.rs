//! Configuration types for certrenew
//!
//! The configuration file is YAML:
//!
//! ```yaml
//! email: admin@example.com
//! cert_dir: /etc/certrenew/certs
//! account_dir: /etc/certrenew/accounts
//! renew_before: 30
//! post_renew_hooks:
//!   - systemctl reload nginx
//! domains:
//!   - names: [example.com, www.example.com]
//!     provider: cloudflare
//!     credentials:
//!       api_token: "..."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Threshold used when `renew_before` is absent or not positive
pub const DEFAULT_RENEW_BEFORE_DAYS: i64 = 30;

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Main certrenew configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewConfig {
    /// ACME account e-mail; also names the account key file
    pub email: String,

    /// Domain groups to keep certified
    pub domains: Vec<DomainConfig>,

    /// Directory holding `<name>.crt` / `<name>.key`
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    /// Directory holding `<email>.key`
    #[serde(default = "default_account_dir")]
    pub account_dir: PathBuf,

    /// Shell command lines run after each successful renewal
    #[serde(default)]
    pub post_renew_hooks: Vec<String>,

    /// Days before expiry at which renewal starts
    #[serde(default)]
    pub renew_before: i64,

    /// ACME directory URL
    #[serde(default = "default_acme_directory")]
    pub acme_directory: String,
}

impl RenewConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(Error::config("email cannot be empty"));
        }

        if self.domains.is_empty() {
            return Err(Error::config("No domains configured"));
        }

        for domain in &self.domains {
            domain.validate()?;
        }

        if self.acme_directory.trim().is_empty() {
            return Err(Error::config("acme_directory cannot be empty"));
        }

        Ok(())
    }

    /// Effective renewal threshold in days
    pub fn renew_before_days(&self) -> i64 {
        effective_renew_before(self.renew_before)
    }
}

/// Apply the default threshold to a configured value
pub fn effective_renew_before(days: i64) -> i64 {
    if days <= 0 {
        DEFAULT_RENEW_BEFORE_DAYS
    } else {
        days
    }
}

/// One renewal unit: a set of names sharing a certificate and a provider
#[derive(Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain names; the first one is canonical and names the files
    pub names: Vec<String>,

    /// Registered provider name (e.g. "cloudflare")
    pub provider: String,

    /// Provider-specific secrets
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl DomainConfig {
    /// Create a new domain configuration without credentials
    pub fn new(names: Vec<String>, provider: impl Into<String>) -> Self {
        Self {
            names,
            provider: provider.into(),
            credentials: HashMap::new(),
        }
    }

    /// Add a credential
    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// The canonical (first) name
    pub fn canonical_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    /// Look up a required credential
    ///
    /// Absent and empty values are both treated as missing.
    pub fn credential(&self, key: &str) -> Result<&str> {
        match self.credentials.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(Error::missing_credential(&self.provider, key)),
        }
    }

    /// Look up an optional credential
    pub fn optional_credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Validate the domain configuration
    pub fn validate(&self) -> Result<()> {
        if self.names.is_empty() {
            return Err(Error::config("Domain entry has no names"));
        }

        if let Some(blank) = self.names.iter().position(|n| n.trim().is_empty()) {
            return Err(Error::config(format!(
                "Domain entry {:?} has an empty name at position {}",
                self.names, blank
            )));
        }

        if self.provider.trim().is_empty() {
            return Err(Error::config(format!(
                "Domain entry {:?} has no provider",
                self.names
            )));
        }

        Ok(())
    }
}

// Credentials are secrets; keep their values out of logs.
impl std::fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.credentials.keys().collect();
        keys.sort();
        f.debug_struct("DomainConfig")
            .field("names", &self.names)
            .field("provider", &self.provider)
            .field("credentials", &keys)
            .finish()
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_account_dir() -> PathBuf {
    PathBuf::from("accounts")
}

fn default_acme_directory() -> String {
    LETSENCRYPT_PRODUCTION.to_string()
}
