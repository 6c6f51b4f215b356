//! Error types for certrenew
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for certrenew operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for certrenew
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing file, malformed YAML, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No factory registered for the configured provider name
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A provider adapter could not find a required credential
    #[error("Missing credential '{key}' for provider '{provider}'")]
    MissingCredential {
        /// Provider name
        provider: String,
        /// Credential key that was absent or empty
        key: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Account key loading or generation failed
    #[error("Account error: {0}")]
    Account(String),

    /// ACME account registration failed
    #[error("Registration failed: {0}")]
    Registration(String),

    /// ACME order, challenge or finalization failed
    #[error("ACME error: {0}")]
    Acme(String),

    /// Certificate file exists but could not be parsed
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML decoding errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing credential error
    pub fn missing_credential(provider: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingCredential {
            provider: provider.into(),
            key: key.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an account error
    pub fn account(msg: impl Into<String>) -> Self {
        Self::Account(msg.into())
    }

    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Create an ACME error
    pub fn acme(msg: impl Into<String>) -> Self {
        Self::Acme(msg.into())
    }

    /// Create a certificate parse error
    pub fn certificate_parse(msg: impl Into<String>) -> Self {
        Self::CertificateParse(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_names_provider_and_key() {
        let err = Error::missing_credential("porkbun", "secret_api_key");
        let msg = err.to_string();
        assert!(msg.contains("porkbun"));
        assert!(msg.contains("secret_api_key"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert!(matches!(err, Error::Other(ref m) if m == "boom"));
    }
}
