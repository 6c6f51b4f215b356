//! Certificate state inspector and renewal decision

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use x509_parser::pem::parse_x509_pem;

use crate::error::{Error, Result};

/// What the inspector learned about a certificate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateState {
    /// Time left until expiry; zero when unknown, negative when expired
    pub remaining: TimeDelta,
    /// Expiry instant, `None` when no certificate exists
    pub not_after: Option<DateTime<Utc>>,
}

impl CertificateState {
    /// State of a certificate that does not exist
    pub fn absent() -> Self {
        Self {
            remaining: TimeDelta::zero(),
            not_after: None,
        }
    }

    /// True when no certificate file was found
    pub fn is_absent(&self) -> bool {
        self.not_after.is_none()
    }
}

/// Inspect the certificate at `path` relative to the current time
pub async fn inspect(path: &Path) -> Result<CertificateState> {
    inspect_at(path, Utc::now()).await
}

/// Inspect the certificate at `path` relative to `now`
///
/// A missing file is not an error and yields [`CertificateState::absent`].
/// Only the first PEM block is examined.
pub async fn inspect_at(path: &Path, now: DateTime<Utc>) -> Result<CertificateState> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CertificateState::absent());
        }
        Err(e) => {
            return Err(Error::certificate_parse(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    let not_after = not_after_from_pem(&data)
        .map_err(|e| Error::certificate_parse(format!("{}: {}", path.display(), e)))?;

    Ok(CertificateState {
        remaining: not_after - now,
        not_after: Some(not_after),
    })
}

/// Extract NotAfter from the first PEM certificate in `data`
pub fn not_after_from_pem(data: &[u8]) -> std::result::Result<DateTime<Utc>, String> {
    let (_, pem) = parse_x509_pem(data).map_err(|e| format!("no PEM block: {}", e))?;

    let cert = pem
        .parse_x509()
        .map_err(|e| format!("not an X.509 certificate: {}", e))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| format!("NotAfter out of range: {}", timestamp))
}

/// Outcome of comparing a certificate's lifetime with the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// Obtain a new certificate
    Renew,
    /// Keep the current certificate
    Skip,
}

impl RenewalDecision {
    /// Decide for a state and a threshold in days
    ///
    /// Renews when nothing is known (`remaining == 0`) or less than
    /// `threshold_days` remain, including already expired certificates.
    pub fn evaluate(state: &CertificateState, threshold_days: i64) -> Self {
        let threshold = TimeDelta::days(threshold_days);
        if state.remaining.is_zero() || state.remaining < threshold {
            Self::Renew
        } else {
            Self::Skip
        }
    }
}
