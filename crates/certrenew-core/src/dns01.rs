//! DNS-01 record derivation
//!
//! The TXT record for a challenge lives at `_acme-challenge.<domain>` and
//! carries the base64url (unpadded) SHA-256 digest of the key authorization.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Label prepended to the validated domain
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

/// Where and what to publish for one challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInfo {
    /// Fully qualified record name, without trailing dot
    pub fqdn: String,
    /// TXT record value
    pub value: String,
}

/// Derive the record name and value for a challenge
pub fn challenge_info(domain: &str, key_auth: &str) -> ChallengeInfo {
    ChallengeInfo {
        fqdn: challenge_fqdn(domain),
        value: txt_value(key_auth),
    }
}

/// `_acme-challenge.<domain>`, with any wildcard prefix and trailing dot removed
pub fn challenge_fqdn(domain: &str) -> String {
    let base = domain.strip_prefix("*.").unwrap_or(domain);
    let base = base.trim_end_matches('.');
    format!("{}.{}", CHALLENGE_LABEL, base)
}

/// Base64url(SHA-256(key_auth)) without padding
pub fn txt_value(key_auth: &str) -> String {
    let digest = Sha256::digest(key_auth.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Candidate zone names for a record, most specific first
///
/// `_acme-challenge.a.b.example.com` yields `a.b.example.com`,
/// `b.example.com`, `example.com`. Single-label names are never returned.
pub fn candidate_zones(fqdn: &str) -> Vec<String> {
    let name = fqdn.trim_end_matches('.');
    let name = name
        .strip_prefix(CHALLENGE_LABEL)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name);

    let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
    (0..labels.len().saturating_sub(1))
        .map(|i| labels[i..].join("."))
        .collect()
}

/// Record name relative to its zone (`_acme-challenge.www` in `example.com`)
///
/// Returns an empty string when the record sits at the zone apex.
pub fn relative_name(fqdn: &str, zone: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.');
    let zone = zone.trim_end_matches('.');
    if fqdn == zone {
        return String::new();
    }
    fqdn.strip_suffix(zone)
        .and_then(|head| head.strip_suffix('.'))
        .unwrap_or(fqdn)
        .to_string()
}
