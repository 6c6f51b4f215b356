//! TC3-HMAC-SHA256 request signing
//!
//! Tencent Cloud API 3.0 signs the canonical request with a key derived
//! from the secret key, the UTC date and the service name. Only POST with
//! a JSON body is needed here, so the signed headers are fixed to
//! `content-type;host`.

use certrenew_core::{Error, Result};
use chrono::DateTime;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "TC3-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host";

/// Content type sent with every request (part of the signature)
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Inputs of one signed request
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// Value of the Host header
    pub host: &'a str,
    /// Product name, `dnspod`
    pub service: &'a str,
    /// Unix timestamp also sent as `X-TC-Timestamp`
    pub timestamp: i64,
    /// JSON request body
    pub payload: &'a str,
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::provider(crate::PROVIDER_NAME, format!("HMAC error: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Build the `Authorization` header value
pub fn authorization(secret_id: &str, secret_key: &str, req: &SigningRequest<'_>) -> Result<String> {
    let date = DateTime::from_timestamp(req.timestamp, 0)
        .ok_or_else(|| Error::provider(crate::PROVIDER_NAME, format!("Invalid timestamp: {}", req.timestamp)))?
        .format("%Y-%m-%d")
        .to_string();

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        req.host,
        SIGNED_HEADERS,
        sha256_hex(req.payload)
    );

    let scope = format!("{}/{}/tc3_request", date, req.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        req.timestamp,
        scope,
        sha256_hex(&canonical_request)
    );

    let k_date = hmac(format!("TC3{}", secret_key).as_bytes(), &date)?;
    let k_service = hmac(&k_date, req.service)?;
    let k_signing = hmac(&k_service, "tc3_request")?;
    let signature = hex::encode(hmac(&k_signing, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, secret_id, scope, SIGNED_HEADERS, signature
    ))
}
