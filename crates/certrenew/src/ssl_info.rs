//! `--ssl-domain`: print the certificate a TLS server presents
//!
//! The handshake accepts any certificate so that expired or self-signed
//! deployments can be inspected too.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::extensions::GeneralName;
use x509_parser::objects::{oid_registry, oid2sn};
use x509_parser::parse_x509_certificate;

const DEFAULT_PORT: u16 = 443;

/// Bound on TCP connect plus TLS handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts every server certificate
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Split `host[:port]`, accepting `[v6]:port` and bare IPv6 addresses
pub fn parse_target(target: &str) -> Result<(String, u16)> {
    let target = target.trim();
    if target.is_empty() {
        bail!("--ssl-domain needs a host name");
    }

    if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("Unterminated '[' in {}", target))?;
        let port = match after {
            "" => DEFAULT_PORT,
            _ => {
                let port = after
                    .strip_prefix(':')
                    .ok_or_else(|| anyhow!("Unexpected text after ']' in {}", target))?;
                port.parse()
                    .with_context(|| format!("Invalid port in {}", target))?
            }
        };
        return Ok((host.to_string(), port));
    }

    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            if host.is_empty() {
                bail!("--ssl-domain needs a host name");
            }
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in {}", target))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((target.to_string(), DEFAULT_PORT)),
    }
}

/// Leaf certificate details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub signature_algorithm: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub emails: Vec<String>,
    pub extended_key_usages: Vec<String>,
}

impl CertificateSummary {
    /// Decode a DER certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) =
            parse_x509_certificate(der).map_err(|e| anyhow!("Invalid certificate: {}", e))?;

        let oid = &cert.signature_algorithm.algorithm;
        let signature_algorithm = oid2sn(oid, oid_registry())
            .map(str::to_string)
            .unwrap_or_else(|_| oid.to_id_string());

        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp())?;
        let not_after = timestamp(validity.not_after.timestamp())?;

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let mut emails = Vec::new();
        if let Some(san) = cert
            .subject_alternative_name()
            .map_err(|e| anyhow!("Invalid subjectAltName: {}", e))?
        {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::RFC822Name(email) => emails.push(email.to_string()),
                    GeneralName::IPAddress(bytes) => ip_addresses.push(format_ip(bytes)),
                    _ => {}
                }
            }
        }

        let mut extended_key_usages = Vec::new();
        if let Some(eku) = cert
            .extended_key_usage()
            .map_err(|e| anyhow!("Invalid extendedKeyUsage: {}", e))?
        {
            let eku = eku.value;
            let known = [
                (eku.any, "Any"),
                (eku.server_auth, "ServerAuth"),
                (eku.client_auth, "ClientAuth"),
                (eku.code_signing, "CodeSigning"),
                (eku.email_protection, "EmailProtection"),
                (eku.time_stamping, "TimeStamping"),
                (eku.ocsp_signing, "OCSPSigning"),
            ];
            extended_key_usages.extend(
                known
                    .iter()
                    .filter(|(set, _)| *set)
                    .map(|(_, name)| name.to_string()),
            );
            extended_key_usages.extend(eku.other.iter().map(|oid| oid.to_id_string()));
        }

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            signature_algorithm,
            not_before,
            not_after,
            dns_names,
            ip_addresses,
            emails,
            extended_key_usages,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Timestamp out of range: {}", secs))
}

fn format_ip(bytes: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        IpAddr::V4(Ipv4Addr::from(octets)).to_string()
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        IpAddr::V6(Ipv6Addr::from(octets)).to_string()
    } else {
        format!("<{} bytes>", bytes.len())
    }
}

/// Human readable remaining validity
pub fn format_remaining(remaining: TimeDelta) -> String {
    let abs = remaining.abs();
    let days = abs.num_days();
    let hours = abs.num_hours() - days * 24;
    let span = format!("{} days {} hours", days, hours);

    if remaining < TimeDelta::zero() {
        format!("expired {} ago", span)
    } else {
        span
    }
}

fn print_list(label: &str, values: &[String]) {
    if values.is_empty() {
        println!("{:<20} -", label);
    } else {
        println!("{:<20} {}", label, values.join(", "));
    }
}

/// Print the report for a fetched chain
pub fn print_report(target: &str, chain_len: usize, leaf: &CertificateSummary, now: DateTime<Utc>) {
    println!("Certificate for {}", target);
    println!("{:<20} {}", "Chain length:", chain_len);
    println!("{:<20} {}", "Subject:", leaf.subject);
    println!("{:<20} {}", "Issuer:", leaf.issuer);
    println!("{:<20} {}", "Serial:", leaf.serial);
    println!("{:<20} {}", "Signature:", leaf.signature_algorithm);
    println!("{:<20} {}", "Not before:", leaf.not_before.to_rfc3339());
    println!("{:<20} {}", "Not after:", leaf.not_after.to_rfc3339());
    println!("{:<20} {}", "Remaining:", format_remaining(leaf.not_after - now));
    print_list("DNS names:", &leaf.dns_names);
    print_list("IP addresses:", &leaf.ip_addresses);
    print_list("E-mail addresses:", &leaf.emails);
    print_list("Extended key usage:", &leaf.extended_key_usages);
}

/// Fetch the chain presented by `host:port`
async fn fetch_chain(host: &str, port: u16) -> Result<Vec<CertificateDer<'static>>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .context("Failed to configure TLS")?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .with_context(|| format!("Invalid server name: {}", host))?;

    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    debug!("Connected to {}:{}", host, port);

    let tls = connector
        .connect(server_name, stream)
        .await
        .with_context(|| format!("TLS handshake with {}:{} failed", host, port))?;

    let chain = tls
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.to_vec())
        .unwrap_or_default();
    Ok(chain)
}

/// Inspect `target` and print its leaf certificate
pub async fn run(target: &str) -> Result<()> {
    let (host, port) = parse_target(target)?;

    let chain = tokio::time::timeout(CONNECT_TIMEOUT, fetch_chain(&host, port))
        .await
        .map_err(|_| anyhow!("Timed out after {:?} connecting to {}:{}", CONNECT_TIMEOUT, host, port))??;

    let leaf = chain
        .first()
        .ok_or_else(|| anyhow!("{}:{} presented no certificate", host, port))?;
    let summary = CertificateSummary::from_der(leaf)?;

    print_report(&format!("{}:{}", host, port), chain.len(), &summary, Utc::now());
    Ok(())
}
