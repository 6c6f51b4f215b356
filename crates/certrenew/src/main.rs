// # certrenew - batch ACME DNS-01 certificate renewal
//
// This binary is the composition root only:
// 1. Parse the command line and initialize logging
// 2. Build the provider registry from the enabled provider crates
// 3. Load and validate the configuration, load the ACME account
// 4. Run one renewal pass over every configured domain group
//
// All renewal logic lives in certrenew-core; the ACME protocol lives in
// certrenew-acme.
//
// ## Usage
//
// ```bash
// certrenew --config /etc/certrenew/config.yaml
// certrenew --ssl-domain example.com:443
// CERTRENEW_LOG_LEVEL=debug certrenew
// ```
//
// ## Configuration
//
// ```yaml
// email: admin@example.com
// renew_before: 30
// cert_dir: /etc/certrenew/certs
// account_dir: /etc/certrenew/accounts
// post_renew_hooks:
//   - systemctl reload nginx
// domains:
//   - names: [example.com, "*.example.com"]
//     provider: cloudflare
//     credentials:
//       api_token: "..."
// ```
//
// Run it from cron or a systemd timer; it exits after a single pass.

mod ssl_info;

use anyhow::{Context, Result};
use certrenew_acme::InstantAcmeClient;
use certrenew_core::{Account, ProviderRegistry, RenewConfig, Renewer, store};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Run completed (individual domain failures are only logged)
/// - 1: Configuration, account or startup error
/// - 2: Runtime error, or `--ssl-domain` inspection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertrenewExitCode {
    /// Run or inspection completed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CertrenewExitCode> for ExitCode {
    fn from(code: CertrenewExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Renew ACME certificates through DNS-01 challenges
#[derive(Debug, Parser)]
#[command(name = "certrenew", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, value_name = "PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Print the certificate served by HOST[:PORT] and exit
    #[arg(long, value_name = "HOST[:PORT]")]
    ssl_domain: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CERTRENEW_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match Level::from_str(&cli.log_level) {
        Ok(level) => level,
        Err(_) => {
            eprintln!(
                "Invalid log level '{}'. Valid levels: trace, debug, info, warn, error",
                cli.log_level
            );
            return CertrenewExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CertrenewExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CertrenewExitCode::ConfigError.into();
        }
    };

    let code = rt.block_on(async {
        match cli.ssl_domain {
            Some(ref target) => match ssl_info::run(target).await {
                Ok(()) => CertrenewExitCode::Success,
                Err(e) => {
                    error!("SSL inspection of {} failed: {:#}", target, e);
                    CertrenewExitCode::RuntimeError
                }
            },
            None => run_renewal(&cli.config).await,
        }
    });

    code.into()
}

/// Registry with every provider compiled into this binary
fn build_registry() -> ProviderRegistry {
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    certrenew_provider_cloudflare::register(&mut registry);

    #[cfg(feature = "porkbun")]
    certrenew_provider_porkbun::register(&mut registry);

    #[cfg(feature = "hurricane")]
    certrenew_provider_hurricane::register(&mut registry);

    #[cfg(feature = "tencentcloud")]
    certrenew_provider_tencentcloud::register(&mut registry);

    registry
}

/// Load and validate the configuration, then prepare its directories
async fn prepare(config_path: &Path) -> Result<RenewConfig> {
    let config = RenewConfig::load(config_path).await?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    store::ensure_dir(&config.account_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.account_dir.display()))?;
    store::ensure_dir(&config.cert_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.cert_dir.display()))?;

    Ok(config)
}

async fn run_renewal(config_path: &Path) -> CertrenewExitCode {
    let registry = build_registry();
    info!("Registered providers: {}", registry.list_providers().join(", "));

    let config = match prepare(config_path).await {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return CertrenewExitCode::ConfigError;
        }
    };

    for domain in &config.domains {
        if !registry.has_provider(&domain.provider) {
            warn!(
                "Domain {} uses provider '{}' which is not compiled in",
                domain.canonical_name(),
                domain.provider
            );
        }
    }

    let account = match Account::load_or_create(&config.email, &config.account_dir).await {
        Ok(account) => account,
        Err(e) => {
            error!("Failed to initialize ACME account for {}: {}", config.email, e);
            return CertrenewExitCode::ConfigError;
        }
    };

    let client = InstantAcmeClient::new(config.acme_directory.clone());
    let mut renewer = Renewer::new(&config, &registry, client, account);
    let report = renewer.run().await;

    if report.failed() > 0 {
        warn!(
            "{} of {} domain groups failed, they will be retried on the next run",
            report.failed(),
            report.domains.len()
        );
    }
    CertrenewExitCode::Success
}
