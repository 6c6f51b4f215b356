// # certrenew-core
//
// Core library for ACME DNS-01 certificate renewal.
//
// ## Architecture Overview
//
// - **ChallengeProvider**: Trait for publishing DNS-01 TXT records via provider APIs
// - **ProviderRegistry**: Plugin-based registry mapping provider names to factories
// - **LoggingProvider**: Wrapper announcing each record for manual intervention
// - **Inspector**: Reads an existing certificate and decides whether to renew
// - **AcmeClient**: Trait for the ACME protocol implementation
// - **Renewer**: Orchestrates registration, issuance, persistence and hooks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider and ACME implementations
// 2. **Plugin-Based**: Providers are registered explicitly by the binary, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Isolation**: One domain group failing never stops the others

pub mod account;
pub mod config;
pub mod dns01;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod inspector;
pub mod logging_provider;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use account::{Account, AccountKey};
pub use config::{DomainConfig, RenewConfig};
pub use engine::{DomainOutcome, DomainReport, Renewer, RunReport};
pub use error::{Error, Result};
pub use inspector::{CertificateState, RenewalDecision};
pub use logging_provider::LoggingProvider;
pub use registry::ProviderRegistry;
pub use traits::{
    AcmeClient, ChallengeProvider, ChallengeProviderFactory, ChallengeTimeout, IssuedCertificate,
    ObtainRequest,
};
