//! Core traits for certrenew
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ChallengeProvider`]: Publish and remove DNS-01 TXT records
//! - [`ChallengeProviderFactory`]: Build a provider from a domain's configuration
//! - [`AcmeClient`]: Register accounts and obtain certificates

pub mod acme_client;
pub mod challenge_provider;

pub use acme_client::{AcmeClient, IssuedCertificate, ObtainRequest};
pub use challenge_provider::{ChallengeProvider, ChallengeProviderFactory, ChallengeTimeout};
