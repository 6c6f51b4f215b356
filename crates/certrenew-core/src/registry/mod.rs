//! Plugin-based provider registry
//!
//! The registry maps a configured provider name to a factory that builds a
//! DNS-01 backend, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use certrenew_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! certrenew_provider_cloudflare::register(&mut registry);
//!
//! // Build the (wrapped) provider for one domain group
//! let provider = registry.resolve(&domain_config)?;
//! ```
//!
//! ## Registration
//!
//! Provider crates register themselves through a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut ProviderRegistry) {
//!     registry.register_provider("cloudflare", CloudflareFactory);
//! }
//! ```
//!
//! The registry is filled by the composition root before any lookup and
//! only read afterwards, so it needs no interior locking.

use std::collections::HashMap;

use tracing::debug;

use crate::config::DomainConfig;
use crate::error::{Error, Result};
use crate::logging_provider::LoggingProvider;
use crate::traits::{ChallengeProvider, ChallengeProviderFactory};

/// Provider registry for plugin-based challenge provider creation
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered factories keyed by provider name
    providers: HashMap<String, Box<dyn ChallengeProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory
    ///
    /// Registering a name twice replaces the earlier factory.
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name as used in configuration (e.g., "cloudflare")
    /// - `factory`: Factory object or closure creating provider instances
    pub fn register_provider(
        &mut self,
        name: impl Into<String>,
        factory: impl ChallengeProviderFactory + 'static,
    ) {
        let name = name.into();
        if self.providers.insert(name.clone(), Box::new(factory)).is_some() {
            debug!(provider = %name, "Replaced previously registered provider factory");
        }
    }

    /// Build the challenge provider for a domain group
    ///
    /// # Returns
    ///
    /// - `Ok(..)`: The backend, wrapped in [`LoggingProvider`]
    /// - `Err(Error::UnsupportedProvider)`: No factory is registered under the name
    /// - `Err(..)`: The factory's own error (e.g. a missing credential), unchanged
    pub fn resolve(&self, config: &DomainConfig) -> Result<Box<dyn ChallengeProvider>> {
        let factory = self
            .providers
            .get(&config.provider)
            .ok_or_else(|| Error::UnsupportedProvider(config.provider.clone()))?;

        let backend = factory.create(config)?;
        Ok(Box::new(LoggingProvider::new(backend)))
    }

    /// List all registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider name is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}
