//! Configuration management for the credential ledger.
//!
//! Loads configuration from environment variables (and a `.env` file, if
//! present) with sensible defaults.

use crate::types::ComponentIds;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use turnstile_core::Identity;
use turnstile_runtime::DEFAULT_BROADCAST_CAPACITY;

/// Configuration problems that make a deployment unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two components were configured with the same identity
    #[error("components must have distinct identities, {0} is used twice")]
    DuplicateIdentity(Identity),

    /// The deployer shares an identity with a component
    #[error("deployer {0} must not share an identity with a component")]
    DeployerIsComponent(Identity),
}

/// Ledger configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Initial mint authority; hands minting to the catalog at bootstrap
    pub deployer: Identity,
    /// Identities the components act under
    pub components: ComponentIds,
    /// Journal entries buffered for slow subscribers
    pub journal_capacity: usize,
    /// How long shutdown waits for in-flight commands
    pub shutdown_timeout: Duration,
    /// Log filter directive (`RUST_LOG` syntax)
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            deployer: Identity::new("deployer"),
            components: ComponentIds::default(),
            journal_capacity: DEFAULT_BROADCAST_CAPACITY,
            shutdown_timeout: Duration::from_secs(30),
            log_filter: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from the process environment.
    ///
    /// Reads `.env` first when one exists. Unset or unparsable variables
    /// fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        // A missing .env file is the normal case outside development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let identity = |key: &str, default: Identity| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map_or(default, |value| Identity::new(value.trim()))
        };

        Self {
            deployer: identity("TURNSTILE_DEPLOYER", defaults.deployer),
            components: ComponentIds {
                registry: identity("TURNSTILE_REGISTRY_ID", defaults.components.registry),
                catalog: identity("TURNSTILE_CATALOG_ID", defaults.components.catalog),
                market: identity("TURNSTILE_MARKET_ID", defaults.components.market),
            },
            journal_capacity: lookup("TURNSTILE_JOURNAL_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.journal_capacity),
            shutdown_timeout: lookup("TURNSTILE_SHUTDOWN_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.shutdown_timeout, Duration::from_secs),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Check that the configured identities can coexist
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DuplicateIdentity`] if two components share an id
    /// - [`ConfigError::DeployerIsComponent`] if the deployer is a component
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ComponentIds {
            registry,
            catalog,
            market,
        } = &self.components;
        if registry == catalog || registry == market {
            return Err(ConfigError::DuplicateIdentity(registry.clone()));
        }
        if catalog == market {
            return Err(ConfigError::DuplicateIdentity(catalog.clone()));
        }
        if [registry, catalog, market].contains(&&self.deployer) {
            return Err(ConfigError::DeployerIsComponent(self.deployer.clone()));
        }
        Ok(())
    }
}
