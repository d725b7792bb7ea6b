//! Main configuration types.
//!
//! This module provides the top-level [`PhasebusConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::{
    ChainConfig, ClientConfig, ConfigError, ExecutorConfig, FaultsConfig, LogFormat,
    LoggingConfig, PhasesConfig,
};

/// Complete phasebus configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use phasebus_config::PhasebusConfig;
///
/// let config = PhasebusConfig::default();
/// assert!(config.chain.cache_resolved);
/// assert_eq!(config.phases.outbound.last().map(String::as_str), Some("send"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PhasebusConfig {
    /// Phase lists.
    #[serde(default)]
    pub phases: PhasesConfig,

    /// Service invocation executor.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Chain resolution.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Fault marshalling.
    #[serde(default)]
    pub faults: FaultsConfig,

    /// Client invocation.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PhasebusConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PhasebusConfigBuilder {
        PhasebusConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A phase list is empty or names a phase twice
    /// - `executor.worker_threads` is zero
    /// - `client.timeout_ms` is zero
    /// - `logging.level` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_phase_list("phases.inbound", &self.phases.inbound)?;
        validate_phase_list("phases.outbound", &self.phases.outbound)?;

        if self.executor.worker_threads == 0 {
            return Err(ConfigError::invalid_value(
                "executor.worker_threads",
                "must be at least 1",
            ));
        }

        if self.client.timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "client.timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }

    /// Returns the client response timeout.
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }

    /// Development preset: pretty debug logs, fault details exposed.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config.faults.expose_details = true;
        config
    }

    /// Production preset: JSON info logs, fault details hidden.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.faults.expose_details = false;
        config
    }
}

fn validate_phase_list(field: &str, names: &[String]) -> Result<(), ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::invalid_value(field, "must name at least one phase"));
    }

    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid_value(field, "phase names must not be empty"));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::invalid_value(
                field,
                format!("phase '{name}' is listed more than once"),
            ));
        }
    }

    Ok(())
}

/// Builder for [`PhasebusConfig`].
#[derive(Debug, Default)]
pub struct PhasebusConfigBuilder {
    phases: Option<PhasesConfig>,
    executor: Option<ExecutorConfig>,
    chain: Option<ChainConfig>,
    faults: Option<FaultsConfig>,
    client: Option<ClientConfig>,
    logging: Option<LoggingConfig>,
}

impl PhasebusConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the phase lists.
    #[must_use]
    pub fn phases(mut self, phases: PhasesConfig) -> Self {
        self.phases = Some(phases);
        self
    }

    /// Set the executor configuration.
    #[must_use]
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the chain configuration.
    #[must_use]
    pub fn chain(mut self, chain: ChainConfig) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the fault configuration.
    #[must_use]
    pub fn faults(mut self, faults: FaultsConfig) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Set the client configuration.
    #[must_use]
    pub fn client(mut self, client: ClientConfig) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> PhasebusConfig {
        PhasebusConfig {
            phases: self.phases.unwrap_or_default(),
            executor: self.executor.unwrap_or_default(),
            chain: self.chain.unwrap_or_default(),
            faults: self.faults.unwrap_or_default(),
            client: self.client.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<PhasebusConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
