//! Configuration schema types.
//!
//! One struct per TOML section. Every field has a default, so any section
//! or key may be omitted; unknown keys are rejected.

use phasebus_core::phases;
use serde::{Deserialize, Serialize};

/// Phase lists for the inbound and outbound flows.
///
/// Fault flows reuse the outbound list. Phase priority is the position in
/// the list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PhasesConfig {
    /// Inbound phase names in execution order.
    #[serde(default = "default_inbound_phases")]
    pub inbound: Vec<String>,

    /// Outbound phase names in execution order.
    #[serde(default = "default_outbound_phases")]
    pub outbound: Vec<String>,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            inbound: default_inbound_phases(),
            outbound: default_outbound_phases(),
        }
    }
}

fn default_inbound_phases() -> Vec<String> {
    phases::DEFAULT_INBOUND.iter().map(ToString::to_string).collect()
}

fn default_outbound_phases() -> Vec<String> {
    phases::DEFAULT_OUTBOUND.iter().map(ToString::to_string).collect()
}

/// Where service invocations run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// On the thread driving the inbound chain.
    #[default]
    Inline,
    /// On a tokio runtime's blocking pool; the inbound chain suspends.
    Tokio,
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Executor mode.
    #[serde(default)]
    pub mode: ExecutorMode,

    /// Worker threads of the runtime built for [`ExecutorMode::Tokio`].
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_worker_threads() -> usize {
    4
}

/// Chain resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Share resolved chains across exchanges of an endpoint.
    #[serde(default = "default_true")]
    pub cache_resolved: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cache_resolved: true,
        }
    }
}

/// Fault marshalling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FaultsConfig {
    /// Send server fault messages and detail to peers.
    #[serde(default)]
    pub expose_details: bool,

    /// Message sent in place of hidden server fault messages.
    #[serde(default = "default_redacted_message")]
    pub redacted_message: String,
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            expose_details: false,
            redacted_message: default_redacted_message(),
        }
    }
}

fn default_redacted_message() -> String {
    "An internal error occurred".to_string()
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// How long a two-way invocation waits for its response.
    #[serde(default = "default_client_timeout")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_client_timeout(),
        }
    }
}

fn default_client_timeout() -> u64 {
    30_000
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter directive (trace, debug, info, warn, error, or per target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Payload bytes shown by the logging interceptors.
    #[serde(default = "default_payload_limit")]
    pub payload_limit: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
            payload_limit: default_payload_limit(),
        }
    }
}

impl LoggingConfig {
    /// Converts this section into the telemetry crate's subscriber settings.
    #[must_use]
    pub fn to_log_config(&self) -> phasebus_telemetry::LogConfig {
        let base = match self.format {
            LogFormat::Json => phasebus_telemetry::LogConfig::production(),
            LogFormat::Pretty => phasebus_telemetry::LogConfig::development(),
        };
        phasebus_telemetry::LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            file_line_info: self.include_location,
            ..base
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_payload_limit() -> usize {
    1024
}

fn default_true() -> bool {
    true
}
