//! Kernel configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::errors::KernelError;
use crate::resources::{ResourceLimits, ResourceQuota};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Resource ceilings and the default per-execution quota.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Scheduler timing.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Tool server connections.
    #[serde(default)]
    pub connections: ConnectionConfig,
    /// Event loop tuning.
    #[serde(default)]
    pub event_loop: EventLoopConfig,
    /// Command discovery.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KernelConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, KernelError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Rejects values the kernel cannot operate with.
    pub fn validate(&self) -> Result<(), KernelError> {
        if !(self.resources.limits.cpu > 0.0) {
            return Err(KernelError::Config("resources.limits.cpu must be positive".to_string()));
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(KernelError::Config(
                "execution.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.execution.worker_pool_size == 0 {
            return Err(KernelError::Config(
                "execution.worker_pool_size must be non-zero".to_string(),
            ));
        }
        if self.connections.registry_filename.trim().is_empty() {
            return Err(KernelError::Config(
                "connections.registry_filename must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resource settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Global ceilings.
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Reservation used for tools without their own quota.
    #[serde(default)]
    pub default_execution_quota: ResourceQuota,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Timeout for local handlers.
    #[serde(default = "default_local_timeout")]
    pub local_timeout_seconds: f64,
    /// Timeout for a remote submit-and-poll round.
    #[serde(default = "default_external_timeout")]
    pub external_timeout_seconds: f64,
    /// Delay between result polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Consecutive poll failures tolerated before giving up.
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
    /// Local handlers allowed to run at once.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Bound on the adaptive "did you mean" round-trip for unknown tools.
    #[serde(default = "default_suggestion_timeout")]
    pub suggestion_timeout_seconds: f64,
    /// Completed records kept for lookup; older ones are evicted first.
    #[serde(default = "default_completed_retention")]
    pub completed_retention: usize,
}

const fn default_local_timeout() -> f64 {
    30.0
}

const fn default_external_timeout() -> f64 {
    10.0
}

const fn default_poll_interval() -> u64 {
    500
}

const fn default_max_poll_errors() -> u32 {
    3
}

const fn default_worker_pool_size() -> usize {
    8
}

const fn default_suggestion_timeout() -> f64 {
    5.0
}

const fn default_completed_retention() -> usize {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            local_timeout_seconds: default_local_timeout(),
            external_timeout_seconds: default_external_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_poll_errors: default_max_poll_errors(),
            worker_pool_size: default_worker_pool_size(),
            suggestion_timeout_seconds: default_suggestion_timeout(),
            completed_retention: default_completed_retention(),
        }
    }
}

impl ExecutionConfig {
    /// Local handler timeout.
    #[must_use]
    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.local_timeout_seconds.max(0.0))
    }

    /// Remote round timeout.
    #[must_use]
    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.external_timeout_seconds.max(0.0))
    }

    /// Poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Adaptive suggestion timeout.
    #[must_use]
    pub fn suggestion_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.suggestion_timeout_seconds.max(0.0))
    }

    /// Sets how many completed records are kept.
    #[must_use]
    pub const fn with_completed_retention(mut self, records: usize) -> Self {
        self.completed_retention = records;
        self
    }

    /// Sets both timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, local_seconds: f64, external_seconds: f64) -> Self {
        self.local_timeout_seconds = local_seconds;
        self.external_timeout_seconds = external_seconds;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Directory holding the connection registry file.
    #[serde(default = "default_runtime_dir")]
    pub runtime_data_directory: PathBuf,
    /// Registry file name.
    #[serde(default = "default_registry_filename")]
    pub registry_filename: String,
    /// Handshake timeout.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    /// Per-request timeout for HTTP clients.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Server used when a tool has no locator of its own.
    #[serde(default)]
    pub default_server_url: Option<String>,
    /// Reconnect to known servers when the kernel starts.
    #[serde(default)]
    pub reconnect_on_start: bool,
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("./runtime_data")
}

fn default_registry_filename() -> String {
    "mcp_servers.json".to_string()
}

const fn default_connection_timeout() -> u64 {
    30
}

const fn default_request_timeout() -> u64 {
    60
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            runtime_data_directory: default_runtime_dir(),
            registry_filename: default_registry_filename(),
            connection_timeout_seconds: default_connection_timeout(),
            request_timeout_seconds: default_request_timeout(),
            default_server_url: None,
            reconnect_on_start: false,
        }
    }
}

impl ConnectionConfig {
    /// Full path of the registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.runtime_data_directory.join(&self.registry_filename)
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

/// Event loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLoopConfig {
    /// Bounded wait on each queue before re-checking the running flag.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,
}

const fn default_wait_timeout() -> u64 {
    100
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout(),
        }
    }
}

/// Command discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Register discovered commands as local tools at startup.
    #[serde(default)]
    pub enabled: bool,
    /// Command names to look for on `PATH`.
    #[serde(default = "default_commands")]
    pub commands: Vec<String>,
}

fn default_commands() -> Vec<String> {
    ["ls", "cat", "grep", "git", "uname", "df"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            commands: default_commands(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of text.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}
