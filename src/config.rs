//! Configuration module
//!
//! TOML-based configuration with serde defaults; every key can be omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ingress carrier bind settings
    #[serde(default)]
    pub server: ServerConfig,

    /// OCPP protocol behavior
    #[serde(default)]
    pub ocpp: OcppSettings,

    /// End-of-charge notification policy
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Deferred job timing
    #[serde(default)]
    pub jobs: JobSettings,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WebSocket + SOAP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// OCPP-J WebSocket bind host
    #[serde(default = "default_host")]
    pub ws_host: String,

    /// OCPP-J WebSocket port
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// OCPP-S (SOAP over HTTP) bind host
    #[serde(default = "default_host")]
    pub soap_host: String,

    /// OCPP-S port
    #[serde(default = "default_soap_port")]
    pub soap_port: u16,

    /// Graceful shutdown timeout (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: default_host(),
            ws_port: default_ws_port(),
            soap_host: default_host(),
            soap_port: default_soap_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// OCPP protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcppSettings {
    /// Heartbeat interval advertised to SOAP (1.5) stations, seconds
    #[serde(default = "default_heartbeat_soap")]
    pub heartbeat_interval_soap_secs: i64,

    /// Heartbeat interval advertised to JSON (1.6) stations, seconds
    #[serde(default = "default_heartbeat_json")]
    pub heartbeat_interval_json_secs: i64,

    /// Retry interval returned in a Rejected BootNotification, seconds
    #[serde(default = "default_boot_reject_retry")]
    pub boot_reject_retry_secs: i64,

    /// A station whose `last_seen` is older than this is considered offline
    #[serde(default = "default_max_last_seen")]
    pub max_last_seen_interval_secs: i64,
}

impl Default for OcppSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_soap_secs: default_heartbeat_soap(),
            heartbeat_interval_json_secs: default_heartbeat_json(),
            boot_reject_retry_secs: default_boot_reject_retry(),
            max_last_seen_interval_secs: default_max_last_seen(),
        }
    }
}

/// End-of-charge notification policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Enables end-of-charge detection (100% SoC or three idle intervals)
    #[serde(default = "default_true")]
    pub end_of_charge_enabled: bool,

    /// Enables the optimal-charge notification
    #[serde(default = "default_true")]
    pub before_end_of_charge_enabled: bool,

    /// SoC threshold for the optimal-charge notification
    #[serde(default = "default_optimal_percent")]
    pub before_end_of_charge_percent: u8,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            end_of_charge_enabled: default_true(),
            before_end_of_charge_enabled: default_true(),
            before_end_of_charge_percent: default_optimal_percent(),
        }
    }
}

/// Timing of deferred background work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Delay before the post-boot configuration push, milliseconds
    #[serde(default = "default_post_boot_delay")]
    pub post_boot_config_delay_ms: u64,

    /// Delay before smart-charging recomputation after a stop, milliseconds
    #[serde(default = "default_smart_charging_delay")]
    pub smart_charging_delay_ms: u64,

    /// Timeout for outbound integration calls, milliseconds
    #[serde(default = "default_per_call_timeout")]
    pub per_call_timeout_ms: u64,

    /// Concurrency bound of the deferred scheduler
    #[serde(default = "default_deferred_concurrency")]
    pub deferred_concurrency: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            post_boot_config_delay_ms: default_post_boot_delay(),
            smart_charging_delay_ms: default_smart_charging_delay(),
            per_call_timeout_ms: default_per_call_timeout(),
            deferred_concurrency: default_deferred_concurrency(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing env-filter directive, e.g. "info" or "voltaris_csms=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
        toml::from_str(&raw).map_err(|e| format!("parse {path:?}: {e}"))
    }
}

/// Default configuration file path (~/.config/voltaris-csms/config.toml)
pub fn default_config_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".config")
        .join("voltaris-csms")
        .join("config.toml")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ws_port() -> u16 {
    8080
}

fn default_soap_port() -> u16 {
    8081
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_heartbeat_soap() -> i64 {
    300
}

fn default_heartbeat_json() -> i64 {
    300
}

fn default_boot_reject_retry() -> i64 {
    30
}

fn default_max_last_seen() -> i64 {
    540
}

fn default_true() -> bool {
    true
}

fn default_optimal_percent() -> u8 {
    80
}

fn default_post_boot_delay() -> u64 {
    3000
}

fn default_smart_charging_delay() -> u64 {
    3000
}

fn default_per_call_timeout() -> u64 {
    10_000
}

fn default_deferred_concurrency() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}
