// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// HTTP listener and admin API settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bot and account protocol integration settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Session encryption settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Rule engine windows and thresholds.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Device login and dialog sync settings.
    #[serde(default)]
    pub devices: DevicesConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token guarding `/api`. `None` rejects every admin request.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Chat platform integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Public https base address the platform calls back for webhooks.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Shared secret the platform echoes in the webhook header.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Application id for the account protocol.
    #[serde(default)]
    pub api_id: Option<i32>,

    /// Application hash for the account protocol.
    #[serde(default)]
    pub api_hash: Option<String>,

    /// Pause between targets of a bulk send or forward.
    #[serde(default = "default_bulk_delay_ms")]
    pub bulk_delay_ms: u64,

    /// Pause between deletes in a batch delete.
    #[serde(default = "default_delete_delay_ms")]
    pub delete_delay_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            public_url: None,
            webhook_secret: None,
            api_id: None,
            api_hash: None,
            bulk_delay_ms: default_bulk_delay_ms(),
            delete_delay_ms: default_delete_delay_ms(),
        }
    }
}

fn default_bulk_delay_ms() -> u64 {
    50
}

fn default_delete_delay_ms() -> u64 {
    30
}

/// Credential vault configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte key used for every device session blob.
    #[serde(default)]
    pub session_key: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Route rule engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// How long a delivered (source, message, rule) tuple is remembered.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Interval of the eviction sweep.
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// Consecutive destination failures before rules are disabled.
    #[serde(default = "default_threshold")]
    pub failure_threshold: u32,

    /// Consecutive audit misses before a rule is disabled.
    #[serde(default = "default_threshold")]
    pub miss_threshold: u32,

    /// Interval of the source-chat audit.
    #[serde(default = "default_audit_interval_secs")]
    pub audit_interval_secs: u64,

    /// Idle time after which a failure or miss streak is forgotten.
    #[serde(default = "default_strike_ttl_secs")]
    pub strike_ttl_secs: u64,

    /// Capacity of the device event stream.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            failure_threshold: default_threshold(),
            miss_threshold: default_threshold(),
            audit_interval_secs: default_audit_interval_secs(),
            strike_ttl_secs: default_strike_ttl_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl RelayConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn audit_interval(&self) -> Duration {
        Duration::from_secs(self.audit_interval_secs)
    }

    pub fn strike_ttl(&self) -> Duration {
        Duration::from_secs(self.strike_ttl_secs)
    }
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_gc_interval_secs() -> u64 {
    60
}

fn default_threshold() -> u32 {
    3
}

fn default_audit_interval_secs() -> u64 {
    600
}

fn default_strike_ttl_secs() -> u64 {
    3600
}

fn default_event_buffer() -> usize {
    1024
}

/// Device login and dialog sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DevicesConfig {
    /// Bound on each login round trip.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,

    /// Bound on a dialog listing.
    #[serde(default = "default_dialog_timeout_secs")]
    pub dialog_timeout_secs: u64,

    /// Dialogs fetched by a normal sync.
    #[serde(default = "default_dialog_limit")]
    pub dialog_limit: usize,

    /// Dialogs fetched by the retry after a rebuilt connection.
    #[serde(default = "default_dialog_retry_limit")]
    pub dialog_retry_limit: usize,

    /// Age after which an unfinished login attempt is dropped.
    #[serde(default = "default_login_ttl_secs")]
    pub login_ttl_secs: u64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: default_login_timeout_secs(),
            dialog_timeout_secs: default_dialog_timeout_secs(),
            dialog_limit: default_dialog_limit(),
            dialog_retry_limit: default_dialog_retry_limit(),
            login_ttl_secs: default_login_ttl_secs(),
        }
    }
}

fn default_login_timeout_secs() -> u64 {
    30
}

fn default_dialog_timeout_secs() -> u64 {
    15
}

fn default_dialog_limit() -> usize {
    200
}

fn default_dialog_retry_limit() -> usize {
    150
}

fn default_login_ttl_secs() -> u64 {
    900
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
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

fn default_log_level() -> String {
    "info".to_string()
}
