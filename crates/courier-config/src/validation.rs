// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Webhook and vault settings may be absent at startup; the operations that
//! need them report a configuration error instead. When they are present they
//! must be well formed.

use base64::Engine;

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration, collecting every error.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    }
    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must be non-zero"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if let Some(url) = config.telegram.public_url.as_deref()
        && !url.starts_with("https://")
    {
        errors.push(ConfigError::validation(format!(
            "telegram.public_url must be an https URL, got `{url}`"
        )));
    }

    if let Some(secret) = config.telegram.webhook_secret.as_deref()
        && !is_valid_webhook_secret(secret)
    {
        errors.push(ConfigError::validation(
            "telegram.webhook_secret must be 1-256 characters of A-Z, a-z, 0-9, `_` or `-`",
        ));
    }

    if config.telegram.bulk_delay_ms > 10_000 || config.telegram.delete_delay_ms > 10_000 {
        errors.push(ConfigError::validation(
            "telegram bulk/delete delays must not exceed 10000 ms",
        ));
    }

    if let Some(key) = config.vault.session_key.as_deref() {
        match base64::engine::general_purpose::STANDARD.decode(key.trim()) {
            Ok(bytes) if bytes.len() == 32 => {}
            Ok(bytes) => errors.push(ConfigError::validation(format!(
                "vault.session_key must decode to 32 bytes, got {}",
                bytes.len()
            ))),
            Err(e) => errors.push(ConfigError::validation(format!(
                "vault.session_key is not valid base64: {e}"
            ))),
        }
    }

    let relay = &config.relay;
    if relay.failure_threshold == 0 {
        errors.push(ConfigError::validation("relay.failure_threshold must be at least 1"));
    }
    if relay.miss_threshold == 0 {
        errors.push(ConfigError::validation("relay.miss_threshold must be at least 1"));
    }
    if relay.dedup_window_secs == 0 {
        errors.push(ConfigError::validation("relay.dedup_window_secs must be at least 1"));
    }
    if relay.gc_interval_secs == 0 || relay.audit_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "relay.gc_interval_secs and relay.audit_interval_secs must be at least 1",
        ));
    }
    // miss counters are hit once per audit and must survive until the next
    if relay.strike_ttl_secs <= relay.audit_interval_secs {
        errors.push(ConfigError::validation(format!(
            "relay.strike_ttl_secs ({}) must be greater than relay.audit_interval_secs ({})",
            relay.strike_ttl_secs, relay.audit_interval_secs
        )));
    }
    if relay.event_buffer == 0 {
        errors.push(ConfigError::validation("relay.event_buffer must be at least 1"));
    }

    let devices = &config.devices;
    if devices.dialog_limit == 0 || devices.dialog_retry_limit == 0 {
        errors.push(ConfigError::validation(
            "devices.dialog_limit and devices.dialog_retry_limit must be at least 1",
        ));
    }
    if devices.login_timeout_secs == 0 || devices.dialog_timeout_secs == 0 {
        errors.push(ConfigError::validation("device timeouts must be at least 1 second"));
    }

    if !matches!(
        config.logging.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::validation(format!(
            "logging.level `{}` is not one of trace, debug, info, warn, error",
            config.logging.level
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The platform accepts 1-256 characters from `[A-Za-z0-9_-]`.
fn is_valid_webhook_secret(secret: &str) -> bool {
    (1..=256).contains(&secret.len())
        && secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
