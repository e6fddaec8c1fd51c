// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier relay.

use thiserror::Error;

use crate::types::DeviceId;

/// Platform error fragments that mean the destination chat is gone for good.
const PERMANENT_MARKERS: &[&str] = &[
    "chat not found",
    "chat has been deleted",
    "bot was kicked",
    "user is deactivated",
    "peer_id_invalid",
];

/// Platform error fragments that mean the bot lost access to the destination.
const FORBIDDEN_MARKERS: &[&str] = &[
    "forbidden",
    "not a member",
    "not enough rights",
    "have no rights",
];

/// Platform error fragments for conditions that clear up on their own.
const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "network",
    "too many requests",
];

/// The primary error type used across all Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Missing or invalid external-integration settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The addressed bot or device has no live connection.
    #[error("{kind} {id} is not running")]
    NotRunning { kind: &'static str, id: String },

    /// Login, code or second-factor failure, surfaced verbatim.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// `submit_code`/`submit_password` called without a login in progress.
    #[error("no pending login for device {0}")]
    NoPendingLogin(DeviceId),

    /// Connect, reset, or busy backend. Retried by the data-access layer only.
    #[error("transient failure: {message}")]
    TransientNetwork {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The destination chat no longer exists or removed the bot.
    #[error("permanent delivery failure: {0}")]
    PermanentDelivery(String),

    /// The bot is not allowed to post into the destination.
    #[error("delivery forbidden: {0}")]
    Forbidden(String),

    /// The addressed entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Any other failure reported by the chat platform.
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Session encryption or decryption failed.
    #[error("vault error: {0}")]
    Vault(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Classify a raw platform error message into the delivery taxonomy.
    ///
    /// Matching is case-insensitive on well-known substrings of the bot and
    /// account protocol error texts. Anything unrecognised becomes
    /// [`CourierError::Platform`].
    pub fn classify_platform(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
            CourierError::PermanentDelivery(message)
        } else if FORBIDDEN_MARKERS.iter().any(|m| lower.contains(m)) {
            CourierError::Forbidden(message)
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            CourierError::TransientNetwork { message, source }
        } else {
            CourierError::Platform { message, source }
        }
    }

    /// Shorthand for [`CourierError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CourierError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`CourierError::NotRunning`].
    pub fn not_running(kind: &'static str, id: impl ToString) -> Self {
        CourierError::NotRunning {
            kind,
            id: id.to_string(),
        }
    }

    /// True for errors that count against a destination's failure streak.
    pub fn is_destination_failure(&self) -> bool {
        matches!(
            self,
            CourierError::PermanentDelivery(_) | CourierError::Forbidden(_)
        )
    }

    /// True for errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CourierError::TransientNetwork { .. } | CourierError::Timeout { .. }
        )
    }
}
