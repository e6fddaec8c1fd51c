// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay pipeline for Courier.
//!
//! Two independent flows live here. Bot webhook deliveries go through
//! [`WebhookIngestor`] into the cache and the fan-out hub. Device events go
//! through [`RouteEngine`], which matches route rules and forwards via the bot
//! registry. [`RuleAuditor`] and [`Maintenance`] run on timers beside them.

pub mod audit;
pub mod dedup;
pub mod engine;
pub mod ingest;
pub mod maintenance;
pub mod strikes;
pub mod transform;

use std::time::Duration;

use courier_config::model::RelayConfig;

pub use audit::{AuditReport, RuleAuditor};
pub use engine::{DEFAULT_TEST_TEXT, Delivery, RouteEngine};
pub use ingest::{UpdateKind, WebhookIngestor};
pub use maintenance::{Maintenance, SweepReport};

/// Thresholds and windows of the relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub dedup_window: Duration,
    pub failure_threshold: u32,
    pub miss_threshold: u32,
    pub strike_ttl: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            dedup_window: config.dedup_window(),
            failure_threshold: config.failure_threshold.max(1),
            miss_threshold: config.miss_threshold.max(1),
            strike_ttl: config.strike_ttl(),
        }
    }
}
