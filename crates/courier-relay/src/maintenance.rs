// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Housekeeping timer: expired dedup marks, stale counters, abandoned logins,
//! old poll origins and empty fan-out rooms.

use std::sync::Arc;
use std::time::Duration;

use courier_bus::FanoutHub;
use courier_mtproto::DeviceSessionManager;
use courier_telegram::BotRegistry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audit::RuleAuditor;
use crate::engine::RouteEngine;

/// How long poll updates can still be traced back to the chat they were sent to.
pub const POLL_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub dedup_marks: usize,
    pub failure_counters: usize,
    pub miss_counters: usize,
    pub stale_logins: usize,
    pub expired_polls: usize,
    pub empty_rooms: usize,
}

pub struct Maintenance {
    engine: Arc<RouteEngine>,
    auditor: Arc<RuleAuditor>,
    devices: Arc<DeviceSessionManager>,
    registry: Arc<BotRegistry>,
    hub: Arc<FanoutHub>,
    strike_ttl: Duration,
}

impl Maintenance {
    pub fn new(
        engine: Arc<RouteEngine>,
        auditor: Arc<RuleAuditor>,
        devices: Arc<DeviceSessionManager>,
        registry: Arc<BotRegistry>,
        hub: Arc<FanoutHub>,
        strike_ttl: Duration,
    ) -> Self {
        Self {
            engine,
            auditor,
            devices,
            registry,
            hub,
            strike_ttl,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let (dedup_marks, failure_counters) = self.engine.sweep();
        let report = SweepReport {
            dedup_marks,
            failure_counters,
            miss_counters: self.auditor.evict_stale(self.strike_ttl),
            stale_logins: self.devices.prune_stale_logins().await,
            expired_polls: self.registry.prune_polls(POLL_RETENTION),
            empty_rooms: self.hub.prune(),
        };
        if report != SweepReport::default() {
            debug!(?report, "maintenance sweep");
        }
        report
    }

    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = cancel.cancelled() => {
                    info!("maintenance loop shutting down");
                    break;
                }
            }
        }
    }
}
