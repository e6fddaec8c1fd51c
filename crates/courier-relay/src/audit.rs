// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic check that every rule's source chat is still visible to its device.
//!
//! Absence only counts when the device listed its dialogs successfully and the
//! listing was complete. A source must be missing from `miss_threshold`
//! consecutive audits before its rules are disabled; being seen once resets it.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use courier_core::types::DeviceStatus;
use courier_core::{CourierError, DeviceId, RouteRuleStore};
use courier_mtproto::DeviceSessionManager;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::strikes::StrikeCounter;

/// Totals of one audit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub devices_checked: usize,
    pub devices_skipped: usize,
    pub sources_missing: usize,
    pub rules_disabled: u64,
}

pub struct RuleAuditor {
    devices: Arc<DeviceSessionManager>,
    rules: Arc<dyn RouteRuleStore>,
    misses: StrikeCounter<(DeviceId, i64)>,
    threshold: u32,
}

impl RuleAuditor {
    pub fn new(
        devices: Arc<DeviceSessionManager>,
        rules: Arc<dyn RouteRuleStore>,
        threshold: u32,
    ) -> Self {
        Self {
            devices,
            rules,
            misses: StrikeCounter::new(),
            threshold: threshold.max(1),
        }
    }

    /// Consecutive audits in which `(device, source)` was missing.
    pub fn miss_count(&self, device_id: DeviceId, source_chat_id: i64) -> u32 {
        self.misses.count(&(device_id, source_chat_id))
    }

    pub fn evict_stale(&self, ttl: Duration) -> usize {
        self.misses.evict_stale(ttl)
    }

    pub async fn audit_once(&self) -> Result<AuditReport, CourierError> {
        let mut report = AuditReport::default();
        for device_id in self.rules.devices_with_rules().await? {
            match self.audit_device(device_id, &mut report).await {
                Ok(true) => report.devices_checked += 1,
                Ok(false) => report.devices_skipped += 1,
                Err(e) => {
                    warn!(%device_id, error = %e, "audit skipped device");
                    report.devices_skipped += 1;
                }
            }
        }
        info!(
            checked = report.devices_checked,
            skipped = report.devices_skipped,
            disabled = report.rules_disabled,
            "rule audit finished"
        );
        Ok(report)
    }

    /// Returns false when the device could not be judged this round.
    async fn audit_device(
        &self,
        device_id: DeviceId,
        report: &mut AuditReport,
    ) -> Result<bool, CourierError> {
        let device = self.devices.status(device_id).await?;
        if device.status != DeviceStatus::Active {
            debug!(%device_id, status = %device.status, "device not active, audit skipped");
            return Ok(false);
        }
        let snapshot = self.devices.list_dialogs(device_id).await?;
        if !snapshot.complete {
            debug!(%device_id, "dialog listing truncated, audit skipped");
            return Ok(false);
        }
        let visible: HashSet<i64> = snapshot.dialogs.iter().map(|d| d.peer_id).collect();

        let sources: BTreeSet<i64> = self
            .rules
            .list_rules_by_device(device_id)
            .await?
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.source_chat_id)
            .collect();
        for source in sources {
            let key = (device_id, source);
            if visible.contains(&source) {
                self.misses.reset(&key);
                continue;
            }
            report.sources_missing += 1;
            let misses = self.misses.hit(key);
            if misses < self.threshold {
                debug!(%device_id, chat_id = source, misses, "rule source missing");
                continue;
            }
            self.misses.reset(&key);
            let disabled = self.rules.disable_by_source(device_id, source).await?;
            metrics::counter!("courier_rules_disabled_total", "reason" => "source_missing")
                .increment(disabled);
            warn!(%device_id, chat_id = source, disabled, "rule source gone, rules disabled");
            report.rules_disabled += disabled;
        }
        Ok(true)
    }

    /// Audit every `interval` until cancelled. The first pass runs after one
    /// full interval.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.audit_once().await {
                        warn!(error = %e, "rule audit failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("rule audit shutting down");
                    break;
                }
            }
        }
    }
}
