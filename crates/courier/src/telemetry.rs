// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing subscriber and Prometheus recorder setup.

use std::sync::Arc;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Renders the current metrics in exposition format.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

fn default_filter(log_level: &str) -> String {
    format!("courier={log_level},warn")
}

/// `RUST_LOG` wins; otherwise Courier logs at `log_level` and dependencies at warn.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Install the global Prometheus recorder. Metrics stay disabled when a
/// recorder is already installed.
pub fn install_metrics() -> Option<MetricsRender> {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "prometheus recorder not installed, continuing without metrics");
            return None;
        }
    };
    describe_metrics();
    info!("prometheus metrics recorder installed");
    Some(Arc::new(move || handle.render()))
}

fn describe_metrics() {
    describe_counter!(
        "courier_relay_deliveries_total",
        "Route rule deliveries by outcome"
    );
    describe_counter!(
        "courier_relay_duplicates_total",
        "Device events suppressed by the dedup window"
    );
    describe_counter!(
        "courier_rules_disabled_total",
        "Route rules disabled automatically, by reason"
    );
    describe_counter!(
        "courier_webhook_updates_total",
        "Bot webhook updates by kind"
    );
    describe_counter!(
        "courier_device_events_total",
        "Messages observed on device connections"
    );
    describe_gauge!("courier_dedup_entries", "Live dedup marks");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_the_level_to_courier() {
        assert_eq!(default_filter("debug"), "courier=debug,warn");
    }
}
