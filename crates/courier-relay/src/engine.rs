// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route rule engine.
//!
//! Consumes normalized device events in arrival order, matches them against
//! the enabled rules for their `(device, chat)`, and forwards through the bot
//! registry. Destination failures feed a per-destination strike counter; at
//! the threshold every rule sending to that destination is disabled and the
//! destination's cached rows are purged.

use std::sync::Arc;

use courier_core::types::{DeviceMessageEvent, MediaPayload, RouteRule, SentMessage};
use courier_core::{BotId, CourierError, MessageStore, RouteRuleStore, RuleId};
use courier_telegram::BotRegistry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::RelaySettings;
use crate::dedup::{DedupCache, DedupKey};
use crate::strikes::StrikeCounter;
use crate::transform::RuleConfig;

/// Text used by [`RouteEngine::test_route`] when the caller gives none.
pub const DEFAULT_TEST_TEXT: &str = "Route test ✅";

/// What happened to one rule for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sent { message_id: i32 },
    /// Marked within the dedup window already.
    Duplicate,
    /// Rejected by the rule's filters.
    Filtered,
    /// No media and nothing left of the text after transforms.
    Empty,
    /// The rule's filter or transform JSON could not be read.
    Misconfigured,
    Failed {
        error: String,
        /// Rules disabled because this failure tripped the breaker.
        disabled: u64,
    },
}

impl Delivery {
    fn outcome(&self) -> &'static str {
        match self {
            Delivery::Sent { .. } => "sent",
            Delivery::Duplicate => "duplicate",
            Delivery::Filtered => "filtered",
            Delivery::Empty => "empty",
            Delivery::Misconfigured => "misconfigured",
            Delivery::Failed { .. } => "failed",
        }
    }
}

pub struct RouteEngine {
    rules: Arc<dyn RouteRuleStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<BotRegistry>,
    dedup: DedupCache,
    failures: StrikeCounter<(BotId, i64)>,
    settings: RelaySettings,
}

impl RouteEngine {
    pub fn new(
        rules: Arc<dyn RouteRuleStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<BotRegistry>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            rules,
            messages,
            registry,
            dedup: DedupCache::new(settings.dedup_window),
            failures: StrikeCounter::new(),
            settings,
        }
    }

    /// Consecutive destination failures recorded for `(bot, chat)`.
    pub fn failure_count(&self, bot_id: BotId, chat_id: i64) -> u32 {
        self.failures.count(&(bot_id, chat_id))
    }

    /// Route one event through every matching rule.
    pub async fn handle(&self, event: &DeviceMessageEvent) -> Vec<(RuleId, Delivery)> {
        let rules = match self
            .rules
            .enabled_rules_for_source(event.device_id, event.chat_id)
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                warn!(
                    device_id = %event.device_id,
                    chat_id = event.chat_id,
                    error = %e,
                    "failed to load route rules"
                );
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in &rules {
            let delivery = self.route(event, rule).await;
            metrics::counter!("courier_relay_deliveries_total", "outcome" => delivery.outcome())
                .increment(1);
            outcomes.push((rule.id, delivery));
        }
        metrics::gauge!("courier_dedup_entries").set(self.dedup.len() as f64);
        outcomes
    }

    async fn route(&self, event: &DeviceMessageEvent, rule: &RouteRule) -> Delivery {
        let key = DedupKey {
            device_id: event.device_id,
            chat_id: event.chat_id,
            message_id: event.message_id,
            rule_id: rule.id,
        };
        if !self.dedup.try_mark(key) {
            metrics::counter!("courier_relay_duplicates_total").increment(1);
            debug!(rule_id = %rule.id, message_id = event.message_id, "duplicate event skipped");
            return Delivery::Duplicate;
        }

        let config = match RuleConfig::for_rule(rule) {
            Ok(config) => config,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "rule filters or transforms are invalid");
                return Delivery::Misconfigured;
            }
        };
        if !config.filters.accepts(&event.text, event.media.is_some()) {
            return Delivery::Filtered;
        }
        let text = config.transforms.apply(&event.text);

        match self.deliver(rule, &text, event.media.as_deref()).await {
            Ok(Some(sent)) => {
                self.failures.reset(&(rule.bot_id, rule.dest_chat_id));
                debug!(
                    rule_id = %rule.id,
                    bot_id = %rule.bot_id,
                    chat_id = rule.dest_chat_id,
                    message_id = sent.message_id,
                    "relayed"
                );
                Delivery::Sent {
                    message_id: sent.message_id,
                }
            }
            Ok(None) => Delivery::Empty,
            Err(e) => {
                // A failed attempt must not block a redelivery of the same event.
                self.dedup.release(&key);
                let disabled = self.on_failure(rule, &e).await;
                Delivery::Failed {
                    error: e.to_string(),
                    disabled,
                }
            }
        }
    }

    async fn deliver(
        &self,
        rule: &RouteRule,
        text: &str,
        media: Option<&MediaPayload>,
    ) -> Result<Option<SentMessage>, CourierError> {
        self.registry.start(rule.bot_id).await?;
        if let Some(media) = media {
            let caption = Some(text).filter(|t| !t.trim().is_empty());
            let sent = self
                .registry
                .send_media(rule.bot_id, rule.dest_chat_id, media, caption)
                .await?;
            return Ok(Some(sent));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        let sent = self
            .registry
            .send_text(rule.bot_id, rule.dest_chat_id, text)
            .await?;
        Ok(Some(sent))
    }

    /// Count a failure against the destination. Returns rules disabled.
    async fn on_failure(&self, rule: &RouteRule, error: &CourierError) -> u64 {
        if !error.is_destination_failure() {
            warn!(
                rule_id = %rule.id,
                bot_id = %rule.bot_id,
                chat_id = rule.dest_chat_id,
                error = %error,
                "relay delivery failed"
            );
            return 0;
        }

        let destination = (rule.bot_id, rule.dest_chat_id);
        let strikes = self.failures.hit(destination);
        warn!(
            rule_id = %rule.id,
            bot_id = %rule.bot_id,
            chat_id = rule.dest_chat_id,
            strikes,
            threshold = self.settings.failure_threshold,
            error = %error,
            "destination rejected delivery"
        );
        if strikes < self.settings.failure_threshold {
            return 0;
        }
        self.failures.reset(&destination);

        let disabled = match self
            .rules
            .disable_by_destination(rule.bot_id, rule.dest_chat_id)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(bot_id = %rule.bot_id, chat_id = rule.dest_chat_id, error = %e, "failed to disable rules");
                0
            }
        };
        if let Err(e) = self
            .messages
            .purge_chat(rule.bot_id, rule.dest_chat_id)
            .await
        {
            warn!(bot_id = %rule.bot_id, chat_id = rule.dest_chat_id, error = %e, "failed to purge destination cache");
        }
        metrics::counter!("courier_rules_disabled_total", "reason" => "destination")
            .increment(disabled);
        info!(
            bot_id = %rule.bot_id,
            chat_id = rule.dest_chat_id,
            disabled,
            "destination unreachable, rules disabled"
        );
        disabled
    }

    /// Send `text` (or the default probe text) straight to a destination,
    /// bypassing rules, dedup, and the breaker.
    pub async fn test_route(
        &self,
        bot_id: BotId,
        dest_chat_id: i64,
        text: Option<&str>,
    ) -> Result<SentMessage, CourierError> {
        let text = text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TEST_TEXT);
        self.registry.start(bot_id).await?;
        self.registry.send_text(bot_id, dest_chat_id, text).await
    }

    /// Evict expired dedup marks and stale failure counters.
    pub fn sweep(&self) -> (usize, usize) {
        let marks = self.dedup.evict_expired();
        let strikes = self.failures.evict_stale(self.settings.strike_ttl);
        metrics::gauge!("courier_dedup_entries").set(self.dedup.len() as f64);
        (marks, strikes)
    }

    /// Process events until the channel closes or `cancel` fires. Events are
    /// handled one at a time, preserving each device's emission order.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<DeviceMessageEvent>,
        cancel: CancellationToken,
    ) {
        info!("route engine started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle(&event).await;
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("route engine stopped");
    }
}
