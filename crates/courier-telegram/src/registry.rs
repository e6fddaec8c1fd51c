// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot session registry.
//!
//! Holds at most one live [`BotApi`] client per bot account. Every outbound
//! operation goes through here so the result can be cached and fanned out.
//! Caching and fan-out are best-effort: their failures are logged and never
//! fail the send that triggered them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_bus::{EventKind, FanoutHub, bot_room, chat_room};
use courier_config::model::TelegramConfig;
use courier_core::types::{
    BatchOutcome, BatchStatus, BotAccount, ChatRecord, MediaPayload, PollRequest, SentMessage,
    StoredMessage, WebhookInfo,
};
use courier_core::{BotApi, BotApiFactory, BotId, BotStore, CourierError, MessageStore};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::media;

/// Settings the registry needs from `[telegram]`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub public_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub bulk_delay: Duration,
    pub delete_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            public_url: None,
            webhook_secret: None,
            bulk_delay: Duration::from_millis(50),
            delete_delay: Duration::from_millis(30),
        }
    }
}

impl From<&TelegramConfig> for RegistryConfig {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            public_url: config.public_url.clone(),
            webhook_secret: config.webhook_secret.clone(),
            bulk_delay: Duration::from_millis(config.bulk_delay_ms),
            delete_delay: Duration::from_millis(config.delete_delay_ms),
        }
    }
}

/// A running bot.
pub struct BotConnection {
    pub bot_id: BotId,
    pub name: String,
    pub api: Arc<dyn BotApi>,
    pub started_at: Instant,
}

/// Where a poll sent through the registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollOrigin {
    pub bot_id: BotId,
    pub chat_id: i64,
    pub message_id: i32,
}

/// Summary of [`BotRegistry::clear_chat`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub attempted: usize,
    pub deleted_remote: usize,
    pub removed_local: u64,
}

/// Registry of live bot connections.
pub struct BotRegistry {
    factory: Arc<dyn BotApiFactory>,
    bots: Arc<dyn BotStore>,
    messages: Arc<dyn MessageStore>,
    hub: Arc<FanoutHub>,
    config: RegistryConfig,
    connections: DashMap<BotId, Arc<BotConnection>>,
    polls: DashMap<String, (PollOrigin, tokio::time::Instant)>,
}

impl BotRegistry {
    pub fn new(
        factory: Arc<dyn BotApiFactory>,
        bots: Arc<dyn BotStore>,
        messages: Arc<dyn MessageStore>,
        hub: Arc<FanoutHub>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            factory,
            bots,
            messages,
            hub,
            config,
            connections: DashMap::new(),
            polls: DashMap::new(),
        }
    }

    // --- Lifecycle ---

    /// Start a live client for `bot_id`. A second call while running is a no-op.
    ///
    /// Deactivated accounts are refused with `NotRunning`; only activating
    /// the account brings them back.
    pub async fn start(&self, bot_id: BotId) -> Result<(), CourierError> {
        if self.connections.contains_key(&bot_id) {
            debug!(%bot_id, "bot already running");
            return Ok(());
        }
        let bot = self
            .bots
            .get_bot(bot_id)
            .await?
            .ok_or_else(|| CourierError::not_found("bot", bot_id))?;
        if !bot.active {
            debug!(%bot_id, "bot is deactivated, not starting");
            return Err(CourierError::not_running("bot", bot_id));
        }
        self.start_account(&bot)
    }

    fn start_account(&self, bot: &BotAccount) -> Result<(), CourierError> {
        match self.connections.entry(bot.id) {
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                let api = self.factory.connect(bot.id, &bot.token)?;
                slot.insert(Arc::new(BotConnection {
                    bot_id: bot.id,
                    name: bot.name.clone(),
                    api,
                    started_at: Instant::now(),
                }));
                info!(bot_id = %bot.id, name = %bot.name, "bot started");
                Ok(())
            }
        }
    }

    /// Stop and forget the client. Returns false when it was not running.
    pub async fn stop(&self, bot_id: BotId) -> bool {
        let Some((_, connection)) = self.connections.remove(&bot_id) else {
            return false;
        };
        if let Err(e) = connection.api.close().await {
            warn!(%bot_id, error = %e, "bot client close failed");
        }
        info!(%bot_id, "bot stopped");
        true
    }

    pub async fn restart(&self, bot_id: BotId) -> Result<(), CourierError> {
        self.stop(bot_id).await;
        self.start(bot_id).await
    }

    pub fn is_running(&self, bot_id: BotId) -> bool {
        self.connections.contains_key(&bot_id)
    }

    /// Ids of every running bot, ascending.
    pub fn running(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.connections.iter().map(|c| *c.key()).collect();
        ids.sort();
        ids
    }

    /// The live connection for `bot_id`, or `NotRunning`.
    pub fn connection(&self, bot_id: BotId) -> Result<Arc<BotConnection>, CourierError> {
        self.connections
            .get(&bot_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| CourierError::not_running("bot", bot_id))
    }

    /// Start every active bot and register its webhook. Failures are logged
    /// per bot. Returns how many bots are running afterwards.
    pub async fn ensure_all_active(&self) -> Result<usize, CourierError> {
        let active = self.bots.list_active_bots().await?;
        let webhooks = self.webhook_base().is_ok();
        if !webhooks {
            warn!("telegram.public_url or webhook_secret missing, webhook registration skipped");
        }
        for bot in &active {
            if let Err(e) = self.start_account(bot) {
                warn!(bot_id = %bot.id, error = %e, "failed to start bot");
                continue;
            }
            if webhooks && let Err(e) = self.register_delivery(bot.id).await {
                warn!(bot_id = %bot.id, error = %e, "failed to register webhook");
            }
        }
        Ok(self.connections.len())
    }

    /// Stop every running bot.
    pub async fn shutdown(&self) {
        for bot_id in self.running() {
            self.stop(bot_id).await;
        }
    }

    // --- Webhook delivery ---

    fn webhook_base(&self) -> Result<(&str, &str), CourierError> {
        let base = self
            .config
            .public_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| u.starts_with("https://"))
            .ok_or_else(|| {
                CourierError::Config("telegram.public_url is missing or not https".into())
            })?;
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CourierError::Config("telegram.webhook_secret is missing".into()))?;
        Ok((base, secret))
    }

    /// The callback URL for `bot_id`.
    pub fn webhook_url(&self, bot_id: BotId) -> Result<String, CourierError> {
        let (base, _) = self.webhook_base()?;
        Ok(format!("{base}/webhook/{bot_id}"))
    }

    /// Point the platform's inbound delivery for `bot_id` at this process,
    /// clearing any previous registration first. Returns the URL.
    pub async fn register_delivery(&self, bot_id: BotId) -> Result<String, CourierError> {
        let (base, secret) = self.webhook_base()?;
        let url = format!("{base}/webhook/{bot_id}");
        let connection = self.connection(bot_id)?;
        connection.api.delete_webhook().await?;
        connection.api.set_webhook(&url, secret).await?;
        info!(%bot_id, %url, "webhook registered");
        Ok(url)
    }

    pub async fn restart_and_register(&self, bot_id: BotId) -> Result<String, CourierError> {
        self.restart(bot_id).await?;
        self.register_delivery(bot_id).await
    }

    pub async fn webhook_info(&self, bot_id: BotId) -> Result<WebhookInfo, CourierError> {
        self.connection(bot_id)?.api.webhook_info().await
    }

    // --- Side effects ---

    /// Cache the sent message and announce it. Never fails.
    async fn record_sent(&self, bot_id: BotId, sent: &SentMessage) {
        let stored = StoredMessage {
            bot_id,
            chat_id: sent.chat_id,
            message_id: i64::from(sent.message_id),
            from_user_id: None,
            text: sent.text.clone(),
            raw: sent.raw.clone(),
            date: sent.date,
        };
        if let Err(e) = self.messages.insert_message(&stored).await {
            warn!(%bot_id, chat_id = sent.chat_id, error = %e, "failed to cache sent message");
        }
        self.hub.publish(
            &chat_room(bot_id, sent.chat_id),
            EventKind::Message,
            json!({ "bot_id": bot_id, "chat_id": sent.chat_id, "message": sent.raw }),
        );
        self.hub.publish(
            &bot_room(bot_id),
            EventKind::ChatUpdate,
            json!({ "bot_id": bot_id, "chat": { "id": sent.chat_id } }),
        );
    }

    // --- Sends ---

    pub async fn send_text(
        &self,
        bot_id: BotId,
        chat_id: i64,
        text: &str,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection.api.send_text(chat_id, text, None).await?;
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    pub async fn reply(
        &self,
        bot_id: BotId,
        chat_id: i64,
        reply_to: i32,
        text: &str,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection
            .api
            .send_text(chat_id, text, Some(reply_to))
            .await?;
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    /// Send media, downgrading oversized photos and videos to documents.
    pub async fn send_media(
        &self,
        bot_id: BotId,
        chat_id: i64,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let media = media::fit_for_upload(media);
        let sent = connection.api.send_media(chat_id, &media, caption).await?;
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    pub async fn send_poll(
        &self,
        bot_id: BotId,
        chat_id: i64,
        poll: &PollRequest,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection.api.send_poll(chat_id, poll).await?;
        if let Some(poll_id) = sent.raw["poll"]["id"].as_str() {
            let origin = PollOrigin {
                bot_id,
                chat_id,
                message_id: sent.message_id,
            };
            self.polls
                .insert(poll_id.to_string(), (origin, tokio::time::Instant::now()));
        }
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    /// Where a poll sent through this registry was posted.
    pub fn poll_origin(&self, poll_id: &str) -> Option<PollOrigin> {
        self.polls.get(poll_id).map(|p| p.value().0)
    }

    /// Forget polls sent more than `ttl` ago. Returns how many were dropped.
    pub fn prune_polls(&self, ttl: Duration) -> usize {
        let now = tokio::time::Instant::now();
        let before = self.polls.len();
        self.polls
            .retain(|_, (_, sent_at)| now.duration_since(*sent_at) < ttl);
        before.saturating_sub(self.polls.len())
    }

    pub async fn send_buttons(
        &self,
        bot_id: BotId,
        chat_id: i64,
        text: &str,
        markup: &serde_json::Value,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection.api.send_buttons(chat_id, text, markup).await?;
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    pub async fn set_reaction(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_id: i32,
        emoji: &str,
    ) -> Result<(), CourierError> {
        let connection = self.connection(bot_id)?;
        connection.api.set_reaction(chat_id, message_id, emoji).await?;
        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::Reaction,
            json!({
                "bot_id": bot_id,
                "chat_id": chat_id,
                "message_id": message_id,
                "emoji": emoji,
            }),
        );
        Ok(())
    }

    pub async fn edit_text(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection.api.edit_text(chat_id, message_id, text).await?;
        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::MessageEdit,
            json!({
                "bot_id": bot_id,
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
            }),
        );
        Ok(sent)
    }

    pub async fn pin(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_id: i32,
        silent: bool,
    ) -> Result<(), CourierError> {
        let connection = self.connection(bot_id)?;
        connection.api.pin(chat_id, message_id, silent).await?;
        self.publish_pin(bot_id, chat_id, Some(message_id), true);
        Ok(())
    }

    pub async fn unpin(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_id: Option<i32>,
    ) -> Result<(), CourierError> {
        let connection = self.connection(bot_id)?;
        connection.api.unpin(chat_id, message_id).await?;
        self.publish_pin(bot_id, chat_id, message_id, false);
        Ok(())
    }

    fn publish_pin(&self, bot_id: BotId, chat_id: i64, message_id: Option<i32>, pinned: bool) {
        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::Pin,
            json!({
                "bot_id": bot_id,
                "chat_id": chat_id,
                "message_id": message_id,
                "pinned": pinned,
            }),
        );
    }

    pub async fn forward(
        &self,
        bot_id: BotId,
        from_chat: i64,
        message_id: i32,
        to_chat: i64,
    ) -> Result<SentMessage, CourierError> {
        let connection = self.connection(bot_id)?;
        let sent = connection.api.forward(to_chat, from_chat, message_id).await?;
        self.record_sent(bot_id, &sent).await;
        Ok(sent)
    }

    pub async fn delete(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_id: i32,
    ) -> Result<(), CourierError> {
        let connection = self.connection(bot_id)?;
        connection.api.delete(chat_id, message_id).await?;
        if let Err(e) = self
            .messages
            .delete_messages(bot_id, chat_id, &[i64::from(message_id)])
            .await
        {
            warn!(%bot_id, chat_id, message_id, error = %e, "failed to drop cached message");
        }
        Ok(())
    }

    pub async fn set_chat_title(
        &self,
        bot_id: BotId,
        chat_id: i64,
        title: &str,
    ) -> Result<(), CourierError> {
        let connection = self.connection(bot_id)?;
        connection.api.set_chat_title(chat_id, title).await?;
        let chat = ChatRecord {
            bot_id,
            chat_id,
            kind: None,
            title: Some(title.to_string()),
            username: None,
            first_name: None,
            last_name: None,
        };
        if let Err(e) = self.messages.upsert_chat(&chat).await {
            warn!(%bot_id, chat_id, error = %e, "failed to cache chat title");
        }
        self.hub.publish(
            &bot_room(bot_id),
            EventKind::ChatUpdate,
            json!({ "bot_id": bot_id, "chat": { "id": chat_id, "title": title } }),
        );
        Ok(())
    }

    pub async fn member_count(&self, bot_id: BotId, chat_id: i64) -> Result<u32, CourierError> {
        self.connection(bot_id)?.api.member_count(chat_id).await
    }

    /// Delete every cached message of a chat on the platform, then drop the
    /// cached copies. Remote failures are counted, not returned.
    pub async fn clear_chat(
        &self,
        bot_id: BotId,
        chat_id: i64,
    ) -> Result<ClearSummary, CourierError> {
        let connection = self.connection(bot_id)?;
        let cached = self
            .messages
            .list_messages(bot_id, chat_id, u32::MAX)
            .await?;
        let ids: Vec<i64> = cached.iter().map(|m| m.message_id).collect();

        let mut summary = ClearSummary {
            attempted: ids.len(),
            ..Default::default()
        };
        for (i, id) in ids.iter().enumerate() {
            let Ok(message_id) = i32::try_from(*id) else {
                continue;
            };
            match connection.api.delete(chat_id, message_id).await {
                Ok(()) => summary.deleted_remote += 1,
                Err(e) => debug!(%bot_id, chat_id, message_id, error = %e, "remote delete failed"),
            }
            if i + 1 < ids.len() {
                tokio::time::sleep(self.config.delete_delay).await;
            }
        }
        summary.removed_local = self.messages.delete_messages(bot_id, chat_id, &ids).await?;
        info!(%bot_id, chat_id, ?summary, "chat cleared");
        Ok(summary)
    }

    // --- Batches ---

    /// Send `text` to each target in turn, spaced by the bulk delay.
    pub async fn send_bulk(
        &self,
        bot_id: BotId,
        targets: &[i64],
        text: &str,
    ) -> Result<Vec<BatchOutcome>, CourierError> {
        let connection = self.connection(bot_id)?;
        let mut outcomes = Vec::with_capacity(targets.len());
        for (i, &chat_id) in targets.iter().enumerate() {
            match connection.api.send_text(chat_id, text, None).await {
                Ok(sent) => {
                    self.record_sent(bot_id, &sent).await;
                    outcomes.push(BatchOutcome::sent(chat_id, Some(sent.message_id)));
                }
                Err(e) => outcomes.push(BatchOutcome::failed(chat_id, e)),
            }
            if i + 1 < targets.len() {
                tokio::time::sleep(self.config.bulk_delay).await;
            }
        }
        Ok(outcomes)
    }

    /// Forward one message to each target in turn, spaced by the bulk delay.
    pub async fn forward_batch(
        &self,
        bot_id: BotId,
        from_chat: i64,
        message_id: i32,
        targets: &[i64],
    ) -> Result<Vec<BatchOutcome>, CourierError> {
        let connection = self.connection(bot_id)?;
        let mut outcomes = Vec::with_capacity(targets.len());
        for (i, &to_chat) in targets.iter().enumerate() {
            match connection.api.forward(to_chat, from_chat, message_id).await {
                Ok(sent) => {
                    self.record_sent(bot_id, &sent).await;
                    outcomes.push(BatchOutcome::sent(to_chat, Some(sent.message_id)));
                }
                Err(e) => outcomes.push(BatchOutcome::failed(to_chat, e)),
            }
            if i + 1 < targets.len() {
                tokio::time::sleep(self.config.bulk_delay).await;
            }
        }
        Ok(outcomes)
    }

    /// Delete several messages of one chat, spaced by the delete delay.
    pub async fn delete_batch(
        &self,
        bot_id: BotId,
        chat_id: i64,
        message_ids: &[i32],
    ) -> Result<Vec<BatchOutcome>, CourierError> {
        let connection = self.connection(bot_id)?;
        let mut outcomes = Vec::with_capacity(message_ids.len());
        let mut deleted = Vec::new();
        for (i, &message_id) in message_ids.iter().enumerate() {
            let outcome = match connection.api.delete(chat_id, message_id).await {
                Ok(()) => {
                    deleted.push(i64::from(message_id));
                    BatchOutcome::sent(chat_id, Some(message_id))
                }
                Err(e) => BatchOutcome {
                    chat_id,
                    status: BatchStatus::Failed,
                    message_id: Some(message_id),
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
            if i + 1 < message_ids.len() {
                tokio::time::sleep(self.config.delete_delay).await;
            }
        }
        if let Err(e) = self.messages.delete_messages(bot_id, chat_id, &deleted).await {
            warn!(%bot_id, chat_id, error = %e, "failed to drop cached messages");
        }
        Ok(outcomes)
    }
}
