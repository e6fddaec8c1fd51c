// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot-side ingestion of webhook deliveries.
//!
//! The HTTP boundary acknowledges first and hands the raw update here. Every
//! side effect (chat row, member row, message row, fan-out) is attempted on
//! its own; a failing one is logged and the rest still run.

use std::sync::Arc;

use courier_bus::{EventKind, FanoutHub, bot_room, chat_room};
use courier_core::types::{ChatMember, ChatRecord, StoredMessage};
use courier_core::{BotId, MessageStore};
use courier_telegram::BotRegistry;
use serde::Deserialize;
use serde_json::{Value, json};
use strum::{Display, IntoStaticStr};
use tracing::{debug, warn};

/// The part of an inbound update envelope the pipeline looks at.
#[derive(Debug, Default, Deserialize)]
struct UpdateEnvelope {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    channel_post: Option<Value>,
    #[serde(default)]
    edited_message: Option<Value>,
    #[serde(default)]
    edited_channel_post: Option<Value>,
    #[serde(default)]
    message_reaction: Option<Value>,
    #[serde(default)]
    poll: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    chat: WireChat,
    #[serde(default)]
    from: Option<WireUser>,
    #[serde(default)]
    date: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    pinned_message: Option<Value>,
}

impl WireMessage {
    fn body(&self) -> Option<String> {
        self.text.clone().or_else(|| self.caption.clone())
    }
}

/// What a single update turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UpdateKind {
    Message,
    ChannelPost,
    EditedMessage,
    MessageReaction,
    Poll,
    Pin,
    Unknown,
    Malformed,
}

/// Applies webhook updates to the bot-side cache and the fan-out hub.
pub struct WebhookIngestor {
    messages: Arc<dyn MessageStore>,
    hub: Arc<FanoutHub>,
    registry: Arc<BotRegistry>,
}

impl WebhookIngestor {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        hub: Arc<FanoutHub>,
        registry: Arc<BotRegistry>,
    ) -> Self {
        Self {
            messages,
            hub,
            registry,
        }
    }

    /// Process one update. Returns the kinds it contained, in handling order.
    pub async fn ingest(&self, bot_id: BotId, update: Value) -> Vec<UpdateKind> {
        let envelope: UpdateEnvelope = match serde_json::from_value(update) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%bot_id, error = %e, "unreadable webhook update");
                return self.counted(vec![UpdateKind::Malformed]);
            }
        };

        let mut kinds = Vec::new();
        if let Some(raw) = envelope.message {
            kinds.push(self.message(bot_id, raw, true).await);
        }
        if let Some(raw) = envelope.channel_post {
            kinds.push(self.message(bot_id, raw, false).await);
        }
        for raw in [envelope.edited_message, envelope.edited_channel_post]
            .into_iter()
            .flatten()
        {
            kinds.push(self.edited(bot_id, raw));
        }
        if let Some(raw) = envelope.message_reaction {
            kinds.push(self.reaction(bot_id, raw));
        }
        if let Some(raw) = envelope.poll {
            kinds.push(self.poll(bot_id, raw));
        }
        if kinds.is_empty() {
            debug!(%bot_id, "update carries nothing the relay handles");
            kinds.push(UpdateKind::Unknown);
        }
        self.counted(kinds)
    }

    fn counted(&self, kinds: Vec<UpdateKind>) -> Vec<UpdateKind> {
        for kind in &kinds {
            let label: &'static str = kind.into();
            metrics::counter!("courier_webhook_updates_total", "kind" => label).increment(1);
        }
        kinds
    }

    async fn message(&self, bot_id: BotId, raw: Value, from_member: bool) -> UpdateKind {
        let message: WireMessage = match serde_json::from_value(raw.clone()) {
            Ok(message) => message,
            Err(e) => {
                warn!(%bot_id, error = %e, "unreadable message in update");
                return UpdateKind::Malformed;
            }
        };
        let chat_id = message.chat.id;
        self.store_chat(bot_id, &message.chat).await;

        if let Some(pinned) = &message.pinned_message {
            self.hub.publish(
                &chat_room(bot_id, chat_id),
                EventKind::Pin,
                json!({ "bot_id": bot_id, "chat_id": chat_id, "message": pinned }),
            );
            return UpdateKind::Pin;
        }

        if from_member && let Some(user) = &message.from {
            self.store_member(bot_id, chat_id, user).await;
        }
        let stored = StoredMessage {
            bot_id,
            chat_id,
            message_id: message.message_id,
            from_user_id: message.from.as_ref().map(|u| u.id),
            text: message.body(),
            raw: raw.clone(),
            date: message.date,
        };
        match self.messages.insert_message(&stored).await {
            Ok(false) => debug!(%bot_id, chat_id, message_id = message.message_id, "message already stored"),
            Ok(true) => {}
            Err(e) => warn!(%bot_id, chat_id, error = %e, "failed to store message"),
        }

        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::Message,
            json!({ "bot_id": bot_id, "chat_id": chat_id, "message": raw }),
        );
        self.hub.publish(
            &bot_room(bot_id),
            EventKind::ChatUpdate,
            json!({ "bot_id": bot_id, "chat": raw["chat"] }),
        );
        if from_member {
            UpdateKind::Message
        } else {
            UpdateKind::ChannelPost
        }
    }

    async fn store_chat(&self, bot_id: BotId, chat: &WireChat) {
        let record = ChatRecord {
            bot_id,
            chat_id: chat.id,
            kind: chat.kind.clone(),
            title: chat.title.clone(),
            username: chat.username.clone(),
            first_name: chat.first_name.clone(),
            last_name: chat.last_name.clone(),
        };
        if let Err(e) = self.messages.upsert_chat(&record).await {
            warn!(%bot_id, chat_id = chat.id, error = %e, "failed to store chat");
        }
    }

    async fn store_member(&self, bot_id: BotId, chat_id: i64, user: &WireUser) {
        let member = ChatMember {
            bot_id,
            chat_id,
            user_id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_bot: user.is_bot,
            status: "member".into(),
        };
        if let Err(e) = self.messages.upsert_member(&member).await {
            warn!(%bot_id, chat_id, user_id = user.id, error = %e, "failed to store member");
        }
    }

    fn edited(&self, bot_id: BotId, raw: Value) -> UpdateKind {
        let Some(chat_id) = raw["chat"]["id"].as_i64() else {
            return UpdateKind::Malformed;
        };
        let text = raw["text"].as_str().or_else(|| raw["caption"].as_str());
        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::MessageEdit,
            json!({
                "bot_id": bot_id,
                "chat_id": chat_id,
                "message_id": raw["message_id"],
                "text": text,
            }),
        );
        UpdateKind::EditedMessage
    }

    fn reaction(&self, bot_id: BotId, raw: Value) -> UpdateKind {
        let Some(chat_id) = raw["chat"]["id"].as_i64() else {
            return UpdateKind::Malformed;
        };
        self.hub.publish(
            &chat_room(bot_id, chat_id),
            EventKind::Reaction,
            json!({
                "bot_id": bot_id,
                "chat_id": chat_id,
                "message_id": raw["message_id"],
                "reaction": raw["new_reaction"],
                "user": raw["user"],
            }),
        );
        UpdateKind::MessageReaction
    }

    fn poll(&self, bot_id: BotId, raw: Value) -> UpdateKind {
        let payload = json!({ "bot_id": bot_id, "poll": raw });
        self.hub
            .publish(&bot_room(bot_id), EventKind::PollUpdate, payload.clone());
        if let Some(origin) = raw["id"]
            .as_str()
            .and_then(|id| self.registry.poll_origin(id))
            .filter(|origin| origin.bot_id == bot_id)
        {
            self.hub.publish(
                &chat_room(bot_id, origin.chat_id),
                EventKind::PollUpdate,
                payload,
            );
        }
        UpdateKind::Poll
    }
}
