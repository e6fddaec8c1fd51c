// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording [`BotApi`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use courier_core::types::{MediaKind, MediaPayload, PollRequest, SentMessage, WebhookInfo};
use courier_core::{BotApi, BotApiFactory, BotId, CourierError};

/// A call observed by [`MockBotApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum BotCall {
    SendText {
        chat_id: i64,
        text: String,
        reply_to: Option<i32>,
    },
    SendMedia {
        chat_id: i64,
        kind: MediaKind,
        bytes: usize,
        caption: Option<String>,
    },
    SendPoll {
        chat_id: i64,
        question: String,
    },
    SendButtons {
        chat_id: i64,
        text: String,
    },
    SetReaction {
        chat_id: i64,
        message_id: i32,
        emoji: String,
    },
    EditText {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Pin {
        chat_id: i64,
        message_id: i32,
    },
    Unpin {
        chat_id: i64,
        message_id: Option<i32>,
    },
    Forward {
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    SetChatTitle {
        chat_id: i64,
        title: String,
    },
    SetWebhook {
        url: String,
        secret: String,
    },
    DeleteWebhook,
    Close,
}

/// A bot client that records every call and answers with synthetic messages.
///
/// Failures are scripted per chat: every call addressed to a failing chat
/// returns the given platform error text, classified the same way a real
/// client would classify it.
pub struct MockBotApi {
    bot_id: BotId,
    calls: Arc<Mutex<Vec<BotCall>>>,
    failures: Arc<Mutex<HashMap<i64, String>>>,
    next_message_id: AtomicI32,
    member_count: AtomicUsize,
    webhook_url: Arc<Mutex<String>>,
}

impl MockBotApi {
    pub fn new(bot_id: BotId) -> Self {
        Self {
            bot_id,
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            next_message_id: AtomicI32::new(100),
            member_count: AtomicUsize::new(1),
            webhook_url: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    /// Every call addressed to `chat_id` fails with `message` from now on.
    pub async fn fail_chat(&self, chat_id: i64, message: &str) {
        self.failures
            .lock()
            .await
            .insert(chat_id, message.to_string());
    }

    pub async fn heal_chat(&self, chat_id: i64) {
        self.failures.lock().await.remove(&chat_id);
    }

    pub fn set_member_count(&self, count: usize) {
        self.member_count.store(count, Ordering::SeqCst);
    }

    /// All recorded calls in order.
    pub async fn calls(&self) -> Vec<BotCall> {
        self.calls.lock().await.clone()
    }

    /// `(chat_id, text)` of every recorded text send.
    pub async fn sent_texts(&self) -> Vec<(i64, String)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                BotCall::SendText { chat_id, text, .. } => Some((*chat_id, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded sends (text, media, poll, buttons, forwards).
    pub async fn send_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    BotCall::SendText { .. }
                        | BotCall::SendMedia { .. }
                        | BotCall::SendPoll { .. }
                        | BotCall::SendButtons { .. }
                        | BotCall::Forward { .. }
                )
            })
            .count()
    }

    async fn record(&self, call: BotCall, chat_id: Option<i64>) -> Result<(), CourierError> {
        self.calls.lock().await.push(call);
        if let Some(chat_id) = chat_id
            && let Some(message) = self.failures.lock().await.get(&chat_id)
        {
            return Err(CourierError::classify_platform(message.clone(), None));
        }
        Ok(())
    }

    fn message(&self, chat_id: i64, text: Option<&str>, extra: Value) -> SentMessage {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let mut raw = json!({
            "message_id": message_id,
            "chat": {"id": chat_id, "type": "private"},
            "date": 1_700_000_000,
        });
        if let Some(text) = text {
            raw["text"] = json!(text);
        }
        if let (Some(raw), Value::Object(extra)) = (raw.as_object_mut(), extra) {
            raw.extend(extra);
        }
        SentMessage {
            chat_id,
            message_id,
            date: 1_700_000_000,
            text: text.map(str::to_string),
            raw,
        }
    }
}

#[async_trait]
impl BotApi for MockBotApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::SendText {
                chat_id,
                text: text.to_string(),
                reply_to,
            },
            Some(chat_id),
        )
        .await?;
        Ok(self.message(chat_id, Some(text), Value::Null))
    }

    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::SendMedia {
                chat_id,
                kind: media.kind,
                bytes: media.data.len(),
                caption: caption.map(str::to_string),
            },
            Some(chat_id),
        )
        .await?;
        Ok(self.message(chat_id, caption, json!({"media_kind": media.kind.to_string()})))
    }

    async fn send_poll(
        &self,
        chat_id: i64,
        poll: &PollRequest,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::SendPoll {
                chat_id,
                question: poll.question.clone(),
            },
            Some(chat_id),
        )
        .await?;
        let poll_id = format!("poll-{}", self.next_message_id.load(Ordering::SeqCst));
        Ok(self.message(
            chat_id,
            None,
            json!({"poll": {"id": poll_id, "question": poll.question}}),
        ))
    }

    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        markup: &Value,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::SendButtons {
                chat_id,
                text: text.to_string(),
            },
            Some(chat_id),
        )
        .await?;
        Ok(self.message(chat_id, Some(text), json!({"reply_markup": markup})))
    }

    async fn set_reaction(
        &self,
        chat_id: i64,
        message_id: i32,
        emoji: &str,
    ) -> Result<(), CourierError> {
        self.record(
            BotCall::SetReaction {
                chat_id,
                message_id,
                emoji: emoji.to_string(),
            },
            Some(chat_id),
        )
        .await
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::EditText {
                chat_id,
                message_id,
                text: text.to_string(),
            },
            Some(chat_id),
        )
        .await?;
        Ok(SentMessage {
            chat_id,
            message_id,
            date: 1_700_000_000,
            text: Some(text.to_string()),
            raw: json!({"message_id": message_id, "chat": {"id": chat_id}, "text": text}),
        })
    }

    async fn pin(&self, chat_id: i64, message_id: i32, _silent: bool) -> Result<(), CourierError> {
        self.record(BotCall::Pin { chat_id, message_id }, Some(chat_id))
            .await
    }

    async fn unpin(&self, chat_id: i64, message_id: Option<i32>) -> Result<(), CourierError> {
        self.record(BotCall::Unpin { chat_id, message_id }, Some(chat_id))
            .await
    }

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<SentMessage, CourierError> {
        self.record(
            BotCall::Forward {
                to_chat,
                from_chat,
                message_id,
            },
            Some(to_chat),
        )
        .await?;
        Ok(self.message(
            to_chat,
            None,
            json!({"forward_origin": {"chat": {"id": from_chat}, "message_id": message_id}}),
        ))
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), CourierError> {
        self.record(BotCall::Delete { chat_id, message_id }, Some(chat_id))
            .await
    }

    async fn set_chat_title(&self, chat_id: i64, title: &str) -> Result<(), CourierError> {
        self.record(
            BotCall::SetChatTitle {
                chat_id,
                title: title.to_string(),
            },
            Some(chat_id),
        )
        .await
    }

    async fn member_count(&self, chat_id: i64) -> Result<u32, CourierError> {
        if let Some(message) = self.failures.lock().await.get(&chat_id) {
            return Err(CourierError::classify_platform(message.clone(), None));
        }
        Ok(u32::try_from(self.member_count.load(Ordering::SeqCst)).unwrap_or(u32::MAX))
    }

    async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), CourierError> {
        self.record(
            BotCall::SetWebhook {
                url: url.to_string(),
                secret: secret.to_string(),
            },
            None,
        )
        .await?;
        *self.webhook_url.lock().await = url.to_string();
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), CourierError> {
        self.record(BotCall::DeleteWebhook, None).await?;
        self.webhook_url.lock().await.clear();
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookInfo, CourierError> {
        Ok(WebhookInfo {
            url: self.webhook_url.lock().await.clone(),
            pending_update_count: 0,
            last_error_message: None,
        })
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.record(BotCall::Close, None).await
    }
}

/// Hands out one shared [`MockBotApi`] per bot id.
#[derive(Default)]
pub struct MockBotFactory {
    apis: StdMutex<HashMap<BotId, Arc<MockBotApi>>>,
    connects: AtomicUsize,
}

impl MockBotFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client for `bot_id`, created on first use.
    pub fn api(&self, bot_id: BotId) -> Arc<MockBotApi> {
        let mut apis = self.apis.lock().unwrap_or_else(|e| e.into_inner());
        apis.entry(bot_id)
            .or_insert_with(|| Arc::new(MockBotApi::new(bot_id)))
            .clone()
    }

    /// How many times `connect` was called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl BotApiFactory for MockBotFactory {
    fn connect(&self, bot_id: BotId, token: &str) -> Result<Arc<dyn BotApi>, CourierError> {
        if token.is_empty() {
            return Err(CourierError::Config(format!("bot {bot_id} has an empty token")));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.api(bot_id))
    }
}
