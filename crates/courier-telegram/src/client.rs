// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`BotApi`] over the Telegram Bot API via teloxide.
//!
//! The client is stateless apart from the token: no polling loop runs here,
//! inbound updates arrive through the webhook route instead.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::types::{MediaKind, MediaPayload, PollRequest, SentMessage, WebhookInfo};
use courier_core::{BotApi, BotApiFactory, BotId, CourierError};
use serde_json::Value;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InputFile, InputPollOption, MessageId, ReactionType, ReplyMarkup, ReplyParameters,
};
use tracing::debug;

fn platform_err(e: RequestError) -> CourierError {
    CourierError::classify_platform(e.to_string(), Some(Box::new(e)))
}

/// Normalize a platform message into a [`SentMessage`].
pub(crate) fn sent_message(msg: &Message) -> SentMessage {
    SentMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        date: msg.date.timestamp(),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        raw: serde_json::to_value(msg).unwrap_or(Value::Null),
    }
}

/// One bot token's outbound client.
pub struct TeloxideBotApi {
    bot_id: BotId,
    bot: Bot,
}

impl TeloxideBotApi {
    pub fn new(bot_id: BotId, token: &str) -> Self {
        Self {
            bot_id,
            bot: Bot::new(token),
        }
    }

    /// The underlying teloxide bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl BotApi for TeloxideBotApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<SentMessage, CourierError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        let msg = request.await.map_err(platform_err)?;
        Ok(sent_message(&msg))
    }

    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SentMessage, CourierError> {
        let file = InputFile::memory(media.data.clone()).file_name(media.file_name.clone());
        let chat = ChatId(chat_id);
        let result = match media.kind {
            MediaKind::Photo => {
                let mut request = self.bot.send_photo(chat, file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                request.await
            }
            MediaKind::Video => {
                let mut request = self.bot.send_video(chat, file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                request.await
            }
            MediaKind::Document => {
                let mut request = self.bot.send_document(chat, file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                request.await
            }
        };
        let msg = result.map_err(platform_err)?;
        debug!(bot_id = %self.bot_id, chat_id, kind = %media.kind, "media sent");
        Ok(sent_message(&msg))
    }

    async fn send_poll(
        &self,
        chat_id: i64,
        poll: &PollRequest,
    ) -> Result<SentMessage, CourierError> {
        let options = poll
            .options
            .iter()
            .map(|o| InputPollOption::new(o.clone()))
            .collect::<Vec<_>>();
        let mut request = self
            .bot
            .send_poll(ChatId(chat_id), poll.question.clone(), options);
        if let Some(anonymous) = poll.is_anonymous {
            request = request.is_anonymous(anonymous);
        }
        if let Some(multiple) = poll.allows_multiple_answers {
            request = request.allows_multiple_answers(multiple);
        }
        let msg = request.await.map_err(platform_err)?;
        Ok(sent_message(&msg))
    }

    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        markup: &Value,
    ) -> Result<SentMessage, CourierError> {
        let markup: ReplyMarkup =
            serde_json::from_value(markup.clone()).map_err(|e| CourierError::Platform {
                message: format!("invalid reply_markup: {e}"),
                source: Some(Box::new(e)),
            })?;
        let msg = self
            .bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(markup)
            .await
            .map_err(platform_err)?;
        Ok(sent_message(&msg))
    }

    async fn set_reaction(
        &self,
        chat_id: i64,
        message_id: i32,
        emoji: &str,
    ) -> Result<(), CourierError> {
        self.bot
            .set_message_reaction(ChatId(chat_id), MessageId(message_id))
            .reaction(vec![ReactionType::Emoji {
                emoji: emoji.to_string(),
            }])
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<SentMessage, CourierError> {
        let msg = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await
            .map_err(platform_err)?;
        Ok(sent_message(&msg))
    }

    async fn pin(&self, chat_id: i64, message_id: i32, silent: bool) -> Result<(), CourierError> {
        self.bot
            .pin_chat_message(ChatId(chat_id), MessageId(message_id))
            .disable_notification(silent)
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    async fn unpin(&self, chat_id: i64, message_id: Option<i32>) -> Result<(), CourierError> {
        let mut request = self.bot.unpin_chat_message(ChatId(chat_id));
        if let Some(message_id) = message_id {
            request = request.message_id(MessageId(message_id));
        }
        request.await.map_err(platform_err)?;
        Ok(())
    }

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<SentMessage, CourierError> {
        let msg = self
            .bot
            .forward_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id))
            .await
            .map_err(platform_err)?;
        Ok(sent_message(&msg))
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), CourierError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    async fn set_chat_title(&self, chat_id: i64, title: &str) -> Result<(), CourierError> {
        self.bot
            .set_chat_title(ChatId(chat_id), title)
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    async fn member_count(&self, chat_id: i64) -> Result<u32, CourierError> {
        self.bot
            .get_chat_member_count(ChatId(chat_id))
            .await
            .map_err(platform_err)
    }

    async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), CourierError> {
        let url = url::Url::parse(url)
            .map_err(|e| CourierError::Config(format!("invalid webhook url {url}: {e}")))?;
        self.bot
            .set_webhook(url)
            .secret_token(secret.to_string())
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), CourierError> {
        self.bot.delete_webhook().await.map_err(platform_err)?;
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookInfo, CourierError> {
        let info = self.bot.get_webhook_info().await.map_err(platform_err)?;
        let json = serde_json::to_value(&info)
            .map_err(|e| CourierError::Internal(format!("unreadable webhook info: {e}")))?;
        Ok(WebhookInfo {
            url: json["url"].as_str().unwrap_or_default().to_string(),
            pending_update_count: json["pending_update_count"]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            last_error_message: json["last_error_message"].as_str().map(str::to_string),
        })
    }

    async fn close(&self) -> Result<(), CourierError> {
        // Bot API clients hold no session; dropping the handle is enough.
        debug!(bot_id = %self.bot_id, "bot client released");
        Ok(())
    }
}

/// Builds [`TeloxideBotApi`] clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeloxideFactory;

impl BotApiFactory for TeloxideFactory {
    fn connect(&self, bot_id: BotId, token: &str) -> Result<Arc<dyn BotApi>, CourierError> {
        if token.trim().is_empty() {
            return Err(CourierError::Config(format!("bot {bot_id} has an empty token")));
        }
        Ok(Arc::new(TeloxideBotApi::new(bot_id, token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_empty_token() {
        assert!(matches!(
            TeloxideFactory.connect(BotId(1), "  "),
            Err(CourierError::Config(_))
        ));
    }

    #[test]
    fn factory_builds_client() {
        assert!(
            TeloxideFactory
                .connect(BotId(1), "123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11")
                .is_ok()
        );
    }

    #[tokio::test]
    async fn invalid_webhook_url_is_a_configuration_error() {
        let api = TeloxideBotApi::new(BotId(1), "123456:token");
        let err = api.set_webhook("not a url", "secret").await.unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }
}
