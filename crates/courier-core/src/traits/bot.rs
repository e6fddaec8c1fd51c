// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound bot protocol boundary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{BotId, MediaPayload, PollRequest, SentMessage, WebhookInfo};

/// A live outbound client bound to one bot token.
///
/// Implementations classify platform failures with
/// [`CourierError::classify_platform`] so the relay can tell permanent
/// destination failures apart from everything else.
#[async_trait]
pub trait BotApi: Send + Sync + 'static {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<SentMessage, CourierError>;

    /// Sends a photo, video, or document according to `media.kind`.
    async fn send_media(
        &self,
        chat_id: i64,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<SentMessage, CourierError>;

    async fn send_poll(&self, chat_id: i64, poll: &PollRequest)
    -> Result<SentMessage, CourierError>;

    /// Sends text with an inline keyboard given as platform `reply_markup` JSON.
    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        markup: &serde_json::Value,
    ) -> Result<SentMessage, CourierError>;

    async fn set_reaction(
        &self,
        chat_id: i64,
        message_id: i32,
        emoji: &str,
    ) -> Result<(), CourierError>;

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<SentMessage, CourierError>;

    async fn pin(&self, chat_id: i64, message_id: i32, silent: bool) -> Result<(), CourierError>;

    /// Unpins one message, or the most recent pin when `message_id` is `None`.
    async fn unpin(&self, chat_id: i64, message_id: Option<i32>) -> Result<(), CourierError>;

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<SentMessage, CourierError>;

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), CourierError>;

    async fn set_chat_title(&self, chat_id: i64, title: &str) -> Result<(), CourierError>;

    async fn member_count(&self, chat_id: i64) -> Result<u32, CourierError>;

    async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), CourierError>;

    async fn delete_webhook(&self) -> Result<(), CourierError>;

    async fn webhook_info(&self) -> Result<WebhookInfo, CourierError>;

    /// Releases the client. Best-effort.
    async fn close(&self) -> Result<(), CourierError>;
}

/// Builds [`BotApi`] clients from tokens.
pub trait BotApiFactory: Send + Sync + 'static {
    fn connect(&self, bot_id: BotId, token: &str) -> Result<Arc<dyn BotApi>, CourierError>;
}
