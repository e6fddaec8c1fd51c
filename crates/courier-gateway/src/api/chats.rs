// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot chats: cached history plus outbound operations through the registry.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use courier_core::BotId;
use courier_core::types::{
    BatchOutcome, ChatMember, ChatRecord, MediaKind, MediaPayload, PollRequest, SentMessage,
    StoredMessage,
};
use courier_telegram::ClearSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Ack, Paging};
use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MediaRequest {
    /// Base64 file contents.
    pub data: String,
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Sniffed from the bytes when absent.
    #[serde(default)]
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ButtonsRequest {
    pub text: String,
    /// Platform inline keyboard markup.
    pub markup: Value,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PinQuery {
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnpinQuery {
    pub message_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBatchRequest {
    pub message_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct MemberCount {
    pub chat_id: i64,
    pub count: u32,
}

fn required(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{what} is required")));
    }
    Ok(())
}

impl MediaRequest {
    fn into_payload(self) -> Result<(MediaPayload, Option<String>), ApiError> {
        let data = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ApiError::bad_request(format!("media data is not base64: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::bad_request("media data is empty"));
        }
        let kind = self.kind.unwrap_or_else(|| {
            courier_mtproto::media::classify(false, self.mime_type.as_deref(), &data)
        });
        let caption = self.caption.filter(|c| !c.trim().is_empty());
        Ok((
            MediaPayload {
                kind,
                data,
                file_name: self.file_name,
                mime_type: self.mime_type,
            },
            caption,
        ))
    }
}

// --- Cached state ---

pub async fn list(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    Ok(Json(state.messages.list_chats(BotId(id)).await?))
}

pub async fn members(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
) -> Result<Json<Vec<ChatMember>>, ApiError> {
    Ok(Json(state.messages.list_members(BotId(id), chat).await?))
}

/// GET .../messages?limit=
pub async fn messages(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Query(paging): Query<Paging>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    Ok(Json(
        state
            .messages
            .list_messages(BotId(id), chat, paging.limit())
            .await?,
    ))
}

// --- Outbound ---

/// POST .../messages: plain send, or a reply when `reply_to` is set.
pub async fn send_text(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(body): Json<TextRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    required(&body.text, "text")?;
    let bot = BotId(id);
    let sent = match body.reply_to {
        Some(reply_to) => state.registry.reply(bot, chat, reply_to, &body.text).await?,
        None => state.registry.send_text(bot, chat, &body.text).await?,
    };
    Ok(Json(sent))
}

pub async fn send_media(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(body): Json<MediaRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    let (media, caption) = body.into_payload()?;
    Ok(Json(
        state
            .registry
            .send_media(BotId(id), chat, &media, caption.as_deref())
            .await?,
    ))
}

pub async fn send_poll(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(poll): Json<PollRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    required(&poll.question, "question")?;
    if poll.options.len() < 2 {
        return Err(ApiError::bad_request("a poll needs at least two options"));
    }
    Ok(Json(state.registry.send_poll(BotId(id), chat, &poll).await?))
}

pub async fn send_buttons(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(body): Json<ButtonsRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    required(&body.text, "text")?;
    Ok(Json(
        state
            .registry
            .send_buttons(BotId(id), chat, &body.text, &body.markup)
            .await?,
    ))
}

/// PATCH .../messages/{message_id}
pub async fn edit(
    State(state): State<GatewayState>,
    Path((id, chat, message_id)): Path<(i64, i64, i32)>,
    Json(body): Json<TextRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    required(&body.text, "text")?;
    Ok(Json(
        state
            .registry
            .edit_text(BotId(id), chat, message_id, &body.text)
            .await?,
    ))
}

pub async fn delete_message(
    State(state): State<GatewayState>,
    Path((id, chat, message_id)): Path<(i64, i64, i32)>,
) -> Result<Json<Ack>, ApiError> {
    state.registry.delete(BotId(id), chat, message_id).await?;
    Ok(Json(Ack::OK))
}

/// POST .../messages/delete
pub async fn delete_batch(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(body): Json<DeleteBatchRequest>,
) -> Result<Json<Vec<BatchOutcome>>, ApiError> {
    if body.message_ids.is_empty() {
        return Err(ApiError::bad_request("message_ids is required"));
    }
    Ok(Json(
        state
            .registry
            .delete_batch(BotId(id), chat, &body.message_ids)
            .await?,
    ))
}

pub async fn react(
    State(state): State<GatewayState>,
    Path((id, chat, message_id)): Path<(i64, i64, i32)>,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<Ack>, ApiError> {
    required(&body.emoji, "emoji")?;
    state
        .registry
        .set_reaction(BotId(id), chat, message_id, &body.emoji)
        .await?;
    Ok(Json(Ack::OK))
}

/// POST .../messages/{message_id}/pin?silent=
pub async fn pin(
    State(state): State<GatewayState>,
    Path((id, chat, message_id)): Path<(i64, i64, i32)>,
    Query(query): Query<PinQuery>,
) -> Result<Json<Ack>, ApiError> {
    state
        .registry
        .pin(BotId(id), chat, message_id, query.silent)
        .await?;
    Ok(Json(Ack::OK))
}

/// DELETE .../pin?message_id=: unpin one message, or all when omitted.
pub async fn unpin(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Query(query): Query<UnpinQuery>,
) -> Result<Json<Ack>, ApiError> {
    state
        .registry
        .unpin(BotId(id), chat, query.message_id)
        .await?;
    Ok(Json(Ack::OK))
}

pub async fn set_title(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
    Json(body): Json<TitleRequest>,
) -> Result<Json<Ack>, ApiError> {
    required(&body.title, "title")?;
    state
        .registry
        .set_chat_title(BotId(id), chat, body.title.trim())
        .await?;
    Ok(Json(Ack::OK))
}

pub async fn member_count(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
) -> Result<Json<MemberCount>, ApiError> {
    let count = state.registry.member_count(BotId(id), chat).await?;
    Ok(Json(MemberCount {
        chat_id: chat,
        count,
    }))
}

/// POST .../clear: remove every cached message remotely, then locally.
pub async fn clear(
    State(state): State<GatewayState>,
    Path((id, chat)): Path<(i64, i64)>,
) -> Result<Json<ClearSummary>, ApiError> {
    Ok(Json(state.registry.clear_chat(BotId(id), chat).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_is_sniffed_when_absent() {
        let body = MediaRequest {
            data: STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            file_name: "a.jpg".into(),
            mime_type: None,
            kind: None,
            caption: Some("  ".into()),
        };
        let (media, caption) = body.into_payload().unwrap();
        assert_eq!(media.kind, MediaKind::Photo);
        assert!(caption.is_none());
    }

    #[test]
    fn declared_kind_wins() {
        let body = MediaRequest {
            data: STANDARD.encode(b"plain bytes"),
            file_name: "clip.bin".into(),
            mime_type: None,
            kind: Some(MediaKind::Video),
            caption: Some("look".into()),
        };
        let (media, caption) = body.into_payload().unwrap();
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(caption.as_deref(), Some("look"));
    }

    #[test]
    fn bad_base64_is_a_bad_request() {
        let body = MediaRequest {
            data: "%%%".into(),
            file_name: "x".into(),
            mime_type: None,
            kind: None,
            caption: None,
        };
        assert!(matches!(body.into_payload(), Err(ApiError::BadRequest(_))));
    }
}
