// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot-side chats, members, and messages.

use courier_core::CourierError;
use courier_core::types::{BotId, ChatMember, ChatRecord, StoredMessage};
use rusqlite::{Row, params, params_from_iter};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::{conversion_error, placeholders};

/// Insert or refresh a chat. Absent fields keep their stored value.
pub async fn upsert_chat(db: &Database, chat: &ChatRecord) -> Result<(), CourierError> {
    let chat = chat.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO chats (bot_id, chat_id, type, title, username, first_name, last_name)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (bot_id, chat_id) DO UPDATE SET
                         type = COALESCE(excluded.type, chats.type),
                         title = COALESCE(excluded.title, chats.title),
                         username = COALESCE(excluded.username, chats.username),
                         first_name = COALESCE(excluded.first_name, chats.first_name),
                         last_name = COALESCE(excluded.last_name, chats.last_name),
                         updated_at = {NOW}"
                ),
                params![
                    chat.bot_id.0,
                    chat.chat_id,
                    chat.kind,
                    chat.title,
                    chat.username,
                    chat.first_name,
                    chat.last_name,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_member(db: &Database, member: &ChatMember) -> Result<(), CourierError> {
    let member = member.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO chat_members
                         (bot_id, chat_id, user_id, username, first_name, last_name, is_bot, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (bot_id, chat_id, user_id) DO UPDATE SET
                         username = excluded.username,
                         first_name = excluded.first_name,
                         last_name = excluded.last_name,
                         is_bot = excluded.is_bot,
                         status = excluded.status,
                         updated_at = {NOW}"
                ),
                params![
                    member.bot_id.0,
                    member.chat_id,
                    member.user_id,
                    member.username,
                    member.first_name,
                    member.last_name,
                    member.is_bot,
                    member.status,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Returns `false` when the message was already stored.
pub async fn insert_message(db: &Database, message: &StoredMessage) -> Result<bool, CourierError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                     (bot_id, chat_id, message_id, from_user_id, text, raw, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.bot_id.0,
                    message.chat_id,
                    message.message_id,
                    message.from_user_id,
                    message.text,
                    message.raw.to_string(),
                    message.date,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRecord> {
    Ok(ChatRecord {
        bot_id: BotId(row.get(0)?),
        chat_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        username: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
    })
}

pub async fn list_chats(db: &Database, bot: BotId) -> Result<Vec<ChatRecord>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ChatRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT bot_id, chat_id, type, title, username, first_name, last_name
                 FROM chats WHERE bot_id = ?1 ORDER BY updated_at DESC, chat_id",
            )?;
            let rows = stmt.query_map(params![bot.0], chat_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_members(
    db: &Database,
    bot: BotId,
    chat_id: i64,
) -> Result<Vec<ChatMember>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ChatMember>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT bot_id, chat_id, user_id, username, first_name, last_name, is_bot, status
                 FROM chat_members WHERE bot_id = ?1 AND chat_id = ?2 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![bot.0, chat_id], |row| {
                Ok(ChatMember {
                    bot_id: BotId(row.get(0)?),
                    chat_id: row.get(1)?,
                    user_id: row.get(2)?,
                    username: row.get(3)?,
                    first_name: row.get(4)?,
                    last_name: row.get(5)?,
                    is_bot: row.get(6)?,
                    status: row.get(7)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `limit` messages of a chat, returned oldest first.
pub async fn list_messages(
    db: &Database,
    bot: BotId,
    chat_id: i64,
    limit: u32,
) -> Result<Vec<StoredMessage>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<StoredMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT bot_id, chat_id, message_id, from_user_id, text, raw, date
                 FROM messages WHERE bot_id = ?1 AND chat_id = ?2
                 ORDER BY message_id DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![bot.0, chat_id, limit], |row| {
                let raw: String = row.get(5)?;
                Ok(StoredMessage {
                    bot_id: BotId(row.get(0)?),
                    chat_id: row.get(1)?,
                    message_id: row.get(2)?,
                    from_user_id: row.get(3)?,
                    text: row.get(4)?,
                    raw: serde_json::from_str(&raw).map_err(|e| conversion_error(5, e))?,
                    date: row.get(6)?,
                })
            })?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_messages(
    db: &Database,
    bot: BotId,
    chat_id: i64,
    message_ids: &[i64],
) -> Result<u64, CourierError> {
    if message_ids.is_empty() {
        return Ok(0);
    }
    let ids = message_ids.to_vec();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let sql = format!(
                "DELETE FROM messages WHERE bot_id = ? AND chat_id = ? AND message_id IN ({})",
                placeholders(ids.len())
            );
            let values = [bot.0, chat_id].into_iter().chain(ids.iter().copied());
            let removed = conn.execute(&sql, params_from_iter(values))?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the chat, its members and its messages in one transaction.
pub async fn purge_chat(db: &Database, bot: BotId, chat_id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM messages WHERE bot_id = ?1 AND chat_id = ?2",
                params![bot.0, chat_id],
            )?;
            tx.execute(
                "DELETE FROM chat_members WHERE bot_id = ?1 AND chat_id = ?2",
                params![bot.0, chat_id],
            )?;
            tx.execute(
                "DELETE FROM chats WHERE bot_id = ?1 AND chat_id = ?2",
                params![bot.0, chat_id],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}
