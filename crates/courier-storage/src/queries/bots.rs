// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot account CRUD.

use courier_core::CourierError;
use courier_core::types::{BotAccount, BotId, NewBotAccount};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, NOW, map_tr_err};

const COLUMNS: &str = "id, name, username, token, is_active, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<BotAccount> {
    Ok(BotAccount {
        id: BotId(row.get(0)?),
        name: row.get(1)?,
        username: row.get(2)?,
        token: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub async fn create_bot(db: &Database, bot: NewBotAccount) -> Result<BotAccount, CourierError> {
    db.connection()
        .call(move |conn| -> Result<BotAccount, rusqlite::Error> {
            conn.execute(
                "INSERT INTO bots (name, username, token, is_active) VALUES (?1, ?2, ?3, ?4)",
                params![bot.name, bot.username, bot.token, bot.active],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM bots WHERE id = ?1"),
                params![id],
                from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_bot(db: &Database, id: BotId) -> Result<Option<BotAccount>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<BotAccount>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM bots WHERE id = ?1"),
                params![id.0],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All bots, or only active ones when `active_only` is set. Ordered by id.
pub async fn list_bots(db: &Database, active_only: bool) -> Result<Vec<BotAccount>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<BotAccount>, rusqlite::Error> {
            let sql = if active_only {
                format!("SELECT {COLUMNS} FROM bots WHERE is_active = 1 ORDER BY id")
            } else {
                format!("SELECT {COLUMNS} FROM bots ORDER BY id")
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_bot_active(db: &Database, id: BotId, active: bool) -> Result<(), CourierError> {
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!("UPDATE bots SET is_active = ?1, updated_at = {NOW} WHERE id = ?2"),
                params![active, id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(CourierError::not_found("bot", id));
    }
    Ok(())
}

pub async fn delete_bot(db: &Database, id: BotId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM bots WHERE id = ?1", params![id.0])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
