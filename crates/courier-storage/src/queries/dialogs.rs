// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached dialog snapshot per device.
//!
//! Sync never removes rows. Dialogs missing from the latest listing are
//! flagged `deleted = 1` and reappear when a later listing includes them.

use std::str::FromStr;

use courier_core::CourierError;
use courier_core::types::{DeviceId, Dialog, DialogKind, RemoteDialog};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::{conversion_error, placeholders};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Dialog> {
    let kind: String = row.get(3)?;
    Ok(Dialog {
        device_id: DeviceId(row.get(0)?),
        peer_id: row.get(1)?,
        title: row.get(2)?,
        kind: DialogKind::from_str(&kind).map_err(|e| conversion_error(3, e))?,
        username: row.get(4)?,
        deleted: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub async fn upsert_dialog(
    db: &Database,
    device: DeviceId,
    dialog: &RemoteDialog,
) -> Result<(), CourierError> {
    let dialog = dialog.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO device_dialogs (device_id, peer_id, title, kind, username, deleted)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0)
                     ON CONFLICT (device_id, peer_id) DO UPDATE SET
                         title = excluded.title,
                         kind = excluded.kind,
                         username = excluded.username,
                         deleted = 0,
                         updated_at = {NOW}"
                ),
                params![
                    device.0,
                    dialog.peer_id,
                    dialog.title,
                    dialog.kind.to_string(),
                    dialog.username,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Soft-delete every live dialog of `device` whose peer is not in `keep`.
pub async fn mark_deleted_except(
    db: &Database,
    device: DeviceId,
    keep: &[i64],
) -> Result<u64, CourierError> {
    let keep = keep.to_vec();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = if keep.is_empty() {
                conn.execute(
                    &format!(
                        "UPDATE device_dialogs SET deleted = 1, updated_at = {NOW}
                         WHERE device_id = ?1 AND deleted = 0"
                    ),
                    params![device.0],
                )?
            } else {
                let sql = format!(
                    "UPDATE device_dialogs SET deleted = 1, updated_at = {NOW}
                     WHERE device_id = ? AND deleted = 0 AND peer_id NOT IN ({})",
                    placeholders(keep.len())
                );
                let values = std::iter::once(device.0).chain(keep.iter().copied());
                conn.execute(&sql, params_from_iter(values))?
            };
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Live dialogs ordered by title, paged with `limit`/`offset`.
pub async fn list_dialogs(
    db: &Database,
    device: DeviceId,
    limit: u32,
    offset: u32,
) -> Result<Vec<Dialog>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Dialog>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT device_id, peer_id, title, kind, username, deleted, created_at, updated_at
                 FROM device_dialogs
                 WHERE device_id = ?1 AND deleted = 0
                 ORDER BY title COLLATE NOCASE ASC, peer_id ASC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![device.0, limit, offset], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_dialogs(db: &Database, device: DeviceId) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM device_dialogs WHERE device_id = ?1 AND deleted = 0",
                params![device.0],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_sync(db: &Database, device: DeviceId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO device_dialogs_sync (device_id, synced_at) VALUES (?1, {NOW})
                     ON CONFLICT (device_id) DO UPDATE SET synced_at = excluded.synced_at"
                ),
                params![device.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn last_sync(db: &Database, device: DeviceId) -> Result<Option<String>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT synced_at FROM device_dialogs_sync WHERE device_id = ?1",
                params![device.0],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
