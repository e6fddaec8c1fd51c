// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device rows and status transitions.
//!
//! A revoked device is terminal: none of the updates here move it back to
//! another status.

use std::str::FromStr;

use courier_core::CourierError;
use courier_core::types::{AccountProfile, Device, DeviceId, DeviceStatus};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::conversion_error;

const COLUMNS: &str =
    "id, phone, status, username, display_name, last_seen_at, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    let status: String = row.get(2)?;
    Ok(Device {
        id: DeviceId(row.get(0)?),
        phone: row.get(1)?,
        status: DeviceStatus::from_str(&status).map_err(|e| conversion_error(2, e))?,
        username: row.get(3)?,
        display_name: row.get(4)?,
        last_seen_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub async fn create_pending(db: &Database, phone: &str) -> Result<DeviceId, CourierError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<DeviceId, rusqlite::Error> {
            conn.execute(
                "INSERT INTO devices (phone, status) VALUES (?1, 'pending')",
                params![phone],
            )?;
            Ok(DeviceId(conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_active(
    db: &Database,
    id: DeviceId,
    profile: &AccountProfile,
) -> Result<(), CourierError> {
    let username = profile.username.clone();
    let display_name = profile.display_name.clone();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE devices
                     SET status = 'active', username = ?1, display_name = ?2,
                         last_seen_at = {NOW}, updated_at = {NOW}
                     WHERE id = ?3 AND status != 'revoked'"
                ),
                params![username, display_name, id.0],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(CourierError::not_found("device", id));
    }
    Ok(())
}

async fn set_status(db: &Database, id: DeviceId, status: DeviceStatus) -> Result<(), CourierError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE devices SET status = ?1, updated_at = {NOW}
                     WHERE id = ?2 AND status != 'revoked'"
                ),
                params![status, id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_inactive(db: &Database, id: DeviceId) -> Result<(), CourierError> {
    set_status(db, id, DeviceStatus::Inactive).await
}

pub async fn mark_revoked(db: &Database, id: DeviceId) -> Result<(), CourierError> {
    set_status(db, id, DeviceStatus::Revoked).await
}

pub async fn touch_last_seen(db: &Database, id: DeviceId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!("UPDATE devices SET last_seen_at = {NOW} WHERE id = ?1"),
                params![id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_device(db: &Database, id: DeviceId) -> Result<Option<Device>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<Device>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM devices WHERE id = ?1"),
                params![id.0],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_devices(db: &Database) -> Result<Vec<Device>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<Device>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM devices ORDER BY id"))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes the device row. Session rows go with it via `ON DELETE CASCADE`;
/// cached dialogs are removed explicitly.
pub async fn delete_device(db: &Database, id: DeviceId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM device_dialogs WHERE device_id = ?1", params![id.0])?;
            tx.execute("DELETE FROM device_dialogs_sync WHERE device_id = ?1", params![id.0])?;
            tx.execute("DELETE FROM devices WHERE id = ?1", params![id.0])?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}
