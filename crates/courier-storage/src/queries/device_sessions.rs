// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted device session blobs.

use courier_core::CourierError;
use courier_core::types::{DeviceId, DeviceSessionRecord};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, NOW, map_tr_err};

/// Replace the primary blob for `device`, inserting a row when none exists.
pub async fn upsert_primary(db: &Database, device: DeviceId, blob: &str) -> Result<(), CourierError> {
    let blob = blob.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                &format!(
                    "UPDATE device_sessions SET session_blob = ?1, updated_at = {NOW}
                     WHERE device_id = ?2 AND is_primary = 1"
                ),
                params![blob, device.0],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO device_sessions (device_id, session_blob, is_primary)
                     VALUES (?1, ?2, 1)",
                    params![device.0, blob],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn primary_session(
    db: &Database,
    device: DeviceId,
) -> Result<Option<DeviceSessionRecord>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<DeviceSessionRecord>, rusqlite::Error> {
            conn.query_row(
                "SELECT device_id, session_blob, is_primary, updated_at
                 FROM device_sessions WHERE device_id = ?1 AND is_primary = 1",
                params![device.0],
                |row| {
                    Ok(DeviceSessionRecord {
                        device_id: DeviceId(row.get(0)?),
                        session_blob: row.get(1)?,
                        is_primary: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_sessions(db: &Database, device: DeviceId) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "DELETE FROM device_sessions WHERE device_id = ?1",
                params![device.0],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
