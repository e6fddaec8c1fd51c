// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route rule CRUD and the bulk disable operations used by the relay's
//! circuit breaker and dialog audit.

use courier_core::CourierError;
use courier_core::types::{BotId, DeviceId, NewRouteRule, RouteRule, RouteRulePatch, RuleId};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::conversion_error;

const COLUMNS: &str = "id, device_id, source_chat_id, bot_id, dest_chat_id, title, \
                       filters_json, transforms_json, enabled, created_at, updated_at";

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn to_json(value: &Option<Value>) -> Option<String> {
    value
        .as_ref()
        .filter(|v| !v.is_null())
        .map(Value::to_string)
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<RouteRule> {
    Ok(RouteRule {
        id: RuleId(row.get(0)?),
        device_id: DeviceId(row.get(1)?),
        source_chat_id: row.get(2)?,
        bot_id: BotId(row.get(3)?),
        dest_chat_id: row.get(4)?,
        title: row.get(5)?,
        filters: json_column(row, 6)?,
        transforms: json_column(row, 7)?,
        enabled: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn select_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<RouteRule>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM route_rules WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

pub async fn create_rule(db: &Database, rule: NewRouteRule) -> Result<RouteRule, CourierError> {
    db.connection()
        .call(move |conn| -> Result<RouteRule, rusqlite::Error> {
            conn.execute(
                "INSERT INTO route_rules
                     (device_id, source_chat_id, bot_id, dest_chat_id, title,
                      filters_json, transforms_json, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    rule.device_id.0,
                    rule.source_chat_id,
                    rule.bot_id.0,
                    rule.dest_chat_id,
                    rule.title,
                    to_json(&rule.filters),
                    to_json(&rule.transforms),
                    rule.enabled.unwrap_or(true),
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_rule(db: &Database, id: RuleId) -> Result<Option<RouteRule>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<RouteRule>, rusqlite::Error> {
            select_by_id(conn, id.0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_rules_by_device(
    db: &Database,
    device: DeviceId,
) -> Result<Vec<RouteRule>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<RouteRule>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM route_rules WHERE device_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![device.0], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn enabled_rules_for_source(
    db: &Database,
    device: DeviceId,
    chat_id: i64,
) -> Result<Vec<RouteRule>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Vec<RouteRule>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM route_rules
                 WHERE device_id = ?1 AND source_chat_id = ?2 AND enabled = 1
                 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![device.0, chat_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply `patch` to rule `id`. Returns the updated rule, or `None` if the
/// rule does not exist.
pub async fn update_rule(
    db: &Database,
    id: RuleId,
    patch: RouteRulePatch,
) -> Result<Option<RouteRule>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<RouteRule>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(current) = select_by_id(&tx, id.0)? else {
                return Ok(None);
            };

            let filters = patch.filters.or(current.filters);
            let transforms = patch.transforms.or(current.transforms);
            tx.execute(
                &format!(
                    "UPDATE route_rules SET
                         source_chat_id = ?1, bot_id = ?2, dest_chat_id = ?3, title = ?4,
                         filters_json = ?5, transforms_json = ?6, enabled = ?7,
                         updated_at = {NOW}
                     WHERE id = ?8"
                ),
                params![
                    patch.source_chat_id.unwrap_or(current.source_chat_id),
                    patch.bot_id.unwrap_or(current.bot_id).0,
                    patch.dest_chat_id.unwrap_or(current.dest_chat_id),
                    patch.title.or(current.title),
                    to_json(&filters),
                    to_json(&transforms),
                    patch.enabled.unwrap_or(current.enabled),
                    id.0,
                ],
            )?;
            let updated = select_by_id(&tx, id.0)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_rule(db: &Database, id: RuleId) -> Result<bool, CourierError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = conn.execute("DELETE FROM route_rules WHERE id = ?1", params![id.0])?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn disable_by_destination(
    db: &Database,
    bot: BotId,
    dest_chat_id: i64,
) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE route_rules SET enabled = 0, updated_at = {NOW}
                     WHERE bot_id = ?1 AND dest_chat_id = ?2 AND enabled = 1"
                ),
                params![bot.0, dest_chat_id],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn disable_by_source(
    db: &Database,
    device: DeviceId,
    source_chat_id: i64,
) -> Result<u64, CourierError> {
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE route_rules SET enabled = 0, updated_at = {NOW}
                     WHERE device_id = ?1 AND source_chat_id = ?2 AND enabled = 1"
                ),
                params![device.0, source_chat_id],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn devices_with_rules(db: &Database) -> Result<Vec<DeviceId>, CourierError> {
    db.connection()
        .call(|conn| -> Result<Vec<DeviceId>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT DISTINCT device_id FROM route_rules ORDER BY device_id")?;
            let rows = stmt.query_map([], |row| Ok(DeviceId(row.get(0)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
