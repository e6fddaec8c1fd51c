// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, one module per table family.

pub mod bots;
pub mod device_sessions;
pub mod devices;
pub mod dialogs;
pub mod messages;
pub mod route_rules;

use rusqlite::types::Type;

/// Wrap a column decoding failure so it surfaces as a rusqlite error.
pub(crate) fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
