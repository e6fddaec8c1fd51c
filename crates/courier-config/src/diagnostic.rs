// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment and validation failures into miette reports.
//!
//! Keys are reported with their full dotted path (`relay.failure_threshold`)
//! and, for unknown keys, the closest valid key in the same section.

#![allow(unused_assignments)] // emitted by the miette derive

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a valid key needs to be offered as a correction.
const MIN_SIMILARITY: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a courier setting")]
    #[diagnostic(code(courier::config::unknown_key), help("{}", correction_hint(suggestion.as_deref(), allowed)))]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        allowed: String,
        #[label("unknown here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type ({found})")]
    #[diagnostic(code(courier::config::wrong_type), help("use {expected}"))]
    WrongType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("`{key}` must be set")]
    #[diagnostic(code(courier::config::missing_key))]
    MissingKey { key: String },

    #[error("{message}")]
    #[diagnostic(code(courier::config::invalid_value))]
    Validation { message: String },

    #[error("could not load configuration: {0}")]
    #[diagnostic(code(courier::config::load))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

fn correction_hint(suggestion: Option<&str>, allowed: &str) -> String {
    match suggestion {
        Some(key) => format!("closest match is `{key}` (allowed: {allowed})"),
        None => format!("allowed here: {allowed}"),
    }
}

fn dotted(path: &[String], leaf: &str) -> String {
    path.iter()
        .map(String::as_str)
        .chain(std::iter::once(leaf))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Split a figment error chain into one diagnostic per failure.
///
/// `sources` pairs file names with their contents so unknown keys can be
/// underlined in place.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let section: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, allowed) => {
                    // the path may already end with the field
                    let parent = section
                        .strip_suffix(std::slice::from_ref(field))
                        .unwrap_or(&section);
                    let (span, src) = locate(&error, parent, field, sources);
                    ConfigError::UnknownKey {
                        key: dotted(parent, field),
                        suggestion: suggest_key(field, allowed),
                        allowed: allowed.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&section, field),
                },
                Kind::InvalidType(found, expected) => ConfigError::WrongType {
                    key: section.join("."),
                    found: found.to_string(),
                    expected: expected.clone(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Find the file an error came from and the byte span of `field` in it.
fn locate(
    error: &figment::Error,
    section: &[String],
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(file)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let file = file.display().to_string();
    let Some((name, content)) = sources.iter().find(|(name, _)| *name == file) else {
        return (None, None);
    };

    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name.clone(), content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the `[section]` table of a TOML document,
/// or at top level when `section` is empty.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let body_start = match section.first() {
        Some(table) => {
            let header = format!("[{table}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut line_start = body_start;
    for line in content[body_start..].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let rest = &line[indent..];
        if rest.starts_with('[') {
            return None;
        }
        if rest
            .strip_prefix(field)
            .is_some_and(|after| after.starts_with([' ', '=', '\t']))
        {
            return Some(line_start + indent);
        }
        line_start += line.len();
    }
    None
}

/// The allowed key most similar to `unknown`, if any is similar enough.
pub fn suggest_key(unknown: &str, allowed: &[&str]) -> Option<String> {
    allowed
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Print every error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    let reporter = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match reporter.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("courier: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let allowed = &["webhook_secret", "public_url", "api_id"];
        assert_eq!(
            suggest_key("webhok_secret", allowed),
            Some("webhook_secret".to_string())
        );
        assert_eq!(suggest_key("zzzz", allowed), None);
    }

    #[test]
    fn finds_key_offset_inside_section() {
        let content = "[server]\nport = 1\n[relay]\nfailure_treshold = 2\n";
        let section = vec!["relay".to_string()];
        let o = find_key_offset(content, &section, "failure_treshold").unwrap();
        assert_eq!(&content[o..o + 16], "failure_treshold");
    }

    #[test]
    fn key_search_stops_at_the_next_table() {
        let content = "[server]\nport = 1\n[relay]\nport = 2\n";
        let section = vec!["server".to_string()];
        assert_eq!(find_key_offset(content, &section, "host"), None);
        let relay = vec!["relay".to_string()];
        assert_eq!(find_key_offset(content, &relay, "port"), Some(26));
    }

    #[test]
    fn keys_are_reported_with_their_section() {
        assert_eq!(dotted(&["relay".to_string()], "window"), "relay.window");
        assert_eq!(dotted(&[], "server"), "server");
    }
}
