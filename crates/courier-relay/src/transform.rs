// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-rule filters and text transforms.
//!
//! Both come from the rule's JSON columns. Filters decide whether a message is
//! relayed at all; transforms rewrite its text. URL replacement always runs
//! before the literal replacements, which apply in order.

use std::sync::LazyLock;

use courier_core::types::RouteRule;
use regex::{NoExpand, Regex};
use serde::Deserialize;
use serde_json::Value;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>]+").unwrap());

/// Keyword filters, matched case-insensitively against the message text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleFilters {
    pub include_any: Vec<String>,
    pub exclude_any: Vec<String>,
}

impl RuleFilters {
    fn keywords(list: &[String]) -> impl Iterator<Item = String> + '_ {
        list.iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
    }

    /// True when a message with `text` (and possibly media) should be relayed.
    pub fn accepts(&self, text: &str, has_media: bool) -> bool {
        let lower = text.to_lowercase();
        if Self::keywords(&self.exclude_any).any(|k| lower.contains(&k)) {
            return false;
        }
        let mut include = Self::keywords(&self.include_any).peekable();
        if include.peek().is_none() {
            return true;
        }
        if text.trim().is_empty() && has_media {
            return false;
        }
        include.any(|k| lower.contains(&k))
    }
}

/// One literal find/replace pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Replacement {
    pub find: String,
    #[serde(default)]
    pub replace: String,
}

/// Text rewriting applied before delivery.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleTransforms {
    pub replace_urls_with: Option<String>,
    pub replacements: Vec<Replacement>,
}

impl RuleTransforms {
    pub fn apply(&self, text: &str) -> String {
        let mut out = match &self.replace_urls_with {
            Some(replacement) => URL_PATTERN
                .replace_all(text, NoExpand(replacement))
                .into_owned(),
            None => text.to_string(),
        };
        for pair in self.replacements.iter().filter(|p| !p.find.is_empty()) {
            if out.contains(&pair.find) {
                out = out.replace(&pair.find, &pair.replace);
            }
        }
        out
    }
}

/// Parsed filter and transform configuration of one rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleConfig {
    pub filters: RuleFilters,
    pub transforms: RuleTransforms,
}

fn parse<T: Default + for<'de> Deserialize<'de>>(
    value: Option<&Value>,
) -> Result<T, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        // Stored as a JSON string by some clients.
        Some(Value::String(s)) if s.trim().is_empty() => Ok(T::default()),
        Some(Value::String(s)) => serde_json::from_str(s),
        Some(other) => T::deserialize(other),
    }
}

impl RuleConfig {
    pub fn from_values(
        filters: Option<&Value>,
        transforms: Option<&Value>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            filters: parse(filters)?,
            transforms: parse(transforms)?,
        })
    }

    pub fn for_rule(rule: &RouteRule) -> Result<Self, serde_json::Error> {
        Self::from_values(rule.filters.as_ref(), rule.transforms.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn transforms(value: Value) -> RuleTransforms {
        RuleConfig::from_values(None, Some(&value)).unwrap().transforms
    }

    #[test]
    fn urls_are_replaced_before_literals() {
        let t = transforms(json!({
            "replace_urls_with": "[link]",
            "replacements": [{"find": "http", "replace": "HTTP"}, {"find": "link", "replace": "url"}]
        }));
        assert_eq!(
            t.apply("see https://a.example/x?y=1 and www.b.example plus http talk"),
            "see [url] and [url] plus HTTP talk"
        );
    }

    #[test]
    fn replacements_are_ordered_global_and_case_sensitive() {
        let t = transforms(json!({
            "replacements": [
                {"find": "cat", "replace": "dog"},
                {"find": "dog", "replace": "wolf"},
                {"find": "", "replace": "never"}
            ]
        }));
        assert_eq!(t.apply("cat Cat cat"), "wolf Cat wolf");
    }

    #[test]
    fn replacement_text_is_not_expanded() {
        let t = transforms(json!({"replace_urls_with": "$0 gone"}));
        assert_eq!(t.apply("go https://x.example now"), "go $0 gone now");
    }

    #[test]
    fn filters_match_keywords_case_insensitively() {
        let f = RuleConfig::from_values(
            Some(&json!({"include_any": ["Sale", " "], "exclude_any": ["spam"]})),
            None,
        )
        .unwrap()
        .filters;
        assert!(f.accepts("big SALE today", false));
        assert!(!f.accepts("sale SPAM", false));
        assert!(!f.accepts("nothing here", false));
        assert!(!f.accepts("", true));

        let open = RuleFilters::default();
        assert!(open.accepts("", true));
        assert!(open.accepts("anything", false));
    }

    #[test]
    fn string_encoded_config_is_accepted() {
        let config = RuleConfig::from_values(
            Some(&json!("{\"exclude_any\":[\"x\"]}")),
            Some(&json!("")),
        )
        .unwrap();
        assert_eq!(config.filters.exclude_any, vec!["x".to_string()]);
        assert_eq!(config.transforms, RuleTransforms::default());

        assert!(RuleConfig::from_values(Some(&json!({"include_any": 5})), None).is_err());
    }

    proptest! {
        #[test]
        fn transforms_are_idempotent_without_self_reference(
            words in proptest::collection::vec("[a-z]{1,8}", 0..12),
            urls in proptest::collection::vec("[a-z]{1,6}", 0..3),
        ) {
            let mut text = words.join(" ");
            for host in &urls {
                text.push_str(&format!(" https://{host}.example/p"));
            }
            let t = transforms(json!({
                "replace_urls_with": "[link]",
                "replacements": [{"find": "foo", "replace": "bar"}, {"find": "qq", "replace": "Z"}]
            }));
            let once = t.apply(&text);
            prop_assert_eq!(t.apply(&once), once.clone());
            prop_assert!(!once.contains("https://"));
        }
    }
}
