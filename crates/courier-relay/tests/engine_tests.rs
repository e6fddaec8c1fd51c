// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route engine: matching, dedup, transforms, and the destination breaker.

use std::sync::Arc;
use std::time::Duration;

use courier_bus::FanoutHub;
use courier_core::types::{
    ChatRecord, DeviceMessageEvent, DeviceStatus, MediaKind, MediaPayload, NewBotAccount,
    NewRouteRule, RouteRule, RouteRulePatch,
};
use courier_core::{BotId, BotStore, DeviceId, MessageStore, RouteRuleStore};
use courier_relay::{DEFAULT_TEST_TEXT, Delivery, RelaySettings, RouteEngine};
use courier_telegram::{BotRegistry, RegistryConfig};
use courier_test_utils::{BotCall, MemoryStore, MockBotApi, MockBotFactory};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const FORBIDDEN: &str = "Forbidden: bot is not a member of the channel chat";

struct Harness {
    engine: Arc<RouteEngine>,
    store: Arc<MemoryStore>,
    factory: Arc<MockBotFactory>,
    bot: BotId,
    device: DeviceId,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let factory = Arc::new(MockBotFactory::new());
        let registry = Arc::new(BotRegistry::new(
            factory.clone(),
            store.clone(),
            store.clone(),
            Arc::new(FanoutHub::default()),
            RegistryConfig::default(),
        ));
        let engine = Arc::new(RouteEngine::new(
            store.clone(),
            store.clone(),
            registry,
            RelaySettings::default(),
        ));
        let bot = store
            .create_bot(NewBotAccount {
                name: "relay".into(),
                username: None,
                token: "relay-token".into(),
                active: true,
            })
            .await
            .unwrap()
            .id;
        let device = store.seed_device("+15550100", DeviceStatus::Active).await;
        Self {
            engine,
            store,
            factory,
            bot,
            device,
        }
    }

    fn api(&self) -> Arc<MockBotApi> {
        self.factory.api(self.bot)
    }

    async fn rule(&self, source: i64, dest: i64, transforms: Option<Value>) -> RouteRule {
        self.store
            .create_rule(NewRouteRule {
                device_id: self.device,
                source_chat_id: source,
                bot_id: self.bot,
                dest_chat_id: dest,
                title: None,
                filters: None,
                transforms,
                enabled: None,
            })
            .await
            .unwrap()
    }

    fn event(&self, chat_id: i64, message_id: i32, text: &str) -> DeviceMessageEvent {
        DeviceMessageEvent {
            device_id: self.device,
            chat_id,
            message_id,
            text: text.into(),
            media: None,
            raw: json!({}),
        }
    }

    async fn text_sends(&self) -> usize {
        self.api()
            .calls()
            .await
            .iter()
            .filter(|c| matches!(c, BotCall::SendText { .. }))
            .count()
    }
}

#[tokio::test]
async fn events_without_rules_are_ignored() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    assert!(h.engine.handle(&h.event(999, 1, "hi")).await.is_empty());
    assert_eq!(h.factory.connect_count(), 0);
}

#[tokio::test]
async fn matching_rule_forwards_transformed_text() {
    let h = Harness::new().await;
    let rule = h
        .rule(
            100,
            200,
            Some(json!({
                "replace_urls_with": "<link>",
                "replacements": [{"find": "Acme", "replace": "Partner"}]
            })),
        )
        .await;

    let outcomes = h
        .engine
        .handle(&h.event(100, 1, "Acme deal at https://acme.example/deal"))
        .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, rule.id);
    assert!(matches!(outcomes[0].1, Delivery::Sent { .. }));
    assert_eq!(
        h.api().sent_texts().await,
        vec![(200, "Partner deal at <link>".to_string())]
    );
}

#[tokio::test]
async fn every_enabled_rule_for_the_source_is_served() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    h.rule(100, 201, None).await;
    let disabled = h.rule(100, 202, None).await;
    h.store
        .update_rule(
            disabled.id,
            RouteRulePatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcomes = h.engine.handle(&h.event(100, 1, "fan out")).await;
    assert_eq!(outcomes.len(), 2);
    let mut chats: Vec<i64> = h.api().sent_texts().await.into_iter().map(|(c, _)| c).collect();
    chats.sort();
    assert_eq!(chats, vec![200, 201]);
}

#[tokio::test(start_paused = true)]
async fn duplicates_are_suppressed_within_the_window() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    let event = h.event(100, 7, "once");

    assert!(matches!(h.engine.handle(&event).await[0].1, Delivery::Sent { .. }));
    assert_eq!(h.engine.handle(&event).await[0].1, Delivery::Duplicate);
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.engine.handle(&event).await[0].1, Delivery::Duplicate);
    assert_eq!(h.text_sends().await, 1);

    tokio::time::advance(Duration::from_secs(241)).await;
    assert!(matches!(h.engine.handle(&event).await[0].1, Delivery::Sent { .. }));
    assert_eq!(h.text_sends().await, 2);
}

#[tokio::test]
async fn dedup_is_per_rule() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    let event = h.event(100, 7, "twice");
    h.engine.handle(&event).await;
    h.rule(100, 201, None).await;

    let outcomes = h.engine.handle(&event).await;
    let sent: Vec<_> = outcomes
        .iter()
        .filter(|(_, d)| matches!(d, Delivery::Sent { .. }))
        .collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(h.text_sends().await, 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_forbidden_failures_disable_the_destination() {
    let h = Harness::new().await;
    let rule = h.rule(100, 200, None).await;
    let sibling = h
        .store
        .create_rule(NewRouteRule {
            device_id: h.device,
            source_chat_id: 555,
            bot_id: h.bot,
            dest_chat_id: 200,
            title: None,
            filters: None,
            transforms: None,
            enabled: None,
        })
        .await
        .unwrap();
    h.store
        .upsert_chat(&ChatRecord {
            bot_id: h.bot,
            chat_id: 200,
            kind: Some("channel".into()),
            title: Some("Mirror".into()),
            username: None,
            first_name: None,
            last_name: None,
        })
        .await
        .unwrap();
    h.api().fail_chat(200, FORBIDDEN).await;
    let event = h.event(100, 1, "hello");

    for expected_strikes in 1..=2 {
        let outcomes = h.engine.handle(&event).await;
        assert!(matches!(outcomes[0].1, Delivery::Failed { disabled: 0, .. }));
        assert_eq!(h.engine.failure_count(h.bot, 200), expected_strikes);
        tokio::time::advance(Duration::from_secs(20)).await;
    }
    let outcomes = h.engine.handle(&event).await;
    assert!(matches!(outcomes[0].1, Delivery::Failed { disabled: 2, .. }));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(h.engine.handle(&event).await.is_empty());
    assert_eq!(h.text_sends().await, 3);

    for id in [rule.id, sibling.id] {
        assert!(!h.store.get_rule(id).await.unwrap().unwrap().enabled);
    }
    assert!(h.store.chat(h.bot, 200).await.is_none());
}

#[tokio::test]
async fn a_success_resets_the_failure_count() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    let api = h.api();

    api.fail_chat(200, FORBIDDEN).await;
    h.engine.handle(&h.event(100, 1, "a")).await;
    h.engine.handle(&h.event(100, 2, "b")).await;
    assert_eq!(h.engine.failure_count(h.bot, 200), 2);

    api.heal_chat(200).await;
    h.engine.handle(&h.event(100, 3, "c")).await;
    assert_eq!(h.engine.failure_count(h.bot, 200), 0);

    api.fail_chat(200, "Bad Request: chat not found").await;
    h.engine.handle(&h.event(100, 4, "d")).await;
    h.engine.handle(&h.event(100, 5, "e")).await;
    let rules = h.store.enabled_rules_for_source(h.device, 100).await.unwrap();
    assert_eq!(rules.len(), 1);
}

#[tokio::test]
async fn other_failures_do_not_count_against_the_destination() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    h.api()
        .fail_chat(200, "Bad Request: message is too long")
        .await;

    for id in 1..=5 {
        let outcomes = h.engine.handle(&h.event(100, id, "x")).await;
        assert!(matches!(outcomes[0].1, Delivery::Failed { disabled: 0, .. }));
    }
    assert_eq!(h.engine.failure_count(h.bot, 200), 0);
    assert_eq!(
        h.store.enabled_rules_for_source(h.device, 100).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn media_is_sent_with_its_caption() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    let mut event = h.event(100, 1, "look at this");
    event.media = Some(Arc::new(MediaPayload {
        kind: MediaKind::Video,
        data: vec![0; 64],
        file_name: "clip.mp4".into(),
        mime_type: Some("video/mp4".into()),
    }));

    h.engine.handle(&event).await;
    assert_eq!(
        h.api().calls().await.last(),
        Some(&BotCall::SendMedia {
            chat_id: 200,
            kind: MediaKind::Video,
            bytes: 64,
            caption: Some("look at this".into()),
        })
    );
}

#[tokio::test]
async fn blank_text_without_media_sends_nothing() {
    let h = Harness::new().await;
    h.rule(100, 200, Some(json!({"replacements": [{"find": "drop me", "replace": ""}]})))
        .await;

    assert_eq!(h.engine.handle(&h.event(100, 1, "   ")).await[0].1, Delivery::Empty);
    assert_eq!(h.engine.handle(&h.event(100, 2, "drop me")).await[0].1, Delivery::Empty);
    assert_eq!(h.api().send_count().await, 0);
}

#[tokio::test]
async fn filters_gate_delivery() {
    let h = Harness::new().await;
    h.store
        .create_rule(NewRouteRule {
            device_id: h.device,
            source_chat_id: 100,
            bot_id: h.bot,
            dest_chat_id: 200,
            title: Some("deals only".into()),
            filters: Some(json!({"include_any": ["deal"], "exclude_any": ["expired"]})),
            transforms: None,
            enabled: None,
        })
        .await
        .unwrap();

    assert_eq!(h.engine.handle(&h.event(100, 1, "weather")).await[0].1, Delivery::Filtered);
    assert_eq!(
        h.engine.handle(&h.event(100, 2, "Deal expired")).await[0].1,
        Delivery::Filtered
    );
    assert!(matches!(
        h.engine.handle(&h.event(100, 3, "New DEAL")).await[0].1,
        Delivery::Sent { .. }
    ));
}

#[tokio::test]
async fn unreadable_rule_config_is_skipped() {
    let h = Harness::new().await;
    h.rule(100, 200, Some(json!({"replacements": "nope"}))).await;
    assert_eq!(
        h.engine.handle(&h.event(100, 1, "x")).await[0].1,
        Delivery::Misconfigured
    );
    assert_eq!(h.api().send_count().await, 0);
}

#[tokio::test]
async fn test_route_uses_default_text() {
    let h = Harness::new().await;
    h.engine.test_route(h.bot, 200, None).await.unwrap();
    h.engine.test_route(h.bot, 200, Some("custom")).await.unwrap();
    assert_eq!(
        h.api().sent_texts().await,
        vec![
            (200, DEFAULT_TEST_TEXT.to_string()),
            (200, "custom".to_string())
        ]
    );
}

#[tokio::test]
async fn run_consumes_events_in_order() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(h.engine.clone().run(rx, CancellationToken::new()));

    for (id, text) in [(1, "one"), (2, "two"), (3, "three")] {
        tx.send(h.event(100, id, text)).await.unwrap();
    }
    drop(tx);
    task.await.unwrap();

    let texts: Vec<String> = h.api().sent_texts().await.into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn sweep_evicts_expired_marks() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    h.engine.handle(&h.event(100, 1, "x")).await;
    assert_eq!(h.engine.sweep().0, 0);
    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(h.engine.sweep().0, 1);
}

#[tokio::test]
async fn tripping_the_breaker_purges_cached_destination_messages() {
    let h = Harness::new().await;
    h.rule(100, 200, None).await;
    h.engine.handle(&h.event(100, 1, "kept for now")).await;
    assert_eq!(h.store.list_messages(h.bot, 200, 10).await.unwrap().len(), 1);

    h.api().fail_chat(200, "Bad Request: chat not found").await;
    for id in 2..=4 {
        h.engine.handle(&h.event(100, id, "x")).await;
    }
    assert!(h.store.list_messages(h.bot, 200, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn deactivated_bot_is_not_restarted_by_the_engine() {
    let h = Harness::new().await;
    let rule = h.rule(100, 200, None).await;
    h.store.set_bot_active(h.bot, false).await.unwrap();

    let outcomes = h.engine.handle(&h.event(100, 1, "hello")).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].1,
        Delivery::Failed { disabled: 0, .. }
    ));
    assert_eq!(h.factory.connect_count(), 0);
    // not a destination failure: the breaker and the rule are untouched
    assert_eq!(h.engine.failure_count(h.bot, 200), 0);
    assert!(h.store.get_rule(rule.id).await.unwrap().unwrap().enabled);

    // once reactivated the same event can still be delivered
    h.store.set_bot_active(h.bot, true).await.unwrap();
    let outcomes = h.engine.handle(&h.event(100, 1, "hello")).await;
    assert!(matches!(outcomes[0].1, Delivery::Sent { .. }));
    assert_eq!(h.text_sends().await, 1);
}
