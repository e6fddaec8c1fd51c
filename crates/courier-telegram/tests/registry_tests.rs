// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot session registry behavior against the recording mocks.

use std::sync::Arc;
use std::time::Duration;

use courier_bus::{EventKind, FanoutHub};
use courier_core::types::{BatchStatus, MediaKind, MediaPayload, NewBotAccount, PollRequest};
use courier_core::{BotId, BotStore, CourierError, MessageStore};
use courier_telegram::media::MAX_PHOTO_BYTES;
use courier_telegram::{BotRegistry, RegistryConfig};
use courier_test_utils::{BotCall, MemoryStore, MockBotFactory};

struct Harness {
    registry: BotRegistry,
    store: Arc<MemoryStore>,
    factory: Arc<MockBotFactory>,
    hub: Arc<FanoutHub>,
}

fn harness(config: RegistryConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let factory = Arc::new(MockBotFactory::new());
    let hub = Arc::new(FanoutHub::default());
    let registry = BotRegistry::new(
        factory.clone(),
        store.clone(),
        store.clone(),
        hub.clone(),
        config,
    );
    Harness {
        registry,
        store,
        factory,
        hub,
    }
}

fn webhook_config() -> RegistryConfig {
    RegistryConfig {
        public_url: Some("https://relay.example.com/".into()),
        webhook_secret: Some("s3cret".into()),
        ..RegistryConfig::default()
    }
}

async fn add_bot(store: &MemoryStore, name: &str, active: bool) -> BotId {
    store
        .create_bot(NewBotAccount {
            name: name.into(),
            username: None,
            token: format!("{name}-token"),
            active,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;

    h.registry.start(bot).await.unwrap();
    h.registry.start(bot).await.unwrap();
    assert_eq!(h.factory.connect_count(), 1);
    assert_eq!(h.registry.running(), vec![bot]);

    assert!(h.registry.stop(bot).await);
    assert!(!h.registry.stop(bot).await);
    assert!(!h.registry.is_running(bot));
    assert!(h.factory.api(bot).calls().await.contains(&BotCall::Close));
}

#[tokio::test]
async fn unknown_bot_cannot_start() {
    let h = harness(RegistryConfig::default());
    let err = h.registry.start(BotId(99)).await.unwrap_err();
    assert!(matches!(err, CourierError::NotFound { .. }));
}

#[tokio::test]
async fn deactivated_bots_cannot_start() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", false).await;
    let err = h.registry.start(bot).await.unwrap_err();
    assert!(matches!(err, CourierError::NotRunning { .. }));
    assert_eq!(h.factory.connect_count(), 0);

    h.store.set_bot_active(bot, true).await.unwrap();
    h.registry.start(bot).await.unwrap();
    assert!(h.registry.is_running(bot));
}

#[tokio::test]
async fn operations_on_stopped_bots_fail_with_not_running() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    let err = h.registry.send_text(bot, 1, "hi").await.unwrap_err();
    assert!(matches!(err, CourierError::NotRunning { .. }));
    assert!(h.factory.api(bot).calls().await.is_empty());
}

#[tokio::test]
async fn ensure_all_active_skips_inactive_bots() {
    let h = harness(RegistryConfig::default());
    let a = add_bot(&h.store, "alpha", true).await;
    let b = add_bot(&h.store, "beta", false).await;

    assert_eq!(h.registry.ensure_all_active().await.unwrap(), 1);
    assert!(h.registry.is_running(a));
    assert!(!h.registry.is_running(b));
    // without public_url no webhook is touched
    assert!(h.factory.api(a).calls().await.is_empty());
}

#[tokio::test]
async fn register_delivery_requires_https_and_secret() {
    let h = harness(RegistryConfig {
        public_url: Some("http://relay.example.com".into()),
        webhook_secret: Some("s".into()),
        ..RegistryConfig::default()
    });
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    assert!(matches!(
        h.registry.register_delivery(bot).await,
        Err(CourierError::Config(_))
    ));

    let h = harness(RegistryConfig {
        public_url: Some("https://relay.example.com".into()),
        webhook_secret: None,
        ..RegistryConfig::default()
    });
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    assert!(matches!(
        h.registry.register_delivery(bot).await,
        Err(CourierError::Config(_))
    ));
}

#[tokio::test]
async fn register_delivery_clears_then_sets_the_webhook() {
    let h = harness(webhook_config());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();

    let url = h.registry.register_delivery(bot).await.unwrap();
    assert_eq!(url, format!("https://relay.example.com/webhook/{bot}"));
    assert_eq!(
        h.factory.api(bot).calls().await,
        vec![
            BotCall::DeleteWebhook,
            BotCall::SetWebhook {
                url: url.clone(),
                secret: "s3cret".into()
            },
        ]
    );
    assert_eq!(h.registry.webhook_info(bot).await.unwrap().url, url);
}

#[tokio::test]
async fn sends_are_cached_and_fanned_out() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    let mut chat_rx = h.hub.subscribe(&format!("chat:{bot}:55"));
    let mut bot_rx = h.hub.subscribe(&format!("bot:{bot}"));

    let sent = h.registry.send_text(bot, 55, "hello").await.unwrap();

    let cached = h.store.list_messages(bot, 55, 10).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].message_id, i64::from(sent.message_id));
    assert_eq!(cached[0].text.as_deref(), Some("hello"));

    let event = chat_rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::Message);
    assert_eq!(event.payload["chat_id"], 55);
    let event = bot_rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::ChatUpdate);
}

#[tokio::test]
async fn cache_failure_does_not_fail_the_send() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    h.store.fail_messages(true);

    let sent = h.registry.send_text(bot, 5, "still sent").await;
    assert!(sent.is_ok());
    assert_eq!(h.factory.api(bot).send_count().await, 1);
}

#[tokio::test]
async fn oversized_photos_go_out_as_documents() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();

    let media = MediaPayload {
        kind: MediaKind::Photo,
        data: vec![0; MAX_PHOTO_BYTES + 1],
        file_name: "big.jpg".into(),
        mime_type: Some("image/jpeg".into()),
    };
    h.registry
        .send_media(bot, 1, &media, Some("caption"))
        .await
        .unwrap();

    let calls = h.factory.api(bot).calls().await;
    assert!(matches!(
        calls.as_slice(),
        [BotCall::SendMedia { kind: MediaKind::Document, .. }]
    ));
}

#[tokio::test]
async fn polls_remember_where_they_were_posted() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();

    let poll = PollRequest {
        question: "Ship it?".into(),
        options: vec!["yes".into(), "no".into()],
        is_anonymous: Some(false),
        allows_multiple_answers: None,
    };
    let sent = h.registry.send_poll(bot, -100, &poll).await.unwrap();
    let poll_id = sent.raw["poll"]["id"].as_str().unwrap();
    let origin = h.registry.poll_origin(poll_id).unwrap();
    assert_eq!(origin.chat_id, -100);
    assert_eq!(origin.message_id, sent.message_id);
    assert!(h.registry.poll_origin("unknown").is_none());
}

#[tokio::test(start_paused = true)]
async fn old_poll_origins_are_pruned() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    let poll = PollRequest {
        question: "Lunch?".into(),
        options: vec!["pizza".into(), "soup".into()],
        is_anonymous: None,
        allows_multiple_answers: None,
    };

    let old = h.registry.send_poll(bot, -100, &poll).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let fresh = h.registry.send_poll(bot, -100, &poll).await.unwrap();
    tokio::time::advance(Duration::from_secs(40)).await;

    assert_eq!(h.registry.prune_polls(Duration::from_secs(60)), 1);
    assert!(h.registry.poll_origin(old.raw["poll"]["id"].as_str().unwrap()).is_none());
    assert!(h.registry.poll_origin(fresh.raw["poll"]["id"].as_str().unwrap()).is_some());
}

#[tokio::test]
async fn edits_and_pins_publish_to_the_chat_room() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    let mut rx = h.hub.subscribe(&format!("chat:{bot}:9"));

    h.registry.edit_text(bot, 9, 3, "fixed").await.unwrap();
    h.registry.pin(bot, 9, 3, true).await.unwrap();
    h.registry.unpin(bot, 9, None).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().kind, EventKind::MessageEdit);
    let pinned = rx.recv().await.unwrap();
    assert_eq!(pinned.kind, EventKind::Pin);
    assert_eq!(pinned.payload["pinned"], true);
    let unpinned = rx.recv().await.unwrap();
    assert_eq!(unpinned.payload["pinned"], false);
}

#[tokio::test]
async fn set_chat_title_updates_the_cache() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();

    h.registry.set_chat_title(bot, -7, "Ops").await.unwrap();
    let chat = h.store.chat(bot, -7).await.unwrap();
    assert_eq!(chat.title.as_deref(), Some("Ops"));

    h.factory.api(bot).set_member_count(12);
    assert_eq!(h.registry.member_count(bot, -7).await.unwrap(), 12);
}

#[tokio::test(start_paused = true)]
async fn bulk_send_reports_each_target() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    h.factory
        .api(bot)
        .fail_chat(2, "Forbidden: bot was blocked by the user")
        .await;

    let started = tokio::time::Instant::now();
    let outcomes = h.registry.send_bulk(bot, &[1, 2, 3], "news").await.unwrap();

    let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![BatchStatus::Sent, BatchStatus::Failed, BatchStatus::Sent]
    );
    assert!(outcomes[1].error.as_deref().unwrap().contains("blocked"));
    // two gaps between three targets
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn delete_batch_drops_only_deleted_messages() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    let a = h.registry.send_text(bot, 4, "a").await.unwrap();
    let b = h.registry.send_text(bot, 4, "b").await.unwrap();

    let outcomes = h
        .registry
        .delete_batch(bot, 4, &[a.message_id, b.message_id])
        .await
        .unwrap();
    assert!(outcomes.iter().all(|o| o.status == BatchStatus::Sent));
    assert_eq!(outcomes[1].message_id, Some(b.message_id));
    assert!(h.store.list_messages(bot, 4, 10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_chat_deletes_remote_then_local() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    for text in ["1", "2", "3"] {
        h.registry.send_text(bot, 8, text).await.unwrap();
    }

    let summary = h.registry.clear_chat(bot, 8).await.unwrap();
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.deleted_remote, 3);
    assert_eq!(summary.removed_local, 3);
    let deletes = h
        .factory
        .api(bot)
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, BotCall::Delete { .. }))
        .count();
    assert_eq!(deletes, 3);
}

#[tokio::test(start_paused = true)]
async fn forward_batch_forwards_to_each_target() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();

    let outcomes = h
        .registry
        .forward_batch(bot, 10, 77, &[20, 30])
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(h.factory.api(bot).calls().await.contains(&BotCall::Forward {
        to_chat: 30,
        from_chat: 10,
        message_id: 77
    }));
}

#[tokio::test]
async fn replies_forwards_reactions_and_deletes() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    let mut chat_rx = h.hub.subscribe(&format!("chat:{bot}:12"));

    let first = h.registry.send_text(bot, 12, "first").await.unwrap();
    let reply = h
        .registry
        .reply(bot, 12, first.message_id, "second")
        .await
        .unwrap();
    h.registry
        .send_buttons(bot, 12, "pick", &serde_json::json!({"inline_keyboard": []}))
        .await
        .unwrap();
    h.registry
        .set_reaction(bot, 12, first.message_id, "👍")
        .await
        .unwrap();
    h.registry.forward(bot, 12, first.message_id, 13).await.unwrap();
    h.registry.delete(bot, 12, reply.message_id).await.unwrap();

    let calls = h.factory.api(bot).calls().await;
    assert!(calls.contains(&BotCall::SendText {
        chat_id: 12,
        text: "second".into(),
        reply_to: Some(first.message_id),
    }));
    assert!(calls.contains(&BotCall::SendButtons {
        chat_id: 12,
        text: "pick".into(),
    }));
    assert!(calls.contains(&BotCall::Forward {
        to_chat: 13,
        from_chat: 12,
        message_id: first.message_id,
    }));

    let mut kinds = Vec::new();
    while let Ok(event) = chat_rx.try_recv() {
        kinds.push(event.kind);
    }
    assert!(kinds.contains(&EventKind::Reaction));

    let cached: Vec<i64> = h
        .store
        .list_messages(bot, 12, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.message_id)
        .collect();
    assert!(cached.contains(&i64::from(first.message_id)));
    assert!(!cached.contains(&i64::from(reply.message_id)));
}

#[tokio::test]
async fn restart_replaces_the_connection() {
    let h = harness(RegistryConfig::default());
    let bot = add_bot(&h.store, "alpha", true).await;
    h.registry.start(bot).await.unwrap();
    h.registry.restart(bot).await.unwrap();

    assert!(h.registry.is_running(bot));
    assert_eq!(h.factory.connect_count(), 2);
    assert!(h.factory.api(bot).calls().await.contains(&BotCall::Close));
}
