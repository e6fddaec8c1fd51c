// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin API and public probes through the full router.

mod common;

use axum::http::StatusCode;
use courier_core::types::{DeviceStatus, DialogKind};
use courier_test_utils::{BotCall, MockAccountBehavior, dialog};
use serde_json::json;

use common::{Harness, Options, admin_request};

#[tokio::test]
async fn health_and_metrics_are_public() {
    let h = Harness::new();
    let (status, body) = h.send(admin_request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bots_running"], 0);

    let (status, body) = h.send(admin_request("GET", "/metrics", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("courier_up"));
}

#[tokio::test]
async fn admin_routes_require_the_bearer_token() {
    let h = Harness::new();
    let (status, _) = h.send(admin_request("GET", "/api/devices", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = h
        .send(admin_request("GET", "/api/devices", Some("guess"), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = h.admin("GET", "/api/devices", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn admin_is_closed_when_no_token_is_configured() {
    let h = Harness::with(Options {
        admin_token: None,
        ..Options::default()
    });
    let (status, _) = h
        .send(admin_request("GET", "/api/bots", Some(""), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_flow_activates_the_device() {
    let h = Harness::new();
    let (status, body) = h
        .admin("POST", "/api/devices/login", Some(json!({"phone": "+15550123"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "code_sent");
    let device = body["device_id"].as_i64().unwrap();

    let (status, body) = h
        .admin(
            "POST",
            &format!("/api/devices/{device}/code"),
            Some(json!({"code": "00000"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("authentication"));

    let (status, body) = h
        .admin(
            "POST",
            &format!("/api/devices/{device}/code"),
            Some(json!({"code": "12345"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "device_id": device}));

    let (status, body) = h.admin("GET", &format!("/api/devices/{device}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["display_name"], "Relay");
}

#[tokio::test]
async fn second_factor_is_reported_and_completed() {
    let h = Harness::with(Options {
        account: MockAccountBehavior {
            password: Some("hunter2".into()),
            ..MockAccountBehavior::default()
        },
        ..Options::default()
    });
    let (_, body) = h
        .admin("POST", "/api/devices/login", Some(json!({"phone": "+15550124"})))
        .await;
    let device = body["device_id"].as_i64().unwrap();
    let (_, body) = h
        .admin(
            "POST",
            &format!("/api/devices/{device}/code"),
            Some(json!({"code": "12345"})),
        )
        .await;
    assert_eq!(body["status"], "password_required");

    let (status, body) = h
        .admin(
            "POST",
            &format!("/api/devices/{device}/password"),
            Some(json!({"password": "hunter2"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn code_without_pending_login_is_a_bad_request() {
    let h = Harness::new();
    let (status, body) = h
        .admin("POST", "/api/devices/99/code", Some(json!({"code": "12345"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no pending login"));

    let (status, _) = h
        .admin("POST", "/api/devices/login", Some(json!({"phone": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dialogs_are_served_from_the_cache() {
    let h = Harness::with(Options {
        account: MockAccountBehavior {
            dialogs: vec![
                dialog(100, "Alpha", DialogKind::Channel),
                dialog(200, "Beta", DialogKind::Chat),
                dialog(300, "Gamma", DialogKind::User),
            ],
            ..MockAccountBehavior::default()
        },
        ..Options::default()
    });
    let (_, body) = h
        .admin("POST", "/api/devices/login", Some(json!({"phone": "+15550125"})))
        .await;
    let device = body["device_id"].as_i64().unwrap();
    h.admin(
        "POST",
        &format!("/api/devices/{device}/code"),
        Some(json!({"code": "12345"})),
    )
    .await;

    let (_, body) = h
        .admin("GET", &format!("/api/devices/{device}/dialogs"), None)
        .await;
    assert_eq!(body["total"], 0);

    let (status, body) = h
        .admin("POST", &format!("/api/devices/{device}/sync"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], 3);

    let (status, body) = h
        .admin(
            "GET",
            &format!("/api/devices/{device}/dialogs?limit=2&offset=1"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Beta", "Gamma"]);
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let h = Harness::new();
    let (status, body) = h.admin("GET", "/api/devices/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn rule_lifecycle() {
    let h = Harness::new();
    let bot = h.bot("relay").await;
    let device = h.store.seed_device("+15550126", DeviceStatus::Active).await;

    let (status, _) = h
        .admin(
            "POST",
            "/api/rules",
            Some(json!({"device_id": device, "source_chat_id": 100, "bot_id": bot})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .admin(
            "POST",
            "/api/rules",
            Some(json!({
                "device_id": device, "source_chat_id": 100, "bot_id": 999, "dest_chat_id": 200
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, rule) = h
        .admin(
            "POST",
            "/api/rules",
            Some(json!({
                "device_id": device, "source_chat_id": 100, "bot_id": bot, "dest_chat_id": 200,
                "title": "news", "filters": {"include_any": ["launch"]}
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["enabled"], true);
    let id = rule["id"].as_i64().unwrap();

    let (_, rules) = h
        .admin("GET", &format!("/api/devices/{device}/rules"), None)
        .await;
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let (status, rule) = h
        .admin(
            "PATCH",
            &format!("/api/rules/{id}"),
            Some(json!({"enabled": false, "dest_chat_id": 201})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rule["enabled"], false);
    assert_eq!(rule["dest_chat_id"], 201);
    assert_eq!(rule["title"], "news");

    let (status, _) = h
        .admin(
            "PATCH",
            &format!("/api/rules/{id}"),
            Some(json!({"transforms": {"replacements": "nope"}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.admin("DELETE", &format!("/api/rules/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], id);
    let (status, _) = h.admin("DELETE", &format!("/api/rules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.admin("PATCH", &format!("/api/rules/{id}"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn route_test_sends_directly() {
    let h = Harness::new();
    let bot = h.bot("relay").await;

    let (status, sent) = h
        .admin(
            "POST",
            "/api/rules/test",
            Some(json!({"bot_id": bot, "dest_chat_id": 200})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["chat_id"], 200);
    assert_eq!(
        h.factory.api(bot).sent_texts().await,
        vec![(200, "Route test ✅".to_string())]
    );

    h.factory
        .api(bot)
        .fail_chat(300, "Forbidden: bot was kicked from the group chat")
        .await;
    let (status, body) = h
        .admin(
            "POST",
            "/api/rules/test",
            Some(json!({"bot_id": bot, "dest_chat_id": 300, "text": "ping"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn sends_need_a_running_bot() {
    let h = Harness::new();
    let bot = h.bot("relay").await;
    let uri = format!("/api/bots/{bot}/chats/200/messages");

    let (status, _) = h.admin("POST", &uri, Some(json!({"text": "hi"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h.admin("POST", &format!("/api/bots/{bot}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, sent) = h
        .admin("POST", &uri, Some(json!({"text": "hi", "reply_to": 5})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["text"], "hi");

    let calls = h.factory.api(bot).calls().await;
    assert!(calls.contains(&BotCall::SendText {
        chat_id: 200,
        text: "hi".into(),
        reply_to: Some(5),
    }));

    let (_, cached) = h.admin("GET", &uri, None).await;
    assert_eq!(cached.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bot_accounts_never_expose_their_token() {
    let h = Harness::new();
    let (status, created) = h
        .admin(
            "POST",
            "/api/bots",
            Some(json!({"name": "alerts", "token": "123:secret", "active": true})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["running"], true);
    assert!(created.get("token").is_none());

    let (_, bots) = h.admin("GET", "/api/bots", None).await;
    assert_eq!(bots.as_array().unwrap().len(), 1);
    assert!(!bots.to_string().contains("123:secret"));

    let id = created["id"].as_i64().unwrap();
    let (_, view) = h
        .admin(
            "PUT",
            &format!("/api/bots/{id}/active"),
            Some(json!({"active": false})),
        )
        .await;
    assert_eq!(view["active"], false);
    assert_eq!(view["running"], false);

    let (status, _) = h
        .admin("POST", "/api/bots", Some(json!({"name": "", "token": "x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_registration_uses_the_public_url() {
    let h = Harness::new();
    let bot = h.bot("relay").await;
    h.admin("POST", &format!("/api/bots/{bot}/start"), None).await;

    let (status, body) = h
        .admin("POST", &format!("/api/bots/{bot}/webhook"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["webhook_url"],
        format!("https://relay.example/webhook/{bot}")
    );

    let (status, info) = h
        .admin("GET", &format!("/api/bots/{bot}/webhook"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["url"], format!("https://relay.example/webhook/{bot}"));
}

#[tokio::test]
async fn bulk_sends_report_per_target() {
    let h = Harness::new();
    let bot = h.bot("relay").await;
    h.admin("POST", &format!("/api/bots/{bot}/start"), None).await;
    h.factory
        .api(bot)
        .fail_chat(2, "Bad Request: chat not found")
        .await;

    let (status, outcomes) = h
        .admin(
            "POST",
            &format!("/api/bots/{bot}/bulk"),
            Some(json!({"chat_ids": [1, 2, 3], "text": "notice"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<_> = outcomes
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["sent", "failed", "sent"]);
    assert!(outcomes[1]["error"].is_string());
}

#[tokio::test]
async fn websocket_requires_token_and_valid_room() {
    let h = Harness::new();
    let (status, _) = h
        .send(admin_request("GET", "/ws?room=bot:1", None, None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .send(admin_request(
            "GET",
            &format!("/ws?room=device:1&token={}", common::ADMIN_TOKEN),
            None,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid room"));
}
