// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway wired to in-memory stores and mock platforms.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use courier_bus::FanoutHub;
use courier_core::types::NewBotAccount;
use courier_core::{BotId, BotStore};
use courier_gateway::{AuthConfig, GatewayState, HealthState, router};
use courier_mtproto::{DeviceSessionManager, DeviceSettings};
use courier_relay::{RelaySettings, RouteEngine, WebhookIngestor};
use courier_telegram::{BotRegistry, RegistryConfig};
use courier_test_utils::{MemoryStore, MockAccountBehavior, MockAccountConnector, MockBotFactory};
use courier_vault::SessionVault;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-t0ken";
pub const WEBHOOK_SECRET: &str = "hook-secret";

pub struct Harness {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub factory: Arc<MockBotFactory>,
    pub connector: Arc<MockAccountConnector>,
    pub hub: Arc<FanoutHub>,
    pub registry: Arc<BotRegistry>,
}

pub struct Options {
    pub admin_token: Option<&'static str>,
    pub webhook_secret: Option<&'static str>,
    pub account: MockAccountBehavior,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            admin_token: Some(ADMIN_TOKEN),
            webhook_secret: Some(WEBHOOK_SECRET),
            account: MockAccountBehavior::default(),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Options::default())
    }

    pub fn with(options: Options) -> Self {
        let store = Arc::new(MemoryStore::new());
        let factory = Arc::new(MockBotFactory::new());
        let connector = Arc::new(MockAccountConnector::new(options.account));
        let hub = Arc::new(FanoutHub::default());
        let registry = Arc::new(BotRegistry::new(
            factory.clone(),
            store.clone(),
            store.clone(),
            hub.clone(),
            RegistryConfig {
                public_url: Some("https://relay.example".into()),
                webhook_secret: options.webhook_secret.map(str::to_string),
                ..RegistryConfig::default()
            },
        ));
        let (events_tx, _events_rx) = mpsc::channel(16);
        let devices = Arc::new(DeviceSessionManager::new(
            connector.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Some(Arc::new(SessionVault::new([9u8; 32]))),
            DeviceSettings::default(),
            events_tx,
        ));
        let engine = Arc::new(RouteEngine::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            RelaySettings::default(),
        ));
        let ingestor = Arc::new(WebhookIngestor::new(
            store.clone(),
            hub.clone(),
            registry.clone(),
        ));
        let state = GatewayState {
            registry: registry.clone(),
            devices,
            engine,
            ingestor,
            bots: store.clone(),
            rules: store.clone(),
            messages: store.clone(),
            hub: hub.clone(),
            webhook_secret: options.webhook_secret.map(Arc::from),
            auth: AuthConfig {
                bearer_token: options.admin_token.map(str::to_string),
            },
            health: HealthState {
                prometheus_render: Some(Arc::new(|| "# TYPE courier_up gauge\n".to_string())),
                ..HealthState::default()
            },
        };
        Self {
            app: router(state),
            store,
            factory,
            connector,
            hub,
            registry,
        }
    }

    pub async fn bot(&self, name: &str) -> BotId {
        self.store
            .create_bot(NewBotAccount {
                name: name.into(),
                username: Some(format!("{name}_bot")),
                token: format!("{name}-token"),
                active: true,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    /// An admin call with the right token.
    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(admin_request(method, uri, Some(ADMIN_TOKEN), body))
            .await
    }
}

pub fn admin_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
