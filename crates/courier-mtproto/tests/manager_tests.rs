// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session state machine against the scripted account connector.

use std::sync::Arc;
use std::time::Duration;

use courier_core::types::{DeviceMessageEvent, DeviceStatus, DialogKind, MediaKind};
use courier_core::{CourierError, DeviceId, DeviceSessionStore, DeviceStore, DialogStore};
use courier_mtproto::{DeviceSessionManager, DeviceSettings, LoginStatus};
use courier_test_utils::{
    DialogFault, MemoryStore, MockAccountBehavior, MockAccountConnector, dialog,
};
use courier_vault::SessionVault;
use tokio::sync::mpsc;

struct Harness {
    manager: Arc<DeviceSessionManager>,
    store: Arc<MemoryStore>,
    connector: Arc<MockAccountConnector>,
    vault: Arc<SessionVault>,
    events: mpsc::Receiver<DeviceMessageEvent>,
}

fn harness(behavior: MockAccountBehavior) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let connector = Arc::new(MockAccountConnector::new(behavior));
    let vault = Arc::new(SessionVault::new([7u8; 32]));
    let (tx, events) = mpsc::channel(16);
    let manager = Arc::new(DeviceSessionManager::new(
        connector.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Some(vault.clone()),
        DeviceSettings::default(),
        tx,
    ));
    Harness {
        manager,
        store,
        connector,
        vault,
        events,
    }
}

async fn logged_in(h: &Harness) -> DeviceId {
    let id = h.manager.start_login("+15550100").await.unwrap();
    let result = h.manager.submit_code(id, "12345").await.unwrap();
    assert_eq!(result.status, LoginStatus::Ok);
    id
}

#[tokio::test]
async fn code_login_activates_the_device() {
    let h = harness(MockAccountBehavior::default());
    let id = h.manager.start_login(" +15550100 ").await.unwrap();

    let device = h.store.get_device(id).await.unwrap().unwrap();
    assert_eq!(device.status, DeviceStatus::Pending);
    assert_eq!(device.phone, "+15550100");
    assert!(h.manager.login_pending(id));

    let result = h.manager.submit_code(id, "12345").await.unwrap();
    assert_eq!(result.status, LoginStatus::Ok);
    assert!(!h.manager.login_pending(id));

    let device = h.store.get_device(id).await.unwrap().unwrap();
    assert_eq!(device.status, DeviceStatus::Active);
    assert_eq!(device.username.as_deref(), Some("relay_user"));
    assert_eq!(device.display_name.as_deref(), Some("Relay"));

    let record = h.store.primary_session(id).await.unwrap().unwrap();
    assert!(record.is_primary);
    assert_eq!(h.vault.decrypt(&record.session_blob).unwrap(), b"mock-session-1");
}

#[tokio::test]
async fn wrong_code_keeps_the_attempt() {
    let h = harness(MockAccountBehavior::default());
    let id = h.manager.start_login("+1").await.unwrap();

    let err = h.manager.submit_code(id, "00000").await.unwrap_err();
    assert!(matches!(err, CourierError::Auth(_)));
    assert!(h.manager.login_pending(id));
    assert_eq!(h.manager.submit_code(id, "12345").await.unwrap().status, LoginStatus::Ok);
}

#[tokio::test]
async fn second_factor_waits_for_the_password() {
    let h = harness(MockAccountBehavior {
        password: Some("hunter2".into()),
        ..MockAccountBehavior::default()
    });
    let id = h.manager.start_login("+1").await.unwrap();

    let result = h.manager.submit_code(id, "12345").await.unwrap();
    assert_eq!(result.status, LoginStatus::PasswordRequired);
    assert!(h.manager.awaiting_password(id));

    assert!(matches!(
        h.manager.submit_password(id, "wrong").await,
        Err(CourierError::Auth(_))
    ));
    assert!(h.manager.awaiting_password(id));
    assert_eq!(
        h.store.get_device(id).await.unwrap().unwrap().status,
        DeviceStatus::Pending
    );

    let result = h.manager.submit_password(id, "hunter2").await.unwrap();
    assert_eq!(result.status, LoginStatus::Ok);
    assert_eq!(
        h.store.get_device(id).await.unwrap().unwrap().status,
        DeviceStatus::Active
    );
}

#[tokio::test]
async fn submit_without_pending_login_is_rejected() {
    let h = harness(MockAccountBehavior::default());
    assert!(matches!(
        h.manager.submit_code(DeviceId(42), "12345").await,
        Err(CourierError::NoPendingLogin(DeviceId(42)))
    ));
    assert!(matches!(
        h.manager.submit_password(DeviceId(42), "pw").await,
        Err(CourierError::NoPendingLogin(_))
    ));
}

#[tokio::test]
async fn login_without_vault_key_fails_fast() {
    let store = Arc::new(MemoryStore::new());
    let connector = Arc::new(MockAccountConnector::default());
    let (tx, _rx) = mpsc::channel(1);
    let manager = DeviceSessionManager::new(
        connector.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        None,
        DeviceSettings::default(),
        tx,
    );
    assert!(matches!(
        manager.start_login("+1").await,
        Err(CourierError::Config(_))
    ));
    assert_eq!(connector.connect_count(), 0);
    assert!(store.list_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_connect_leaves_no_pending_device() {
    let h = harness(MockAccountBehavior::default());
    h.connector.fail_connect(true);
    assert!(h.manager.start_login("+15550100").await.is_err());
    assert_eq!(h.connector.connect_count(), 1);
    assert!(h.store.list_devices().await.unwrap().is_empty());

    h.connector.fail_connect(false);
    let id = logged_in(&h).await;
    let devices = h.store.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, id);
}

#[tokio::test]
async fn concurrent_connects_share_one_construction() {
    let h = harness(MockAccountBehavior::default());
    let id = h.store.seed_device("+1", DeviceStatus::Active).await;
    let blob = h.vault.encrypt(b"restored").unwrap();
    h.store.upsert_primary(id, &blob).await.unwrap();
    h.connector.set_connect_delay(Duration::from_millis(50));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let manager = h.manager.clone();
        tasks.push(tokio::spawn(
            async move { manager.get_client_for_device(id).await },
        ));
    }
    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap().unwrap());
    }

    assert_eq!(h.connector.connect_count(), 1);
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
    assert_eq!(h.connector.last_client().unwrap().session(), b"restored");
}

#[tokio::test]
async fn inactive_devices_have_no_client() {
    let h = harness(MockAccountBehavior::default());
    let id = h.store.seed_device("+1", DeviceStatus::Inactive).await;
    assert!(matches!(
        h.manager.get_client_for_device(id).await,
        Err(CourierError::NotRunning { .. })
    ));
    assert!(matches!(
        h.manager.get_client_for_device(DeviceId(999)).await,
        Err(CourierError::NotFound { .. })
    ));
    assert_eq!(h.connector.connect_count(), 0);
}

#[tokio::test]
async fn listener_publishes_normalized_events_in_order() {
    let mut h = harness(MockAccountBehavior {
        media_bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
        ..MockAccountBehavior::default()
    });
    let id = logged_in(&h).await;
    // attached during login, second call is a no-op
    assert!(!h.manager.ensure_update_handler(id).await.unwrap());

    let client = h.connector.last_client().unwrap();
    client.push_text(-100, 1, "first");
    client.push_media(-100, 2, "look", false, None);

    let first = h.events.recv().await.unwrap();
    assert_eq!((first.device_id, first.chat_id, first.message_id), (id, -100, 1));
    assert_eq!(first.text, "first");
    assert!(first.media.is_none());

    let second = h.events.recv().await.unwrap();
    assert_eq!(second.message_id, 2);
    let media = second.media.unwrap();
    assert_eq!(media.kind, MediaKind::Photo);
    assert_eq!(client.downloads(), 1);
}

#[tokio::test]
async fn sync_upserts_and_tombstones() {
    let h = harness(MockAccountBehavior {
        dialogs: vec![
            dialog(1, "Beta", DialogKind::Chat),
            dialog(2, "alpha", DialogKind::Channel),
        ],
        ..MockAccountBehavior::default()
    });
    let id = logged_in(&h).await;

    let summary = h.manager.sync_dialogs(id).await.unwrap();
    assert_eq!(summary.saved, 2);
    assert!(summary.synced_at.is_some());

    h.connector.set_behavior(|b| b.dialogs = vec![dialog(2, "alpha", DialogKind::Channel)]);
    h.manager.reconnect(id).await.unwrap();
    h.manager.sync_dialogs(id).await.unwrap();

    let page = h.manager.dialogs(id, 50, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].peer_id, 2);
    let all = h.store.all_dialogs(id).await;
    assert!(all.iter().any(|d| d.peer_id == 1 && d.deleted));
}

#[tokio::test(start_paused = true)]
async fn sync_rebuilds_the_connection_after_a_timeout() {
    let h = harness(MockAccountBehavior {
        dialogs: vec![dialog(1, "Only", DialogKind::User)],
        ..MockAccountBehavior::default()
    });
    let id = logged_in(&h).await;
    let first = h.connector.last_client().unwrap();
    h.connector.push_dialog_fault(DialogFault::Hang);

    let summary = h.manager.sync_dialogs(id).await.unwrap();
    assert_eq!(summary.saved, 1);
    assert!(first.is_disconnected());
    // login connection plus the rebuilt one
    assert_eq!(h.connector.connect_count(), 2);
    assert!(h.manager.get_client_for_device(id).await.unwrap().has_listener());
}

#[tokio::test]
async fn sync_rebuilds_after_duplicated_auth_key() {
    let h = harness(MockAccountBehavior::default());
    let id = logged_in(&h).await;
    h.connector
        .push_dialog_fault(DialogFault::Error("AUTH_KEY_DUPLICATED".into()));

    assert_eq!(h.manager.sync_dialogs(id).await.unwrap().saved, 0);
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn other_sync_errors_are_surfaced_without_rebuild() {
    let h = harness(MockAccountBehavior {
        dialogs: vec![dialog(1, "Kept", DialogKind::User)],
        ..MockAccountBehavior::default()
    });
    let id = logged_in(&h).await;
    h.manager.sync_dialogs(id).await.unwrap();
    h.connector
        .push_dialog_fault(DialogFault::Error("CHANNEL_PRIVATE".into()));

    assert!(h.manager.sync_dialogs(id).await.is_err());
    assert_eq!(h.connector.connect_count(), 1);
    // cache untouched by the failed sync
    assert_eq!(h.store.count_dialogs(id).await.unwrap(), 1);
}

#[tokio::test]
async fn deactivate_logs_out_and_disconnects() {
    let h = harness(MockAccountBehavior::default());
    let id = logged_in(&h).await;
    let client = h.connector.last_client().unwrap();

    h.manager.deactivate(id).await.unwrap();
    assert!(client.is_logged_out());
    assert!(client.is_disconnected());
    assert_eq!(
        h.store.get_device(id).await.unwrap().unwrap().status,
        DeviceStatus::Inactive
    );
    assert!(matches!(
        h.manager.get_client_for_device(id).await,
        Err(CourierError::NotRunning { .. })
    ));
}

#[tokio::test]
async fn revoked_devices_stay_revoked() {
    let h = harness(MockAccountBehavior::default());
    let id = logged_in(&h).await;
    h.manager.revoke(id).await.unwrap();
    h.manager.deactivate(id).await.unwrap();
    assert_eq!(
        h.manager.status(id).await.unwrap().status,
        DeviceStatus::Revoked
    );
}

#[tokio::test]
async fn delete_removes_device_and_sessions() {
    let h = harness(MockAccountBehavior::default());
    let id = logged_in(&h).await;

    h.manager.delete(id).await.unwrap();
    assert!(h.store.get_device(id).await.unwrap().is_none());
    assert!(h.store.primary_session(id).await.unwrap().is_none());
    assert!(matches!(
        h.manager.delete(id).await,
        Err(CourierError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn stale_logins_are_pruned() {
    let h = harness(MockAccountBehavior::default());
    let id = h.manager.start_login("+1").await.unwrap();
    assert_eq!(h.manager.prune_stale_logins().await, 0);

    tokio::time::advance(DeviceSettings::default().login_ttl).await;
    assert_eq!(h.manager.prune_stale_logins().await, 1);
    assert!(!h.manager.login_pending(id));
    assert!(h.connector.last_client().unwrap().is_disconnected());
}

#[tokio::test]
async fn attach_all_skips_inactive_devices_and_shutdown_persists_sessions() {
    let h = harness(MockAccountBehavior::default());
    let active = h.store.seed_device("+1", DeviceStatus::Active).await;
    h.store
        .upsert_primary(active, &h.vault.encrypt(b"saved").unwrap())
        .await
        .unwrap();
    h.store.seed_device("+2", DeviceStatus::Inactive).await;

    assert_eq!(h.manager.attach_all().await.unwrap(), 1);
    assert_eq!(h.connector.connect_count(), 1);

    h.manager.shutdown().await;
    let client = h.connector.last_client().unwrap();
    assert!(client.is_disconnected());
    let record = h.store.primary_session(active).await.unwrap().unwrap();
    assert_eq!(h.vault.decrypt(&record.session_blob).unwrap(), b"saved");
}
