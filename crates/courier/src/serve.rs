// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve`: wires stores, registries, the relay, and the gateway,
//! then runs until a shutdown signal.

use std::sync::Arc;
use std::time::Instant;

use courier_bus::FanoutHub;
use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_core::types::DeviceMessageEvent;
use courier_gateway::{AuthConfig, GatewayState, HealthState};
use courier_mtproto::{DeviceSessionManager, DeviceSettings, GrammersConnector};
use courier_relay::{Maintenance, RelaySettings, RouteEngine, RuleAuditor, WebhookIngestor};
use courier_storage::SqliteStore;
use courier_telegram::{BotRegistry, RegistryConfig, TeloxideFactory};
use courier_vault::SessionVault;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown;
use crate::telemetry::{self, MetricsRender};

/// Everything the running process owns.
pub struct Services {
    pub store: Arc<SqliteStore>,
    pub hub: Arc<FanoutHub>,
    pub registry: Arc<BotRegistry>,
    pub devices: Arc<DeviceSessionManager>,
    pub engine: Arc<RouteEngine>,
    pub auditor: Arc<RuleAuditor>,
    pub ingestor: Arc<WebhookIngestor>,
    pub settings: RelaySettings,
    events: Option<mpsc::Receiver<DeviceMessageEvent>>,
}

impl Services {
    /// Open storage and build every component. Nothing is started yet.
    pub async fn build(config: &CourierConfig) -> Result<Self, CourierError> {
        let store = Arc::new(SqliteStore::open(&config.storage).await?);
        store.health_check().await?;

        // A missing key only disables device logins.
        let vault = match SessionVault::from_config(&config.vault) {
            Ok(vault) => Some(Arc::new(vault)),
            Err(e) => {
                warn!(error = %e, "device sessions unavailable");
                None
            }
        };

        let hub = Arc::new(FanoutHub::default());
        let registry = Arc::new(BotRegistry::new(
            Arc::new(TeloxideFactory),
            store.clone(),
            store.clone(),
            hub.clone(),
            RegistryConfig::from(&config.telegram),
        ));

        let (events_tx, events_rx) = mpsc::channel(config.relay.event_buffer.max(1));
        let devices = Arc::new(DeviceSessionManager::new(
            Arc::new(GrammersConnector::from_config(&config.telegram)),
            store.clone(),
            store.clone(),
            store.clone(),
            vault,
            DeviceSettings::from(&config.devices),
            events_tx,
        ));

        let settings = RelaySettings::from(&config.relay);
        let engine = Arc::new(RouteEngine::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            settings.clone(),
        ));
        let auditor = Arc::new(RuleAuditor::new(
            devices.clone(),
            store.clone(),
            settings.miss_threshold,
        ));
        let ingestor = Arc::new(WebhookIngestor::new(
            store.clone(),
            hub.clone(),
            registry.clone(),
        ));

        Ok(Self {
            store,
            hub,
            registry,
            devices,
            engine,
            auditor,
            ingestor,
            settings,
            events: Some(events_rx),
        })
    }

    pub fn gateway_state(
        &self,
        config: &CourierConfig,
        prometheus_render: Option<MetricsRender>,
    ) -> GatewayState {
        GatewayState {
            registry: self.registry.clone(),
            devices: self.devices.clone(),
            engine: self.engine.clone(),
            ingestor: self.ingestor.clone(),
            bots: self.store.clone(),
            rules: self.store.clone(),
            messages: self.store.clone(),
            hub: self.hub.clone(),
            webhook_secret: config.telegram.webhook_secret.as_deref().map(Arc::from),
            auth: AuthConfig {
                bearer_token: config.server.admin_token.clone(),
            },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render,
            },
        }
    }

    /// Spawn the relay, audit, and maintenance loops.
    fn spawn_loops(
        &mut self,
        config: &CourierConfig,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) {
        if let Some(events) = self.events.take() {
            tasks.spawn(self.engine.clone().run(events, cancel.clone()));
        }
        tasks.spawn(
            self.auditor
                .clone()
                .run(config.relay.audit_interval(), cancel.clone()),
        );
        let maintenance = Maintenance::new(
            self.engine.clone(),
            self.auditor.clone(),
            self.devices.clone(),
            self.registry.clone(),
            self.hub.clone(),
            self.settings.strike_ttl,
        );
        tasks.spawn(maintenance.run(config.relay.gc_interval(), cancel.clone()));
    }

    /// Bring up persisted bots and devices. Individual failures are logged.
    async fn resume(&self) {
        match self.registry.ensure_all_active().await {
            Ok(running) => info!(running, "bots resumed"),
            Err(e) => warn!(error = %e, "could not list active bots"),
        }
        match self.devices.attach_all().await {
            Ok(attached) => info!(attached, "devices resumed"),
            Err(e) => warn!(error = %e, "could not list devices"),
        }
    }

    async fn shutdown(&self) {
        self.devices.shutdown().await;
        self.registry.shutdown().await;
        if let Err(e) = self.store.database().checkpoint().await {
            warn!(error = %e, "final WAL checkpoint failed");
        }
    }
}

/// Run until SIGINT/SIGTERM, then shut down in order: HTTP, loops, devices,
/// bots, storage.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    telemetry::init_tracing(&config.logging.level);
    info!("starting courier serve");

    let prometheus_render = telemetry::install_metrics();
    let mut services = Services::build(&config).await?;
    let cancel = shutdown::install_signal_handler();

    services.resume().await;

    let mut tasks = JoinSet::new();
    services.spawn_loops(&config, &cancel, &mut tasks);

    let state = services.gateway_state(&config, prometheus_render);
    let served = courier_gateway::start_server(&config.server, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with an error");
    }

    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    services.shutdown().await;

    info!("courier serve shutdown complete");
    served
}
