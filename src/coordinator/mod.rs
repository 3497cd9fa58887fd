//! Entity lifecycle coordination.
//!
//! Owns the set of active entities and serializes every (re)build behind a
//! single initialization lock: a connect event, a subscribe-before-ready
//! recovery and an explicit reconfiguration can all race, but at most one
//! rebuild runs and later callers observe its outcome. Pollers belonging to
//! a cleared generation are stopped and awaited before the next generation
//! registers anything, and a gateway failure mid-build reverts to
//! Uninitialized without partially registering entities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::entity::dispatch::{Dispatcher, ExecStatus};
use crate::entity::poller::Poller;
use crate::entity::{entity_id_for, EntityState, PlayerRef};
use crate::gateway::{LmsGateway, ServerGateway};
use crate::hub::{DeviceState, HubRegistry};

/// Lifecycle phase of the entity set as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
}

/// One registered player: its identity, state, poller and dispatcher share
/// the same lifetime and are destroyed together on rebuild.
struct Entity {
    entity_id: String,
    player: PlayerRef,
    poller: Arc<Poller>,
    dispatcher: Dispatcher,
}

pub struct Coordinator {
    registry: Arc<dyn HubRegistry>,
    config: RwLock<BridgeConfig>,
    phase: RwLock<Phase>,
    entities: RwLock<HashMap<String, Arc<Entity>>>,
    gateway: RwLock<Option<Arc<dyn ServerGateway>>>,
    /// Serializes every (re)build across all entities.
    init_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(config: BridgeConfig, registry: Arc<dyn HubRegistry>) -> Self {
        Self {
            registry,
            config: RwLock::new(config),
            phase: RwLock::new(Phase::Uninitialized),
            entities: RwLock::new(HashMap::new()),
            gateway: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    pub async fn entity_ids(&self) -> Vec<String> {
        self.entities.read().await.keys().cloned().collect()
    }

    /// Gateway of the current generation, if initialized.
    pub async fn gateway(&self) -> Option<Arc<dyn ServerGateway>> {
        self.gateway.read().await.clone()
    }

    /// Build entities for all configured players. Re-entrant: a second
    /// caller blocks on the lock and then observes the first's result
    /// instead of rebuilding. Returns whether the set is Ready.
    pub async fn initialize(&self) -> bool {
        let _guard = self.init_lock.lock().await;

        if *self.phase.read().await == Phase::Ready {
            debug!("entities already initialized");
            return true;
        }

        let config = self.config.read().await.clone();
        if !config.is_configured() {
            info!("integration not configured yet");
            return false;
        }

        info!("initializing entities for configured players");
        *self.phase.write().await = Phase::Initializing;
        self.registry.set_device_state(DeviceState::Connecting);

        // The previous generation must be fully stopped before anything new
        // registers
        self.clear_entities().await;

        let gateway: Arc<dyn ServerGateway> =
            Arc::new(LmsGateway::new(&config.server_host, config.server_port));

        let version = match gateway.version().await {
            Ok(version) => version,
            Err(e) => {
                error!("failed to connect to LMS during initialization: {}", e);
                *self.phase.write().await = Phase::Uninitialized;
                self.registry.set_device_state(DeviceState::Error);
                return false;
            }
        };
        info!("connected to LMS version {}", version);

        // Favorites failure is non-fatal; entities still work without them
        let favorites = match gateway.favorites().await {
            Ok(favorites) => {
                info!("loaded {} favorites from LMS", favorites.len());
                favorites
            }
            Err(e) => {
                error!("failed to load favorites: {}", e);
                Vec::new()
            }
        };
        let favorites = Arc::new(favorites);

        let players: Arc<Vec<PlayerRef>> = Arc::new(
            config
                .enabled_players()
                .map(|p| PlayerRef {
                    player_id: p.player_id.clone(),
                    name: p.name.clone(),
                    model: p.model.clone(),
                })
                .collect(),
        );

        let playing_interval = Duration::from_secs(config.polling_interval.max(1));

        let mut entities = HashMap::new();
        for player in players.iter() {
            let entity_id = entity_id_for(&player.name);
            let state = Arc::new(RwLock::new(EntityState::default()));
            let poller = Arc::new(Poller::new(
                entity_id.clone(),
                player.player_id.clone(),
                gateway.clone(),
                state.clone(),
                self.registry.clone(),
                playing_interval,
            ));
            let dispatcher = Dispatcher::new(
                entity_id.clone(),
                player.player_id.clone(),
                gateway.clone(),
                state,
                self.registry.clone(),
                poller.clone(),
                players.clone(),
                favorites.clone(),
            );

            self.registry.add_entity(&entity_id, &player.name);
            info!(entity = %entity_id, player = %player.player_id, "added entity");

            entities.insert(
                entity_id.clone(),
                Arc::new(Entity {
                    entity_id,
                    player: player.clone(),
                    poller,
                    dispatcher,
                }),
            );
        }

        let count = entities.len();
        *self.entities.write().await = entities;
        *self.gateway.write().await = Some(gateway);
        *self.phase.write().await = Phase::Ready;
        self.registry.set_device_state(DeviceState::Connected);
        info!("entity initialization complete: {} entities", count);
        true
    }

    /// Replace the configuration and rebuild. A changed server address gets
    /// a fresh gateway; this is the only teardown of the shared connection
    /// besides process exit.
    pub async fn reconfigure(&self, config: BridgeConfig) -> bool {
        {
            let _guard = self.init_lock.lock().await;
            *self.config.write().await = config;
            *self.phase.write().await = Phase::Uninitialized;
        }
        self.initialize().await
    }

    /// Hub (re)connected. Initializes if needed; otherwise just reports the
    /// current status upstream.
    pub async fn on_hub_connect(&self) {
        info!("hub connected");

        if self.config.read().await.is_configured() {
            if *self.phase.read().await == Phase::Ready {
                self.registry.set_device_state(DeviceState::Connected);
            } else {
                self.initialize().await;
            }
        } else {
            self.registry.set_device_state(DeviceState::Disconnected);
        }
    }

    /// Hub disconnected. Pauses entity polling but keeps the gateway and
    /// its connection alive for the reconnect.
    pub async fn on_hub_disconnect(&self) {
        info!("hub disconnected - stopping polling loops");

        let entities: Vec<_> = self.entities.read().await.values().cloned().collect();
        for entity in entities {
            entity.poller.stop().await;
        }
    }

    /// Entities subscribed by the hub. Pushes a fresh snapshot before the
    /// loop starts so the first observed state is never stale. Arriving
    /// before Ready triggers an initialization recovery attempt.
    pub async fn subscribe(&self, entity_ids: &[String]) {
        if *self.phase.read().await != Phase::Ready {
            warn!("subscription before entities ready - attempting recovery");
            if !self.initialize().await {
                error!("recovery failed - entities still not ready");
                return;
            }
        }

        for entity_id in entity_ids {
            let entity = self.entities.read().await.get(entity_id).cloned();
            match entity {
                Some(entity) => {
                    info!(entity = %entity_id, "subscribed");
                    entity.poller.refresh().await;
                    entity.poller.start().await;
                }
                None => warn!(entity = %entity_id, "subscribe for unknown entity"),
            }
        }
    }

    /// Entities unsubscribed by the hub; their polling stops.
    pub async fn unsubscribe(&self, entity_ids: &[String]) {
        for entity_id in entity_ids {
            let entity = self.entities.read().await.get(entity_id).cloned();
            if let Some(entity) = entity {
                info!(entity = %entity_id, "unsubscribed");
                entity.poller.stop().await;
            }
        }
    }

    /// Route a hub command to the owning entity's dispatcher.
    pub async fn handle_command(
        &self,
        entity_id: &str,
        cmd_id: &str,
        params: Option<&Value>,
    ) -> ExecStatus {
        let entity = self.entities.read().await.get(entity_id).cloned();
        match entity {
            Some(entity) => entity.dispatcher.handle(cmd_id, params).await,
            None => {
                warn!(entity = %entity_id, "command for unknown entity");
                ExecStatus::NotFound
            }
        }
    }

    /// Player name for an entity, if registered.
    pub async fn player_for(&self, entity_id: &str) -> Option<PlayerRef> {
        self.entities
            .read()
            .await
            .get(entity_id)
            .map(|e| e.player.clone())
    }

    /// Final shutdown: stop every poller. The gateway drops with the
    /// process.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.clear_entities().await;
        *self.gateway.write().await = None;
        *self.phase.write().await = Phase::Uninitialized;
    }

    /// Stop and await all pollers, then deregister the entities.
    async fn clear_entities(&self) {
        let old: Vec<Arc<Entity>> = {
            let mut entities = self.entities.write().await;
            entities.drain().map(|(_, e)| e).collect()
        };

        for entity in &old {
            entity.poller.stop().await;
            self.registry.remove_entity(&entity.entity_id);
        }
    }
}
