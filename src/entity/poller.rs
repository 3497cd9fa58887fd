//! Per-entity background polling.
//!
//! Each entity owns at most one polling task. `start` is an idempotent
//! Stopped→Running transition; `stop` cancels the loop and awaits its
//! actual termination, so callers can assume no further state writes or
//! publishes once `stop` returns. A transient fetch failure degrades the
//! published state to `Unavailable` and backs off; it never ends the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entity::mapping::map_status;
use crate::entity::{EntityState, PlaybackState};
use crate::gateway::ServerGateway;
use crate::hub::HubRegistry;

/// Default poll cadence while playing; the persisted `polling_interval`
/// overrides it.
pub const DEFAULT_PLAYING_INTERVAL: Duration = Duration::from_secs(2);
const PAUSED_INTERVAL: Duration = Duration::from_secs(5);
const IDLE_INTERVAL: Duration = Duration::from_secs(10);
/// Fixed backoff after a failed status fetch.
const FAILURE_BACKOFF: Duration = Duration::from_secs(10);

/// What one entity's poll iterations need; shared with the spawned loop
/// and with the dispatcher's deferred refresh.
struct Shared {
    entity_id: String,
    player_id: String,
    gateway: Arc<dyn ServerGateway>,
    state: Arc<RwLock<EntityState>>,
    registry: Arc<dyn HubRegistry>,
}

struct PollTask {
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Background poller for one entity. States: Stopped (no task) / Running.
pub struct Poller {
    shared: Arc<Shared>,
    playing_interval: Duration,
    task: Mutex<Option<PollTask>>,
}

impl Poller {
    pub fn new(
        entity_id: String,
        player_id: String,
        gateway: Arc<dyn ServerGateway>,
        state: Arc<RwLock<EntityState>>,
        registry: Arc<dyn HubRegistry>,
        playing_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                entity_id,
                player_id,
                gateway,
                state,
                registry,
            }),
            playing_interval,
            task: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. No-op when already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(existing) = task.as_ref() {
            if !existing.join.is_finished() {
                info!(entity = %self.shared.entity_id, "polling already active");
                return;
            }
        }

        let token = CancellationToken::new();
        let shared = self.shared.clone();
        let playing_interval = self.playing_interval;
        let loop_token = token.clone();
        let join = tokio::spawn(async move {
            run_loop(shared, playing_interval, loop_token).await;
        });

        *task = Some(PollTask { token, join });
        info!(entity = %self.shared.entity_id, "started polling");
    }

    /// Cancel the loop and wait for it to exit. After this returns, no
    /// further snapshot is written or published by the loop, even if a
    /// fetch was in flight at cancellation.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(PollTask { token, join }) = task.take() {
            token.cancel();
            if let Err(e) = join.await {
                warn!(entity = %self.shared.entity_id, "polling task join failed: {}", e);
            }
            info!(entity = %self.shared.entity_id, "stopped polling");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.join.is_finished())
    }

    /// One synchronous fetch-map-publish pass. Used for the initial refresh
    /// on subscribe and by the dispatcher's deferred post-command refresh.
    pub async fn refresh(&self) {
        refresh_once(&self.shared).await;
    }
}

/// Fetch current status, map it into a snapshot, store and publish it.
/// On failure the state degrades to `Unavailable` and the degraded
/// snapshot is still published so subscribers see staleness explicitly.
/// Returns whether the fetch succeeded.
async fn refresh_once(shared: &Shared) -> bool {
    match shared.gateway.player_status(&shared.player_id).await {
        Ok(raw) => {
            let snapshot = map_status(&raw, shared.gateway.base_url());
            *shared.state.write().await = snapshot.clone();
            shared.registry.update(&shared.entity_id, &snapshot);
            true
        }
        Err(e) => {
            warn!(entity = %shared.entity_id, "status fetch failed: {}", e);
            let snapshot = {
                let mut state = shared.state.write().await;
                state.playback_state = PlaybackState::Unavailable;
                state.clone()
            };
            shared.registry.update(&shared.entity_id, &snapshot);
            false
        }
    }
}

async fn run_loop(shared: Arc<Shared>, playing_interval: Duration, token: CancellationToken) {
    debug!(entity = %shared.entity_id, "polling loop started");

    loop {
        let ok = tokio::select! {
            _ = token.cancelled() => break,
            ok = refresh_once(&shared) => ok,
        };

        let interval = if ok {
            match shared.state.read().await.playback_state {
                PlaybackState::Playing => playing_interval,
                PlaybackState::Paused => PAUSED_INTERVAL,
                _ => IDLE_INTERVAL,
            }
        } else {
            FAILURE_BACKOFF
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(entity = %shared.entity_id, "polling loop exited");
}
