//! Hub command handling for one entity.
//!
//! Inbound `(command id, params)` pairs are parsed into the closed
//! [`Command`] enum before anything touches the gateway, so a malformed
//! request can never leave partial side effects. Resolution failures
//! (favorite index out of range, unknown sync target) are likewise decided
//! against the lists captured at initialization before any call goes out.
//!
//! After a successful command a one-shot deferred refresh re-fetches status
//! so the visible effect lands fast. Pure volume deltas are the exception:
//! they get an immediate optimistic local update instead, since the next
//! regular poll tick is imminent and rapid repeated volume presses should
//! not multiply round trips.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::entity::poller::Poller;
use crate::entity::{sanitize_name, EntityState, Favorite, PlayerRef, RepeatMode};
use crate::error::CommandError;
use crate::gateway::{ServerGateway, VOLUME_STEP};
use crate::hub::HubRegistry;

/// Delay before the post-command status refresh, letting the server's own
/// state settle.
const DEFERRED_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Uniform command outcome reported back to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Ok,
    BadRequest,
    NotFound,
    NotImplemented,
    ServerError,
}

impl From<CommandError> for ExecStatus {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Validation(_) => ExecStatus::BadRequest,
            CommandError::NotFound(_) => ExecStatus::NotFound,
            CommandError::Unsupported(_) => ExecStatus::NotImplemented,
            CommandError::Gateway(_) => ExecStatus::ServerError,
        }
    }
}

/// The full command surface accepted from the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    PlayPause,
    SetVolume(u8),
    VolumeUp,
    VolumeDown,
    Mute,
    Unmute,
    MuteToggle,
    PowerOn,
    PowerOff,
    PowerToggle,
    Seek(u64),
    Repeat(RepeatMode),
    Shuffle(bool),
    /// Sanitized display name of the player to group with.
    Sync(String),
    Unsync,
    /// Sleep timer in minutes; 0 cancels.
    Sleep(u32),
    PlaylistClear,
    AddRandomSongs(u32),
    AddRandomAlbums(u32),
    /// 1-based display index into the favorites captured at initialization.
    Favorite(usize),
}

impl Command {
    /// Parse a hub command identifier plus optional params. Parameterized
    /// commands with a missing or malformed parameter fail validation here,
    /// before any gateway call; unknown identifiers are unsupported.
    pub fn parse(cmd_id: &str, params: Option<&Value>) -> Result<Command, CommandError> {
        match cmd_id {
            "play" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "stop" => Ok(Command::Stop),
            "next" => Ok(Command::Next),
            "previous" | "prev" => Ok(Command::Previous),
            "play_pause" => Ok(Command::PlayPause),

            "volume" => param_u64(params, "volume")
                .map(|v| Command::SetVolume(v.min(100) as u8))
                .ok_or_else(|| CommandError::Validation("volume requires a level".into())),
            "volume_up" => Ok(Command::VolumeUp),
            "volume_down" => Ok(Command::VolumeDown),

            "mute" => Ok(Command::Mute),
            "unmute" => Ok(Command::Unmute),
            "mute_toggle" => Ok(Command::MuteToggle),

            "on" | "power_on" => Ok(Command::PowerOn),
            "off" | "power_off" => Ok(Command::PowerOff),
            "toggle" | "power_toggle" => Ok(Command::PowerToggle),

            "seek" => param_u64(params, "media_position")
                .map(Command::Seek)
                .ok_or_else(|| CommandError::Validation("seek requires media_position".into())),

            "repeat" => match param_str(params, "repeat").map(|s| s.to_ascii_uppercase()) {
                Some(mode) => match mode.as_str() {
                    "OFF" => Ok(Command::Repeat(RepeatMode::Off)),
                    "ONE" => Ok(Command::Repeat(RepeatMode::One)),
                    "ALL" => Ok(Command::Repeat(RepeatMode::All)),
                    other => Err(CommandError::Validation(format!(
                        "unknown repeat mode: {}",
                        other
                    ))),
                },
                None => Err(CommandError::Validation("repeat requires a mode".into())),
            },

            "shuffle" => param_bool(params, "shuffle")
                .map(Command::Shuffle)
                .ok_or_else(|| CommandError::Validation("shuffle requires a flag".into())),

            "sync" => param_str(params, "target")
                .map(|t| Command::Sync(sanitize_name(&t)))
                .ok_or_else(|| CommandError::Validation("sync requires a target".into())),
            "UNSYNC" | "unsync" => Ok(Command::Unsync),

            "sleep" => param_u64(params, "minutes")
                .map(|m| Command::Sleep(m as u32))
                .ok_or_else(|| CommandError::Validation("sleep requires minutes".into())),
            "sleep_cancel" => Ok(Command::Sleep(0)),

            "playlist_clear" => Ok(Command::PlaylistClear),
            "playlist_add_songs" => {
                Ok(Command::AddRandomSongs(param_u64(params, "count").unwrap_or(10) as u32))
            }
            "playlist_add_albums" => {
                Ok(Command::AddRandomAlbums(param_u64(params, "count").unwrap_or(5) as u32))
            }
            // Fixed-count identifiers kept from the remote's simple-command set
            "playlist_add_10_songs" => Ok(Command::AddRandomSongs(10)),
            "playlist_add_5_albums" => Ok(Command::AddRandomAlbums(5)),

            other => {
                if let Some(target) = other.strip_prefix("SYNC_") {
                    if target.is_empty() {
                        return Err(CommandError::Validation("sync requires a target".into()));
                    }
                    return Ok(Command::Sync(sanitize_name(target)));
                }
                if let Some(suffix) = other.strip_prefix("favorite_") {
                    return suffix
                        .parse::<usize>()
                        .map(Command::Favorite)
                        .map_err(|_| {
                            CommandError::Validation(format!("bad favorite index: {}", suffix))
                        });
                }
                if other == "favorite" {
                    return param_u64(params, "favorite")
                        .map(|n| Command::Favorite(n as usize))
                        .ok_or_else(|| {
                            CommandError::Validation("favorite requires an index".into())
                        });
                }
                if let Some(suffix) = other.strip_prefix("sleep_") {
                    return suffix.parse::<u32>().map(Command::Sleep).map_err(|_| {
                        CommandError::Validation(format!("bad sleep duration: {}", suffix))
                    });
                }
                Err(CommandError::Unsupported(other.to_string()))
            }
        }
    }

    /// Volume deltas skip the deferred refresh and update locally instead.
    fn is_volume_delta(&self) -> bool {
        matches!(
            self,
            Command::SetVolume(_) | Command::VolumeUp | Command::VolumeDown
        )
    }
}

fn param_u64(params: Option<&Value>, key: &str) -> Option<u64> {
    let value = params?.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn param_str(params: Option<&Value>, key: &str) -> Option<String> {
    params?.get(key)?.as_str().map(|s| s.to_string())
}

fn param_bool(params: Option<&Value>, key: &str) -> Option<bool> {
    let value = params?.get(key)?;
    value.as_bool().or_else(|| value.as_i64().map(|n| n != 0))
}

/// Per-entity command dispatcher. Shares the gateway and entity state with
/// the polling engine; favorite and player lists are the ones captured at
/// initialization.
pub struct Dispatcher {
    entity_id: String,
    player_id: String,
    gateway: Arc<dyn ServerGateway>,
    state: Arc<RwLock<EntityState>>,
    registry: Arc<dyn HubRegistry>,
    poller: Arc<Poller>,
    players: Arc<Vec<PlayerRef>>,
    favorites: Arc<Vec<Favorite>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity_id: String,
        player_id: String,
        gateway: Arc<dyn ServerGateway>,
        state: Arc<RwLock<EntityState>>,
        registry: Arc<dyn HubRegistry>,
        poller: Arc<Poller>,
        players: Arc<Vec<PlayerRef>>,
        favorites: Arc<Vec<Favorite>>,
    ) -> Self {
        Self {
            entity_id,
            player_id,
            gateway,
            state,
            registry,
            poller,
            players,
            favorites,
        }
    }

    /// Parse and execute one hub command, reducing every failure to a
    /// status code. Nothing raised here crosses back to the caller.
    pub async fn handle(&self, cmd_id: &str, params: Option<&Value>) -> ExecStatus {
        debug!(entity = %self.entity_id, command = cmd_id, "handling command");

        let command = match Command::parse(cmd_id, params) {
            Ok(command) => command,
            Err(e) => {
                warn!(entity = %self.entity_id, command = cmd_id, "rejected: {}", e);
                return e.into();
            }
        };

        match self.execute(command).await {
            Ok(()) => ExecStatus::Ok,
            Err(e) => {
                warn!(entity = %self.entity_id, command = cmd_id, "failed: {}", e);
                e.into()
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<(), CommandError> {
        let gw = self.gateway.as_ref();
        let pid = self.player_id.as_str();
        let defer = !command.is_volume_delta();

        match command {
            Command::Play => gw.play(pid).await?,
            Command::Pause => gw.pause(pid).await?,
            Command::Stop => gw.stop(pid).await?,
            Command::Next => gw.next_track(pid).await?,
            Command::Previous => gw.previous_track(pid).await?,
            Command::PlayPause => gw.play_pause(pid).await?,

            Command::SetVolume(level) => {
                gw.set_volume(pid, level).await?;
                self.apply_volume(level).await;
            }
            Command::VolumeUp => {
                gw.volume_up(pid, VOLUME_STEP).await?;
                let current = self.state.read().await.volume;
                self.apply_volume(current.saturating_add(VOLUME_STEP).min(100))
                    .await;
            }
            Command::VolumeDown => {
                gw.volume_down(pid, VOLUME_STEP).await?;
                let current = self.state.read().await.volume;
                self.apply_volume(current.saturating_sub(VOLUME_STEP)).await;
            }

            Command::Mute => gw.mute(pid).await?,
            Command::Unmute => gw.unmute(pid).await?,
            Command::MuteToggle => gw.toggle_mute(pid).await?,

            Command::PowerOn => {
                // ON both powers up and starts playback
                gw.power_on(pid).await?;
                gw.play(pid).await?;
            }
            Command::PowerOff => gw.power_off(pid).await?,
            Command::PowerToggle => gw.toggle_power(pid).await?,

            Command::Seek(position) => gw.seek(pid, position).await?,
            Command::Repeat(mode) => gw.set_repeat(pid, mode).await?,
            Command::Shuffle(flag) => gw.set_shuffle(pid, flag).await?,

            Command::Sync(target_name) => {
                let target = self
                    .players
                    .iter()
                    .find(|p| sanitize_name(&p.name) == target_name)
                    .ok_or_else(|| {
                        CommandError::NotFound(format!("sync target: {}", target_name))
                    })?;
                gw.sync(pid, &target.player_id).await?;
            }
            Command::Unsync => gw.unsync(pid).await?,

            Command::Sleep(minutes) => gw.set_sleep(pid, u64::from(minutes) * 60).await?,

            Command::PlaylistClear => gw.playlist_clear(pid).await?,
            Command::AddRandomSongs(count) => gw.add_random_songs(pid, count).await?,
            Command::AddRandomAlbums(count) => gw.add_random_albums(pid, count).await?,

            Command::Favorite(index) => {
                let favorite = self
                    .favorites
                    .iter()
                    .find(|f| f.index == index)
                    .filter(|f| !f.id.is_empty())
                    .ok_or_else(|| {
                        CommandError::NotFound(format!(
                            "favorite {} (have {})",
                            index,
                            self.favorites.len()
                        ))
                    })?;
                gw.play_favorite(pid, &favorite.id).await?;
            }
        }

        if defer {
            self.schedule_deferred_refresh();
        }
        Ok(())
    }

    /// Optimistic local volume update, published immediately. The next poll
    /// tick reconciles against server truth.
    async fn apply_volume(&self, level: u8) {
        let snapshot = {
            let mut state = self.state.write().await;
            state.volume = level;
            state.clone()
        };
        self.registry.update(&self.entity_id, &snapshot);
    }

    /// One-shot refresh shortly after a command, through the same
    /// fetch-map-publish path as the poll loop. Racing a regular tick is
    /// tolerated; both converge to server truth.
    fn schedule_deferred_refresh(&self) {
        let poller = self.poller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEFERRED_REFRESH_DELAY).await;
            poller.refresh().await;
        });
    }
}
