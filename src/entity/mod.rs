//! Normalized entity model for one LMS player.
//!
//! [`EntityState`] is the attribute snapshot published toward the hub; it is
//! written as a whole by the polling engine ([`poller`]) and patched by the
//! dispatcher's optimistic volume updates ([`dispatch`]). Consumers must not
//! treat media fields as current while `playback_state` is `Unavailable`.

pub mod dispatch;
pub mod mapping;
pub mod poller;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical player, as configured or discovered.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    /// Stable player address (MAC-like string).
    pub player_id: String,
    pub name: String,
    pub model: String,
}

/// Playback state of a player entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Off,
    On,
    Playing,
    Paused,
    Idle,
    /// The player's server session is unreachable; all other fields are stale.
    Unavailable,
    #[default]
    Unknown,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::On => write!(f, "on"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Idle => write!(f, "idle"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Playlist repeat mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// LMS `playlist repeat` integer for this mode.
    pub fn as_lms(self) -> &'static str {
        match self {
            Self::Off => "0",
            Self::One => "1",
            Self::All => "2",
        }
    }

    /// Map the LMS `playlist repeat` integer; unrecognized values fall back
    /// to `Off`.
    pub fn from_lms(value: i64) -> Self {
        match value {
            1 => Self::One,
            2 => Self::All,
            _ => Self::Off,
        }
    }
}

/// Kind of media currently loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Music,
    Radio,
}

/// Currently loaded track metadata. Cleared (not "unknown") when the
/// playlist queue is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: u64,
    pub position_seconds: u64,
    /// Artwork URL built from the server's cover id, never inlined bytes.
    pub cover_ref: Option<String>,
    pub media_type: MediaKind,
}

/// Mutable attribute snapshot for one player entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub playback_state: PlaybackState,
    /// 0-100.
    pub volume: u8,
    pub muted: bool,
    pub media: MediaInfo,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    /// Player ids currently grouped with this player.
    pub sync_members: Vec<String>,
}

/// Favorite shortcut, loaded once per initialization cycle. The 1-based
/// `index` is the public command vocabulary ("play favorite N") and stays
/// stable until the next rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorite {
    pub index: usize,
    pub id: String,
    pub name: String,
}

/// Lowercase a display name and collapse every non-alphanumeric run to a
/// single underscore. Shared by entity ids and sync-target command names.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Entity id for a player, derived from its display name.
pub fn entity_id_for(name: &str) -> String {
    format!("media_player.{}", sanitize_name(name))
}
