//! Status payload → entity state mapping.
//!
//! [`map_status`] is a pure function from one raw `status` response to one
//! complete [`EntityState`] snapshot. Server-reported values are trusted
//! verbatim (including zero or absent durations); absent or non-numeric
//! fields become zeros rather than errors, and an empty playlist queue
//! clears the track fields instead of inventing placeholders.

use serde_json::Value;

use crate::entity::{EntityState, MediaInfo, MediaKind, PlaybackState, RepeatMode};
use crate::gateway::artwork_url;

/// Map a raw player status payload into a full attribute snapshot.
///
/// Decision table for `playback_state`:
/// power=0 → Off; else mode "play" → Playing, "pause" → Paused,
/// "stop" → On, anything else → Idle. An absent mode reads as "stop",
/// matching the server's own default.
pub fn map_status(raw: &Value, base_url: &str) -> EntityState {
    let power = num_i64(raw.get("power"));
    let mode = raw.get("mode").and_then(|v| v.as_str()).unwrap_or("stop");

    let playback_state = if power == 0 {
        PlaybackState::Off
    } else {
        match mode {
            "play" => PlaybackState::Playing,
            "pause" => PlaybackState::Paused,
            "stop" => PlaybackState::On,
            _ => PlaybackState::Idle,
        }
    };

    let track = raw
        .get("playlist_loop")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());

    let media = match track {
        Some(track) => MediaInfo {
            title: str_field(track, "title"),
            artist: str_field(track, "artist"),
            album: str_field(track, "album"),
            duration_seconds: num_f64(raw.get("duration")) as u64,
            position_seconds: num_f64(raw.get("time")) as u64,
            cover_ref: cover_id(track).map(|id| artwork_url(base_url, &id)),
            media_type: MediaKind::Music,
        },
        // No queued track: clear metadata to empty, not "unknown" placeholders
        None => MediaInfo {
            duration_seconds: num_f64(raw.get("duration")) as u64,
            position_seconds: num_f64(raw.get("time")) as u64,
            ..MediaInfo::default()
        },
    };

    EntityState {
        playback_state,
        volume: num_i64(raw.get("mixer volume")).clamp(0, 100) as u8,
        muted: num_i64(raw.get("mixer muting")) != 0,
        media,
        repeat_mode: RepeatMode::from_lms(num_i64(raw.get("playlist repeat"))),
        shuffle: num_i64(raw.get("playlist shuffle")) != 0,
        sync_members: sync_members(raw),
    }
}

/// Coerce a JSON value to i64: numbers directly, numeric strings parsed,
/// anything else zero.
fn num_i64(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    }
}

/// Coerce a JSON value to f64 with the same tolerance as [`num_i64`].
fn num_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Cover id may arrive as a string or a bare number.
fn cover_id(track: &Value) -> Option<String> {
    track.get("coverid").and_then(|v| {
        v.as_str()
            .map(|s| s.to_string())
            .or_else(|| v.as_i64().map(|n| n.to_string()))
    })
}

/// Sync group membership from `sync_slaves` (comma-joined player ids).
fn sync_members(raw: &Value) -> Vec<String> {
    let sync_master = raw.get("sync_master").and_then(|v| v.as_str()).unwrap_or("");
    let sync_slaves = raw.get("sync_slaves").and_then(|v| v.as_str()).unwrap_or("");

    if sync_master.is_empty() && sync_slaves.is_empty() {
        return Vec::new();
    }

    sync_slaves
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
