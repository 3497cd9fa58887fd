//! LMS JSON-RPC gateway.
//!
//! Implements the `slim.request` protocol over HTTP
//! (`http://HOST:9000/jsonrpc.js`). One [`LmsGateway`] holds one reusable
//! HTTP client shared by every entity's polling and command path; it is
//! created at initialization and only replaced when the server address
//! changes. The gateway returns artwork as a URL reference, never decoded
//! bytes; inline payloads are unsafe over the upstream transport.
//!
//! Protocol documentation: http://HOST:9000/html/docs/cli-api.html

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::entity::{Favorite, RepeatMode};
use crate::error::GatewayError;

/// Default LMS JSON-RPC port.
pub const DEFAULT_PORT: u16 = 9000;
/// Per-request timeout. Bounds how long a hung request can delay polling
/// loop cancellation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Status metadata tags: artist (uppercase!), album, title, duration, coverid.
const STATUS_TAGS: &str = "tags:Aaltdc";
/// Mixer step for relative volume commands.
pub const VOLUME_STEP: u8 = 5;

/// Player entry from the server's `players` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub player_id: String,
    pub name: String,
    pub model: String,
    pub model_name: String,
    pub ip: String,
    pub connected: bool,
}

/// Server gateway port. `call` is the single wire primitive; every derived
/// operation is a thin wrapping of it, so test doubles only implement `call`.
#[async_trait]
pub trait ServerGateway: Send + Sync {
    /// Base URL of the server, e.g. `http://10.0.0.5:9000`.
    fn base_url(&self) -> &str;

    /// Issue one JSON-RPC request. `player_id` is empty for server-level
    /// commands. Fails with [`GatewayError::Transport`] on connect/timeout/
    /// non-2xx and [`GatewayError::Protocol`] on an unparseable response.
    async fn call(&self, player_id: &str, tokens: Vec<Value>) -> Result<Value, GatewayError>;

    /// Server version string.
    async fn version(&self) -> Result<String, GatewayError> {
        let result = self.call("", vec![json!("version"), json!("?")]).await?;
        Ok(result
            .get("_version")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string())
    }

    /// Raw server status (player counts, library totals).
    async fn server_status(&self) -> Result<Value, GatewayError> {
        self.call("", vec![json!("serverstatus"), json!("0"), json!("100")])
            .await
    }

    /// Full player status with track metadata tags. Returned raw; the
    /// entity mapping layer owns the interpretation.
    async fn player_status(&self, player_id: &str) -> Result<Value, GatewayError> {
        self.call(
            player_id,
            vec![json!("status"), json!("-"), json!("1"), json!(STATUS_TAGS)],
        )
        .await
    }

    /// All players known to the server.
    async fn players(&self) -> Result<Vec<PlayerInfo>, GatewayError> {
        let result = self
            .call("", vec![json!("players"), json!("0"), json!("999")])
            .await?;
        Ok(parse_players(&result))
    }

    /// Server-stored favorites, display-indexed 1-based in listing order.
    async fn favorites(&self) -> Result<Vec<Favorite>, GatewayError> {
        let result = self
            .call(
                "",
                vec![json!("favorites"), json!("items"), json!("0"), json!("100")],
            )
            .await?;
        Ok(parse_favorites(&result))
    }

    async fn play(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("play")]).await.map(drop)
    }

    async fn pause(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("pause"), json!("1")])
            .await
            .map(drop)
    }

    async fn stop(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("stop")]).await.map(drop)
    }

    /// Bare `pause` toggles between play and pause.
    async fn play_pause(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("pause")]).await.map(drop)
    }

    async fn next_track(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("playlist"), json!("index"), json!("+1")])
            .await
            .map(drop)
    }

    async fn previous_track(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("playlist"), json!("index"), json!("-1")])
            .await
            .map(drop)
    }

    async fn seek(&self, player_id: &str, position: u64) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("time"), json!(position.to_string())])
            .await
            .map(drop)
    }

    async fn set_volume(&self, player_id: &str, level: u8) -> Result<(), GatewayError> {
        let level = level.min(100);
        self.call(
            player_id,
            vec![json!("mixer"), json!("volume"), json!(level.to_string())],
        )
        .await
        .map(drop)
    }

    async fn volume_up(&self, player_id: &str, step: u8) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("mixer"), json!("volume"), json!(format!("+{}", step))],
        )
        .await
        .map(drop)
    }

    async fn volume_down(&self, player_id: &str, step: u8) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("mixer"), json!("volume"), json!(format!("-{}", step))],
        )
        .await
        .map(drop)
    }

    async fn mute(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("mixer"), json!("muting"), json!("1")])
            .await
            .map(drop)
    }

    async fn unmute(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("mixer"), json!("muting"), json!("0")])
            .await
            .map(drop)
    }

    async fn toggle_mute(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("mixer"), json!("muting"), json!("toggle")],
        )
        .await
        .map(drop)
    }

    async fn power_on(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("power"), json!("1")])
            .await
            .map(drop)
    }

    async fn power_off(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("power"), json!("0")])
            .await
            .map(drop)
    }

    /// Bare `power` toggles.
    async fn toggle_power(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("power")]).await.map(drop)
    }

    async fn set_repeat(&self, player_id: &str, mode: RepeatMode) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("playlist"), json!("repeat"), json!(mode.as_lms())],
        )
        .await
        .map(drop)
    }

    async fn set_shuffle(&self, player_id: &str, shuffle: bool) -> Result<(), GatewayError> {
        let flag = if shuffle { "1" } else { "0" };
        self.call(
            player_id,
            vec![json!("playlist"), json!("shuffle"), json!(flag)],
        )
        .await
        .map(drop)
    }

    /// Join `player_id` to `target_id`'s sync group. The identity on the
    /// wire is always the stable player address, never a display name.
    async fn sync(&self, player_id: &str, target_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("sync"), json!(target_id)])
            .await
            .map(drop)
    }

    async fn unsync(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("sync"), json!("-")])
            .await
            .map(drop)
    }

    /// Sleep timer in seconds; 0 cancels.
    async fn set_sleep(&self, player_id: &str, seconds: u64) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("sleep"), json!(seconds.to_string())])
            .await
            .map(drop)
    }

    async fn playlist_clear(&self, player_id: &str) -> Result<(), GatewayError> {
        self.call(player_id, vec![json!("playlist"), json!("clear")])
            .await
            .map(drop)
    }

    async fn add_random_songs(&self, player_id: &str, count: u32) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("randomplay"), json!("tracks"), json!(count.to_string())],
        )
        .await
        .map(drop)
    }

    async fn add_random_albums(&self, player_id: &str, count: u32) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![json!("randomplay"), json!("albums"), json!(count.to_string())],
        )
        .await
        .map(drop)
    }

    async fn play_favorite(&self, player_id: &str, favorite_id: &str) -> Result<(), GatewayError> {
        self.call(
            player_id,
            vec![
                json!("favorites"),
                json!("playlist"),
                json!("play"),
                json!(format!("item_id:{}", favorite_id)),
            ],
        )
        .await
        .map(drop)
    }

    /// Artwork URL for a cover id. A reference only; the gateway never
    /// fetches or transcodes image bytes.
    fn artwork_url(&self, coverid: &str) -> String {
        artwork_url(self.base_url(), coverid)
    }
}

/// Artwork URL for a cover id on a given server.
pub fn artwork_url(base_url: &str, coverid: &str) -> String {
    format!("{}/music/{}/cover.jpg", base_url, coverid)
}

/// Gateway implementation backed by reqwest.
pub struct LmsGateway {
    base_url: String,
    rpc_url: String,
    client: Client,
    request_id: AtomicU64,
}

impl LmsGateway {
    pub fn new(host: &str, port: u16) -> Self {
        let base_url = format!("http://{}:{}", host, port);
        let rpc_url = format!("{}/jsonrpc.js", base_url);
        #[allow(clippy::expect_used)] // HTTP client creation only fails if TLS setup fails
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url,
            rpc_url,
            client,
            request_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ServerGateway for LmsGateway {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, player_id: &str, tokens: Vec<Value>) -> Result<Value, GatewayError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let body = json!({
            "id": id,
            "method": "slim.request",
            "params": [player_id, tokens]
        });

        debug!(
            player_id = if player_id.is_empty() { "<server>" } else { player_id },
            params = ?body["params"][1],
            "LMS request"
        );

        let response = self
            .client
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "LMS request failed: {}",
                response.status()
            )));
        }

        let data: Value = response.json().await?;

        debug!(
            player_id = if player_id.is_empty() { "<server>" } else { player_id },
            result = ?data.get("result"),
            "LMS response"
        );

        if let Some(error) = data.get("error") {
            if !error.is_null() {
                return Err(GatewayError::Protocol(format!("LMS error: {}", error)));
            }
        }

        data.get("result")
            .cloned()
            .ok_or_else(|| GatewayError::Protocol("response has no result member".into()))
    }
}

/// Parse a `players` result into typed entries.
fn parse_players(result: &Value) -> Vec<PlayerInfo> {
    result
        .get("players_loop")
        .and_then(|v| v.as_array())
        .map(|players| {
            players
                .iter()
                .map(|p| PlayerInfo {
                    player_id: str_field(p, "playerid"),
                    name: p
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown Player")
                        .to_string(),
                    model: p
                        .get("model")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    model_name: p
                        .get("modelname")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown Model")
                        .to_string(),
                    ip: str_field(p, "ip"),
                    connected: p.get("connected").and_then(|v| v.as_i64()).unwrap_or(0) == 1,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a `favorites items` result. Display indexes are assigned 1-based
/// in listing order; entries keep their hierarchical server id verbatim.
fn parse_favorites(result: &Value) -> Vec<Favorite> {
    result
        .get("loop_loop")
        .and_then(|v| v.as_array())
        .map(|favorites| {
            favorites
                .iter()
                .enumerate()
                .map(|(i, f)| Favorite {
                    index: i + 1,
                    id: str_field(f, "id"),
                    name: str_field(f, "name"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
