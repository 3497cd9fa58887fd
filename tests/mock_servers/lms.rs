//! Mock LMS (Lyrion Music Server) for testing.
//!
//! Simulates the JSON-RPC interface at /jsonrpc.js with mutable player
//! state, a favorites list and failure injection.

use axum::response::{IntoResponse, Response};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Mock player state.
#[derive(Debug, Clone)]
pub struct MockPlayer {
    pub playerid: String,
    pub name: String,
    pub model: String,
    pub connected: bool,
    pub power: bool,
    pub mode: String, // "play", "pause", "stop"
    pub volume: i32,
    pub muted: bool,
    pub repeat: i32,
    pub shuffle: i32,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub coverid: Option<String>,
    pub duration: f64,
    pub time: f64,
    pub sync_master: String,
    pub sync_slaves: String,
}

impl MockPlayer {
    pub fn new(playerid: &str, name: &str) -> Self {
        Self {
            playerid: playerid.to_string(),
            name: name.to_string(),
            model: "squeezelite".to_string(),
            connected: true,
            power: true,
            mode: "stop".to_string(),
            volume: 50,
            muted: false,
            repeat: 0,
            shuffle: 0,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            coverid: None,
            duration: 0.0,
            time: 0.0,
            sync_master: String::new(),
            sync_slaves: String::new(),
        }
    }
}

struct MockLmsState {
    players: HashMap<String, MockPlayer>,
    favorites: Vec<(String, String)>, // (id, name)
    request_ids: Vec<i64>,
    sync_calls: Vec<(String, String)>, // (player, target)
    failing: bool,
    garbage: bool,
}

/// Mock LMS server.
pub struct MockLmsServer {
    addr: SocketAddr,
    state: Arc<RwLock<MockLmsState>>,
    handle: JoinHandle<()>,
}

impl MockLmsServer {
    /// Start a mock LMS server on a random port.
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockLmsState {
            players: HashMap::new(),
            favorites: Vec::new(),
            request_ids: Vec::new(),
            sync_calls: Vec::new(),
            failing: false,
            garbage: false,
        }));

        let app = Router::new()
            .route("/jsonrpc.js", post(handle_jsonrpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn add_player(&self, playerid: &str, name: &str) {
        let mut state = self.state.write().await;
        state
            .players
            .insert(playerid.to_string(), MockPlayer::new(playerid, name));
    }

    pub async fn add_favorite(&self, id: &str, name: &str) {
        let mut state = self.state.write().await;
        state.favorites.push((id.to_string(), name.to_string()));
    }

    pub async fn set_mode(&self, playerid: &str, mode: &str) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(playerid) {
            player.mode = mode.to_string();
        }
    }

    pub async fn set_power(&self, playerid: &str, power: bool) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(playerid) {
            player.power = power;
        }
    }

    pub async fn set_now_playing(
        &self,
        playerid: &str,
        title: &str,
        artist: &str,
        album: &str,
        coverid: &str,
    ) {
        let mut state = self.state.write().await;
        if let Some(player) = state.players.get_mut(playerid) {
            player.title = title.to_string();
            player.artist = artist.to_string();
            player.album = album.to_string();
            player.coverid = Some(coverid.to_string());
        }
    }

    /// Make every request fail with HTTP 500.
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// Make every request return a 200 with a non-JSON body.
    pub async fn set_garbage(&self, garbage: bool) {
        self.state.write().await.garbage = garbage;
    }

    pub async fn player(&self, playerid: &str) -> Option<MockPlayer> {
        self.state.read().await.players.get(playerid).cloned()
    }

    pub async fn request_ids(&self) -> Vec<i64> {
        self.state.read().await.request_ids.clone()
    }

    pub async fn sync_calls(&self) -> Vec<(String, String)> {
        self.state.read().await.sync_calls.clone()
    }

    pub async fn stop(self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    id: Value,
    method: String,
    params: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    id: Value,
    result: Value,
}

fn token_str(tokens: &[Value], i: usize) -> &str {
    tokens.get(i).and_then(|v| v.as_str()).unwrap_or("")
}

async fn handle_jsonrpc(
    State(state): State<Arc<RwLock<MockLmsState>>>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    {
        let mut s = state.write().await;
        if let Some(id) = request.id.as_i64() {
            s.request_ids.push(id);
        }
        if s.failing {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        if s.garbage {
            return "this is not json".into_response();
        }
    }

    if request.method != "slim.request" || request.params.len() < 2 {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let player_id = request.params[0].as_str().unwrap_or("").to_string();
    let tokens = match request.params[1].as_array() {
        Some(tokens) => tokens.clone(),
        None => return StatusCode::BAD_REQUEST.into_response(),
    };
    let command = token_str(&tokens, 0).to_string();

    let result = apply_command(&state, &player_id, &command, &tokens).await;

    Json(JsonRpcResponse {
        id: request.id,
        result,
    })
    .into_response()
}

async fn apply_command(
    state: &Arc<RwLock<MockLmsState>>,
    player_id: &str,
    command: &str,
    tokens: &[Value],
) -> Value {
    let mut s = state.write().await;

    match command {
        "version" => json!({ "_version": "9.0.2" }),
        "serverstatus" => json!({ "player count": s.players.len() }),
        "players" => {
            let players_loop: Vec<Value> = s
                .players
                .values()
                .map(|p| {
                    json!({
                        "playerid": p.playerid,
                        "name": p.name,
                        "model": p.model,
                        "modelname": "SqueezeLite",
                        "ip": "10.0.0.21:43012",
                        "connected": if p.connected { 1 } else { 0 },
                        "power": if p.power { 1 } else { 0 },
                    })
                })
                .collect();
            json!({ "count": players_loop.len(), "players_loop": players_loop })
        }
        "status" => match s.players.get(player_id) {
            Some(p) => {
                let playlist_loop = if !p.title.is_empty() {
                    vec![json!({
                        "title": p.title,
                        "artist": p.artist,
                        "album": p.album,
                        "coverid": p.coverid,
                        "duration": p.duration,
                    })]
                } else {
                    vec![]
                };
                json!({
                    "mode": p.mode,
                    "power": if p.power { 1 } else { 0 },
                    "mixer volume": p.volume,
                    "mixer muting": if p.muted { 1 } else { 0 },
                    "playlist repeat": p.repeat,
                    "playlist shuffle": p.shuffle,
                    "time": p.time,
                    "duration": p.duration,
                    "sync_master": p.sync_master,
                    "sync_slaves": p.sync_slaves,
                    "playlist_tracks": playlist_loop.len(),
                    "playlist_loop": playlist_loop,
                })
            }
            None => json!({}),
        },
        "favorites" => match token_str(tokens, 1) {
            "items" => {
                let loop_loop: Vec<Value> = s
                    .favorites
                    .iter()
                    .map(|(id, name)| json!({ "id": id, "name": name }))
                    .collect();
                json!({ "count": loop_loop.len(), "loop_loop": loop_loop })
            }
            "playlist" => {
                // favorites playlist play item_id:<id>
                let item = tokens
                    .iter()
                    .filter_map(|v| v.as_str())
                    .find_map(|t| t.strip_prefix("item_id:"))
                    .unwrap_or("");
                let name = s
                    .favorites
                    .iter()
                    .find(|(id, _)| id == item)
                    .map(|(_, name)| name.clone());
                if let (Some(name), Some(player)) = (name, s.players.get_mut(player_id)) {
                    player.mode = "play".to_string();
                    player.title = name;
                }
                json!({})
            }
            _ => json!({}),
        },
        "play" => {
            if let Some(p) = s.players.get_mut(player_id) {
                // "play" starts from stop; it does not resume from pause
                if p.mode == "stop" {
                    p.mode = "play".to_string();
                }
            }
            json!({})
        }
        "pause" => {
            if let Some(p) = s.players.get_mut(player_id) {
                match tokens.get(1).and_then(parse_num) {
                    Some(0) => {
                        if p.mode == "pause" {
                            p.mode = "play".to_string();
                        }
                    }
                    Some(_) => {
                        if p.mode == "play" {
                            p.mode = "pause".to_string();
                        }
                    }
                    None => {
                        p.mode = match p.mode.as_str() {
                            "play" => "pause".to_string(),
                            "pause" => "play".to_string(),
                            _ => p.mode.clone(),
                        };
                    }
                }
            }
            json!({})
        }
        "stop" => {
            if let Some(p) = s.players.get_mut(player_id) {
                p.mode = "stop".to_string();
            }
            json!({})
        }
        "mixer" => {
            if let Some(p) = s.players.get_mut(player_id) {
                let arg = token_str(tokens, 2).to_string();
                match token_str(tokens, 1) {
                    "volume" => {
                        if let Some(delta) = arg.strip_prefix('+') {
                            p.volume =
                                (p.volume + delta.parse::<i32>().unwrap_or(0)).clamp(0, 100);
                        } else if arg.starts_with('-') {
                            p.volume =
                                (p.volume + arg.parse::<i32>().unwrap_or(0)).clamp(0, 100);
                        } else if let Ok(level) = arg.parse::<i32>() {
                            p.volume = level.clamp(0, 100);
                        }
                    }
                    "muting" => match arg.as_str() {
                        "1" => p.muted = true,
                        "0" => p.muted = false,
                        "toggle" => p.muted = !p.muted,
                        _ => {}
                    },
                    _ => {}
                }
            }
            json!({})
        }
        "power" => {
            if let Some(p) = s.players.get_mut(player_id) {
                match token_str(tokens, 1) {
                    "1" => p.power = true,
                    "0" => p.power = false,
                    _ => p.power = !p.power,
                }
            }
            json!({})
        }
        "playlist" => {
            if let Some(p) = s.players.get_mut(player_id) {
                match token_str(tokens, 1) {
                    "clear" => {
                        p.title.clear();
                        p.artist.clear();
                        p.album.clear();
                        p.coverid = None;
                        p.mode = "stop".to_string();
                    }
                    "repeat" => {
                        p.repeat = token_str(tokens, 2).parse().unwrap_or(0);
                    }
                    "shuffle" => {
                        p.shuffle = token_str(tokens, 2).parse().unwrap_or(0);
                    }
                    // index +1 / -1: track position is not modeled
                    _ => {}
                }
            }
            json!({})
        }
        "time" => {
            if let Some(p) = s.players.get_mut(player_id) {
                p.time = token_str(tokens, 1).parse().unwrap_or(0.0);
            }
            json!({})
        }
        "sync" => {
            let target = token_str(tokens, 1).to_string();
            s.sync_calls.push((player_id.to_string(), target.clone()));
            if let Some(p) = s.players.get_mut(player_id) {
                if target == "-" {
                    p.sync_master.clear();
                    p.sync_slaves.clear();
                } else {
                    p.sync_master = target;
                }
            }
            json!({})
        }
        "sleep" | "randomplay" => json!({}),
        _ => json!({}),
    }
}

fn parse_num(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_lms_starts_and_stops() {
        let server = MockLmsServer::start().await;
        assert!(server.addr().port() > 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn mock_lms_returns_players() {
        let server = MockLmsServer::start().await;
        server.add_player("aa:bb:cc:dd:ee:ff", "Test Player").await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/jsonrpc.js", server.addr()))
            .json(&json!({
                "id": 1,
                "method": "slim.request",
                "params": ["", ["players", "0", "999"]]
            }))
            .send()
            .await
            .unwrap();

        let body: Value = response.json().await.unwrap();
        let players = body["result"]["players_loop"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["name"], "Test Player");

        server.stop().await;
    }

    #[tokio::test]
    async fn mock_lms_pause_toggles() {
        let server = MockLmsServer::start().await;
        let player_id = "aa:bb:cc:dd:ee:ff";
        server.add_player(player_id, "Test Player").await;
        server.set_mode(player_id, "play").await;

        let client = reqwest::Client::new();
        let send = |cmd: Vec<Value>| {
            let client = client.clone();
            let url = format!("http://{}/jsonrpc.js", server.addr());
            async move {
                client
                    .post(url)
                    .json(&json!({"id": 1, "method": "slim.request", "params": [player_id, cmd]}))
                    .send()
                    .await
                    .unwrap();
            }
        };

        send(vec![json!("pause")]).await;
        assert_eq!(server.player(player_id).await.unwrap().mode, "pause");

        send(vec![json!("pause")]).await;
        assert_eq!(server.player(player_id).await.unwrap().mode, "play");

        server.stop().await;
    }
}
