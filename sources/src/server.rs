//! Game server records as published by a master server.
//!
//! The shape follows the DDNet `servers.json` document so the HTTP master can
//! be decoded straight into it; the UDP browser converts its packets into the
//! same records.

use serde::{
    Deserialize,
    Serialize,
};

/// Top level document returned by an HTTP master server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerList {
    #[serde(default)]
    pub servers: Vec<GameServer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameServer {
    /// Transport endpoints, e.g. `tw-0.6+udp://1.2.3.4:8303` or `1.2.3.4:8303`.
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub info: ServerInfo,
}

impl GameServer {
    pub fn first_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }

    pub fn player_count(&self) -> usize {
        self.info.clients.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub max_clients: i64,
    #[serde(default)]
    pub max_players: i64,
    #[serde(default)]
    pub passworded: bool,
    #[serde(default)]
    pub game_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub map: ServerMap,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_score_kind: Option<String>,
    #[serde(default)]
    pub clients: Vec<Client>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMap {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Client {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clan: String,
    #[serde(default)]
    pub country: i32,
    #[serde(default)]
    pub score: i32,
    /// `false` for spectators.
    #[serde(default)]
    pub is_player: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<ClientSkin>,
    #[serde(default)]
    pub afk: bool,
    #[serde(default)]
    pub team: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSkin {
    #[serde(default)]
    pub name: String,
}
