use serde::{Deserialize, Serialize};

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8080";
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "drawData";

pub const RELAY_URL_VAR: &str = "SKETCHPAIR_RELAY_URL";
pub const ICE_SERVERS_VAR: &str = "SKETCHPAIR_ICE_SERVERS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Base URL of the relay; the room id is appended as the last path segment.
    pub relay_url: String,
    pub ice_servers: Vec<String>,
    pub data_channel_label: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
        }
    }
}

impl PeerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(RELAY_URL_VAR).filter(|v| !v.trim().is_empty()) {
            config.relay_url = url.trim().to_string();
        }
        if let Some(servers) = lookup(ICE_SERVERS_VAR) {
            config.ice_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        config
    }

    pub fn room_url(&self, room_id: &str) -> String {
        format!("{}/{}", self.relay_url.trim_end_matches('/'), room_id)
    }
}
