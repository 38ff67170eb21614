use std::time::Instant;

use crate::game::body::BodyId;
use crate::game::constants::room::{COLOR_COUNT, MAX_NAME_LENGTH};
use crate::net::session::SessionToken;

/// Longest region identifier kept after sanitizing
const MAX_REGION_LENGTH: usize = 32;

/// Connection state of a room member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerConnectionState {
    /// Connected and playing
    Connected,
    /// Left the room or disconnected
    Left,
}

/// A human member of a room
#[derive(Debug, Clone)]
pub struct LobbyPlayer {
    pub id: BodyId,
    pub name: String,
    pub session_token: SessionToken,
    pub color_index: u8,
    pub region: String,
    pub joined_at: Instant,
    pub connection_state: PlayerConnectionState,
}

impl LobbyPlayer {
    /// Build a member from raw join parameters; name and colour are sanitized here
    pub fn new(id: BodyId, raw_name: &str, color_index: u8, region: String, session_token: SessionToken) -> Self {
        Self {
            id,
            name: sanitize_name(raw_name),
            session_token,
            color_index: color_index % COLOR_COUNT,
            region,
            joined_at: Instant::now(),
            connection_state: PlayerConnectionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == PlayerConnectionState::Connected
    }

    pub fn leave(&mut self) {
        self.connection_state = PlayerConnectionState::Left;
    }
}

/// Display name safe to echo to other clients
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '&' | '"' | '\''))
        .collect();
    let trimmed: String = cleaned.trim().chars().take(MAX_NAME_LENGTH).collect();
    let trimmed = trimmed.trim_end();

    if trimmed.is_empty() {
        "Player".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Region identifier: lowercase alphanumerics and '-', else `default`
pub fn sanitize_region(raw: Option<&str>, default: &str) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(MAX_REGION_LENGTH)
        .collect();

    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}
