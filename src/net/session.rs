use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::game::body::BodyId;

/// Opaque token handed to a client at join
/// Uses CSPRNG for cryptographic security
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken([u8; 32]);

impl SessionToken {
    /// Generate a new cryptographically secure session token
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to Vec<u8> for network transmission
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Self(bytes))
    }
}

/// Bookkeeping for one joined player
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: BodyId,
    pub token: SessionToken,
    pub room_id: Uuid,
    pub player_name: String,
    pub joined_at: Instant,
}

impl Session {
    pub fn new(player_id: BodyId, token: SessionToken, room_id: Uuid, player_name: String) -> Self {
        Self {
            player_id,
            token,
            room_id,
            player_name,
            joined_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.joined_at.elapsed()
    }
}

/// Tracks the sessions of every joined player on this server
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<BodyId, Session>,
    /// Token to player ID mapping for O(1) token lookup
    token_index: HashMap<SessionToken, BodyId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any previous one for the same player
    pub fn insert(&mut self, session: Session) {
        self.remove(session.player_id);
        self.token_index.insert(session.token.clone(), session.player_id);
        self.sessions.insert(session.player_id, session);
    }

    pub fn get(&self, player_id: BodyId) -> Option<&Session> {
        self.sessions.get(&player_id)
    }

    pub fn remove(&mut self, player_id: BodyId) -> Option<Session> {
        let session = self.sessions.remove(&player_id)?;
        self.token_index.remove(&session.token);
        Some(session)
    }

    /// Player holding `token`, if their session is still live
    pub fn validate_token(&self, token: &SessionToken) -> Option<BodyId> {
        self.token_index.get(token).copied()
    }

    /// Players whose session is in `room_id`
    pub fn players_in_room(&self, room_id: Uuid) -> Vec<BodyId> {
        self.sessions
            .values()
            .filter(|s| s.room_id == room_id)
            .map(|s| s.player_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
