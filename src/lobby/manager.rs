use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::body::{BodyId, Standing};
use crate::lobby::player::LobbyPlayer;
use crate::lobby::room::{GameRoom, RoomError, RoomSettings, RoomState, RoomTick};
use crate::net::protocol::SteerInput;

/// Limits applied to every room the registry creates
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_rooms: usize,
    pub max_players_per_room: usize,
    pub bots_per_room: usize,
    pub food_per_room: usize,
    pub default_region: String,
    pub idle_timeout: Duration,
}

impl From<&ServerConfig> for RegistrySettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_rooms: config.max_rooms,
            max_players_per_room: config.max_players_per_room,
            bots_per_room: config.bots_per_room,
            food_per_room: config.food_per_room,
            default_region: config.default_region.clone(),
            idle_timeout: config.room_idle_timeout,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Owns every room on this server and places joining players
pub struct RoomRegistry {
    rooms: HashMap<Uuid, GameRoom>,
    player_rooms: HashMap<BodyId, Uuid>,
    settings: RegistrySettings,
    next_sequence: u64,
}

impl RoomRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            settings,
            next_sequence: 0,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Place a player in the first room of their region with spare
    /// capacity, creating a room when none has any
    pub fn join(&mut self, player: LobbyPlayer, money: f64) -> Result<Uuid, RegistryError> {
        let player_id = player.id;
        if self.player_rooms.contains_key(&player_id) {
            return Err(RegistryError::AlreadyInRoom);
        }

        let room_id = match self.find_open_room(&player.region) {
            Some(id) => id,
            None => self.create_room(player.region.clone())?,
        };

        let room = self.rooms.get_mut(&room_id).ok_or(RegistryError::RoomNotFound)?;
        room.add_player(player, money)?;
        self.player_rooms.insert(player_id, room_id);
        Ok(room_id)
    }

    /// Oldest joinable room in `region`
    fn find_open_room(&self, region: &str) -> Option<Uuid> {
        self.rooms
            .values()
            .filter(|room| room.region == region && room.state != RoomState::Destroyed && !room.is_full())
            .min_by_key(|room| room.sequence)
            .map(|room| room.id)
    }

    fn create_room(&mut self, region: String) -> Result<Uuid, RegistryError> {
        if self.rooms.len() >= self.settings.max_rooms {
            return Err(RegistryError::NoCapacity);
        }

        let settings = RoomSettings {
            max_players: self.settings.max_players_per_room,
            bots: self.settings.bots_per_room,
            pellets: self.settings.food_per_room,
        };
        let room = GameRoom::new(region, self.next_sequence, settings);
        self.next_sequence += 1;

        let id = room.id;
        info!(
            "Created room {} in region {} ({} bots, {} rooms total)",
            id,
            room.region,
            room.bot_count(),
            self.rooms.len() + 1
        );
        self.rooms.insert(id, room);
        Ok(id)
    }

    /// Remove a player from their room
    pub fn leave(&mut self, player_id: BodyId) -> Result<LobbyPlayer, RegistryError> {
        let room_id = self
            .player_rooms
            .remove(&player_id)
            .ok_or(RegistryError::NotInRoom)?;

        self.rooms
            .get_mut(&room_id)
            .and_then(|room| room.remove_player(player_id))
            .ok_or(RegistryError::RoomNotFound)
    }

    /// Route a steering intent to the player's room
    pub fn steer(&mut self, player_id: BodyId, input: &SteerInput) -> bool {
        let Some(room) = self
            .player_rooms
            .get(&player_id)
            .and_then(|room_id| self.rooms.get_mut(room_id))
        else {
            debug!("Steer from player {} without a room", player_id);
            return false;
        };
        room.apply_steer(player_id, input)
    }

    /// Tick every room once
    pub fn tick_all(&mut self, dt: f32) -> Vec<(Uuid, RoomTick)> {
        let mut results = Vec::with_capacity(self.rooms.len());
        for (room_id, room) in self.rooms.iter_mut() {
            let tick = room.tick(dt);
            for player_id in &tick.dead_players {
                self.player_rooms.remove(player_id);
            }
            results.push((*room_id, tick));
        }
        results
    }

    /// Destroy rooms that have had no players for the idle timeout
    pub fn cleanup_idle(&mut self) -> Vec<Uuid> {
        let timeout = self.settings.idle_timeout;
        let idle: Vec<Uuid> = self
            .rooms
            .values()
            .filter(|room| room.is_idle(timeout))
            .map(|room| room.id)
            .collect();

        for room_id in &idle {
            if let Some(mut room) = self.rooms.remove(room_id) {
                room.mark_destroyed();
                info!("Destroyed idle room {} after {:?}", room_id, room.age());
            }
        }
        idle
    }

    pub fn get_room(&self, room_id: Uuid) -> Option<&GameRoom> {
        self.rooms.get(&room_id)
    }

    #[cfg(test)]
    pub(crate) fn room_mut(&mut self, room_id: Uuid) -> Option<&mut GameRoom> {
        self.rooms.get_mut(&room_id)
    }

    pub fn room_of(&self, player_id: BodyId) -> Option<Uuid> {
        self.player_rooms.get(&player_id).copied()
    }

    /// Current mass and money of a player's body
    pub fn standing(&self, player_id: BodyId) -> Option<Standing> {
        let room_id = self.player_rooms.get(&player_id)?;
        self.rooms.get(room_id)?.standing(player_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn player_count(&self) -> usize {
        self.player_rooms.len()
    }

    pub fn bot_count(&self) -> usize {
        self.rooms.values().map(|r| r.bot_count()).sum()
    }

    /// Most segments sharing one collision grid cell, across all rooms
    pub fn densest_segment_cell(&self) -> usize {
        self.rooms
            .values()
            .map(|r| r.world().segment_grid.stats().max_per_cell)
            .max()
            .unwrap_or(0)
    }

    /// Rooms for listing, oldest first
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<&GameRoom> = self.rooms.values().collect();
        rooms.sort_by_key(|room| room.sequence);
        rooms
            .into_iter()
            .map(|room| RoomInfo {
                id: room.id,
                region: room.region.clone(),
                player_count: room.player_count(),
                bot_count: room.bot_count(),
                max_players: room.max_players,
                arena_width: room.arena_size().width,
                state: room.state,
            })
            .collect()
    }

    /// Tear down every room; returns the players that were still inside
    pub fn shutdown(&mut self) -> Vec<BodyId> {
        let players: Vec<BodyId> = self.player_rooms.keys().copied().collect();
        for room in self.rooms.values_mut() {
            room.mark_destroyed();
        }
        self.rooms.clear();
        self.player_rooms.clear();
        players
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

/// Room information for listing
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: Uuid,
    pub region: String,
    pub player_count: usize,
    pub bot_count: usize,
    pub max_players: usize,
    pub arena_width: f32,
    pub state: RoomState,
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("No room capacity left on this server")]
    NoCapacity,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Already in a room")]
    AlreadyInRoom,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Room error: {0}")]
    RoomError(#[from] RoomError),
}
