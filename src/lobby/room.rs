use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::body::{BodyId, Standing};
use crate::game::food::Food;
use crate::game::systems::ai::BotController;
use crate::game::systems::arena::ArenaSize;
use crate::game::world::{GameEvent, World};
use crate::lobby::player::LobbyPlayer;
use crate::net::protocol::{BodyView, RoomSnapshot, SteerInput};

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Seeded with bots and food, nobody has joined yet
    Created,
    /// At least one player
    Active,
    /// No players; bots keep playing until the idle timeout
    Draining,
    /// Removed from the registry
    Destroyed,
}

/// Per-room limits, taken from the server config
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub max_players: usize,
    pub bots: usize,
    pub pellets: usize,
}

/// What one room tick produced
#[derive(Debug, Default)]
pub struct RoomTick {
    pub events: Vec<GameEvent>,
    pub resized: Option<ArenaSize>,
    /// Players whose body died this tick; they are no longer members
    pub dead_players: Vec<BodyId>,
}

/// One arena with its players and bots
pub struct GameRoom {
    pub id: Uuid,
    pub region: String,
    /// Creation order, used for first-fit placement
    pub sequence: u64,
    pub state: RoomState,
    pub max_players: usize,
    pub created_at: Instant,
    empty_since: Option<Instant>,
    players: HashMap<BodyId, LobbyPlayer>,
    world: World,
    bots: BotController,
}

impl GameRoom {
    pub fn new(region: String, sequence: u64, settings: RoomSettings) -> Self {
        Self::new_with_rng(region, sequence, settings, &mut rand::thread_rng())
    }

    /// Build a room, seeding its bots and pellet field from `rng`
    pub fn new_with_rng<R: Rng>(region: String, sequence: u64, settings: RoomSettings, rng: &mut R) -> Self {
        let mut world = World::new(settings.pellets, rng);
        let mut bots = BotController::new();
        for i in 0..settings.bots {
            let bot_id = world.spawn_bot(i as u8, rng);
            bots.register_bot(bot_id);
        }
        // Initial contents reach clients through the join snapshot
        world.drain_events();

        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            region,
            sequence,
            state: RoomState::Created,
            max_players: settings.max_players,
            created_at: now,
            empty_since: Some(now),
            players: HashMap::new(),
            world,
            bots,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_player(&self, player_id: BodyId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn bot_count(&self) -> usize {
        self.world.bot_count()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    #[cfg(test)]
    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn arena_size(&self) -> ArenaSize {
        self.world.arena_size()
    }

    pub fn standing(&self, player_id: BodyId) -> Option<Standing> {
        self.world.standing(player_id)
    }

    /// Add a player and spawn their body
    pub fn add_player(&mut self, lobby_player: LobbyPlayer, money: f64) -> Result<(), RoomError> {
        self.add_player_with_rng(lobby_player, money, &mut rand::thread_rng())
    }

    pub fn add_player_with_rng<R: Rng>(
        &mut self,
        lobby_player: LobbyPlayer,
        money: f64,
        rng: &mut R,
    ) -> Result<(), RoomError> {
        if self.state == RoomState::Destroyed {
            return Err(RoomError::RoomClosed);
        }
        if self.players.contains_key(&lobby_player.id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        let player_id = lobby_player.id;
        self.world.spawn_body(
            player_id,
            lobby_player.name.clone(),
            false,
            lobby_player.color_index,
            money,
            rng,
        );
        info!("Player {} joined room {} ({})", lobby_player.name, self.id, self.region);
        self.players.insert(player_id, lobby_player);

        self.state = RoomState::Active;
        self.empty_since = None;
        Ok(())
    }

    /// Remove a player; their body drops its mass and money
    pub fn remove_player(&mut self, player_id: BodyId) -> Option<LobbyPlayer> {
        let mut player = self.players.remove(&player_id)?;
        player.leave();
        self.world.remove_body(player_id, &mut rand::thread_rng());
        info!("Player {} left room {}", player.name, self.id);
        self.after_departure();
        Some(player)
    }

    /// Forward a member's steering intent
    pub fn apply_steer(&mut self, player_id: BodyId, input: &SteerInput) -> bool {
        if !self.players.get(&player_id).is_some_and(|p| p.is_connected()) {
            debug!("Steer from non-member {} in room {}", player_id, self.id);
            return false;
        }
        self.world.apply_intent(player_id, input.sequence, input.heading, input.boost)
    }

    /// Run one simulation tick: bot decisions, then the world pipeline
    pub fn tick(&mut self, dt: f32) -> RoomTick {
        self.tick_with_rng(dt, &mut rand::thread_rng())
    }

    pub fn tick_with_rng<R: Rng>(&mut self, dt: f32, rng: &mut R) -> RoomTick {
        if self.state == RoomState::Destroyed {
            return RoomTick::default();
        }

        // Bot intents skip sequence ordering
        for (bot_id, intent) in self.bots.update(&self.world, dt) {
            self.world.apply_intent(bot_id, 0, intent.target_heading, intent.boost);
        }

        let outcome = self.world.step(dt, rng);

        for player_id in &outcome.dead_players {
            if let Some(player) = self.players.remove(player_id) {
                debug!("Player {} died in room {}", player.name, self.id);
            }
        }
        if !outcome.dead_players.is_empty() {
            self.after_departure();
        }

        RoomTick {
            events: self.world.drain_events(),
            resized: outcome.resized,
            dead_players: outcome.dead_players,
        }
    }

    /// Every body in the room
    pub fn snapshot(&self) -> RoomSnapshot {
        let bodies: Vec<BodyView> = self.world.bodies.values().map(BodyView::from_body).collect();
        RoomSnapshot {
            tick: self.world.tick,
            arena: self.arena_size(),
            total_bodies: bodies.len() as u32,
            bodies,
        }
    }

    pub fn foods(&self) -> Vec<Food> {
        self.world.food.iter().cloned().collect()
    }

    /// Empty for at least `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.players.is_empty() && self.empty_since.is_some_and(|since| since.elapsed() >= timeout)
    }

    pub fn mark_destroyed(&mut self) {
        self.state = RoomState::Destroyed;
        self.players.clear();
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn after_departure(&mut self) {
        if self.players.is_empty() && self.state == RoomState::Active {
            self.state = RoomState::Draining;
            self.empty_since = Some(Instant::now());
        }
    }
}

/// Room errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Room is closed")]
    RoomClosed,
    #[error("Player is already in this room")]
    AlreadyInRoom,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::physics::DT;
    use crate::lobby::player::PlayerConnectionState;
    use crate::net::session::SessionToken;
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(max_players: usize) -> RoomSettings {
        RoomSettings {
            max_players,
            bots: 4,
            pellets: 50,
        }
    }

    fn create_room(max_players: usize) -> GameRoom {
        GameRoom::new_with_rng("global".to_string(), 0, settings(max_players), &mut StdRng::seed_from_u64(7))
    }

    fn create_lobby_player(name: &str) -> LobbyPlayer {
        LobbyPlayer::new(Uuid::new_v4(), name, 0, "global".to_string(), SessionToken::generate())
    }

    #[test]
    fn test_room_new_is_seeded() {
        let room = create_room(5);
        assert_eq!(room.state, RoomState::Created);
        assert_eq!(room.bot_count(), 4);
        assert_eq!(room.world().food.pellet_count(), 50);
        assert!(room.is_empty());
        assert_eq!(room.snapshot().bodies.len(), 4);
    }

    #[test]
    fn test_add_player() {
        let mut room = create_room(5);
        let player = create_lobby_player("Alice");
        let id = player.id;

        room.add_player(player, 1.5).unwrap();
        assert_eq!(room.state, RoomState::Active);
        assert!(room.has_player(id));
        assert_eq!(room.standing(id).unwrap().money, 1.5);
        assert!(room.snapshot().bodies.iter().any(|b| b.id == id && !b.is_bot));
    }

    #[test]
    fn test_room_full() {
        let mut room = create_room(2);
        room.add_player(create_lobby_player("P1"), 0.0).unwrap();
        room.add_player(create_lobby_player("P2"), 0.0).unwrap();

        assert!(room.is_full());
        assert_eq!(room.add_player(create_lobby_player("P3"), 0.0), Err(RoomError::RoomFull));
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut room = create_room(5);
        let player = create_lobby_player("Alice");
        room.add_player(player.clone(), 0.0).unwrap();
        assert_eq!(room.add_player(player, 0.0), Err(RoomError::AlreadyInRoom));
    }

    #[test]
    fn test_destroyed_room_rejects() {
        let mut room = create_room(5);
        room.mark_destroyed();
        assert_eq!(room.add_player(create_lobby_player("Late"), 0.0), Err(RoomError::RoomClosed));
        assert!(room.tick(DT).events.is_empty());
    }

    #[test]
    fn test_remove_player_drains_room() {
        let mut room = create_room(5);
        let player = create_lobby_player("Alice");
        let id = player.id;
        room.add_player(player, 0.0).unwrap();

        let removed = room.remove_player(id).unwrap();
        assert_eq!(removed.connection_state, PlayerConnectionState::Left);
        assert_eq!(room.state, RoomState::Draining);
        assert!(room.world().get_body(id).is_none());
        assert!(room.remove_player(id).is_none());

        // Bots keep the room busy until the registry reaps it
        assert_eq!(room.bot_count(), 4);
        assert!(room.is_idle(Duration::ZERO));
        assert!(!room.is_idle(Duration::from_secs(3600)));
    }

    #[test]
    fn test_leave_events_reach_tick() {
        let mut room = create_room(5);
        let player = create_lobby_player("Alice");
        let id = player.id;
        room.add_player(player, 0.0).unwrap();
        room.remove_player(id);

        let tick = room.tick(DT);
        assert!(tick
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::BodyLeft { body_id } if *body_id == id)));
    }

    #[test]
    fn test_steer_requires_membership() {
        let mut room = create_room(5);
        let player = create_lobby_player("Alice");
        let id = player.id;
        room.add_player(player, 0.0).unwrap();

        let input = SteerInput {
            sequence: 1,
            heading: 1.0,
            boost: false,
        };
        assert!(room.apply_steer(id, &input));
        assert!(!room.apply_steer(Uuid::new_v4(), &input));
        // Stale sequence is ignored
        assert!(!room.apply_steer(id, &input));
    }

    #[test]
    fn test_tick_advances_world() {
        let mut room = create_room(5);
        room.add_player(create_lobby_player("Alice"), 0.0).unwrap();
        let before = room.snapshot().tick;
        for _ in 0..10 {
            room.tick(DT);
        }
        assert_eq!(room.snapshot().tick, before + 10);
        assert!(room.snapshot().bodies.iter().all(|b| b.segments.len() <= 100));
    }

    #[test]
    fn test_dead_player_removed_from_room() {
        let mut room = create_room(5);
        let player = create_lobby_player("Doomed");
        let id = player.id;
        room.add_player(player, 0.0).unwrap();

        // Push the body well outside the arena with no outer-ring protection
        if let Some(body) = room.world_mut().bodies.get_mut(&id) {
            body.position = Vec2::new(100_000.0, 0.0);
            body.outer_ring = false;
        }

        let tick = room.tick(DT);
        assert_eq!(tick.dead_players, vec![id]);
        assert!(!room.has_player(id));
        assert_eq!(room.state, RoomState::Draining);
        let late = SteerInput {
            sequence: 1,
            heading: 0.5,
            boost: false,
        };
        assert!(!room.apply_steer(id, &late));
        assert!(tick.events.iter().any(|e| matches!(e, GameEvent::BodyDied { body_id, .. } if *body_id == id)));
    }
}
