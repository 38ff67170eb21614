//! Session gateway: connections, message handling and the room tick loop
//!
//! Every connection gets an unbounded outbox drained by its writer task.
//! All room mutation goes through one `Arc<RwLock<GameSession>>`, so
//! inbound handlers and the tick never interleave.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::body::{BodyId, Standing};
use crate::game::constants::physics;
use crate::game::world::GameEvent;
use crate::lobby::manager::{RegistryError, RoomRegistry};
use crate::lobby::player::{sanitize_region, LobbyPlayer};
use crate::metrics::Metrics;
#[cfg(feature = "interest_broadcast")]
use crate::net::aoi::AOIManager;
use crate::net::protocol::{ClientMessage, RoomSnapshot, ServerMessage};
use crate::net::session::{Session, SessionManager, SessionToken};

/// Transport-level connection handle
pub type ConnectionId = u64;

/// Messages queued for one connection's writer task
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// What the transport should do after a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    /// Flush the outbox, then close the connection
    Close,
}

struct Connection {
    outbox: Outbox,
    player_id: Option<BodyId>,
}

/// Shared gateway state
pub struct GameSession {
    pub registry: RoomRegistry,
    pub sessions: SessionManager,
    connections: HashMap<ConnectionId, Connection>,
    player_connections: HashMap<BodyId, ConnectionId>,
    next_connection_id: ConnectionId,
    #[cfg(feature = "interest_broadcast")]
    aoi: AOIManager,
    metrics: Arc<Metrics>,
}

impl GameSession {
    pub fn new(registry: RoomRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            sessions: SessionManager::new(),
            connections: HashMap::new(),
            player_connections: HashMap::new(),
            next_connection_id: 1,
            #[cfg(feature = "interest_broadcast")]
            aoi: AOIManager::default(),
            metrics,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Player bound to a connection, if it has joined
    pub fn player_of(&self, connection_id: ConnectionId) -> Option<BodyId> {
        self.connections.get(&connection_id).and_then(|c| c.player_id)
    }

    /// Register a new transport connection
    pub fn connect(&mut self, outbox: Outbox) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.connections.insert(
            id,
            Connection {
                outbox,
                player_id: None,
            },
        );
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, Ordering::Relaxed);
        id
    }

    /// Drop a connection; its body (if any) leaves the room immediately
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(connection) = self.connections.remove(&connection_id) else {
            return;
        };
        if let Some(player_id) = connection.player_id {
            self.release_player(player_id);
            debug!("Connection {} closed, removed player {}", connection_id, player_id);
        }
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, Ordering::Relaxed);
    }

    /// Handle one decoded client message
    pub fn handle_message(&mut self, connection_id: ConnectionId, message: ClientMessage) -> Disposition {
        self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);

        let Some(connection) = self.connections.get(&connection_id) else {
            debug!("Message for unknown connection {}", connection_id);
            return Disposition::Close;
        };
        let player_id = connection.player_id;

        match message {
            ClientMessage::Join {
                player_name,
                region,
                color_index,
                money,
            } => {
                if let Some(existing) = player_id {
                    warn!("Connection {} sent Join while playing as {}", connection_id, existing);
                    return Disposition::Continue;
                }
                self.handle_join(connection_id, &player_name, region.as_deref(), color_index, money)
            }
            ClientMessage::Steer(input) => {
                match player_id {
                    Some(pid) => {
                        self.registry.steer(pid, &input);
                    }
                    None => debug!("Steer before join on connection {}", connection_id),
                }
                Disposition::Continue
            }
            ClientMessage::Leave => {
                if let Some(pid) = player_id {
                    self.release_player(pid);
                    if let Some(connection) = self.connections.get_mut(&connection_id) {
                        connection.player_id = None;
                    }
                }
                Disposition::Continue
            }
            ClientMessage::Ping { timestamp } => {
                self.send(
                    connection_id,
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp: unix_millis(),
                    },
                );
                Disposition::Continue
            }
        }
    }

    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        player_name: &str,
        region: Option<&str>,
        color_index: u8,
        money: f64,
    ) -> Disposition {
        let region = sanitize_region(region, &self.registry.settings().default_region);
        let player_id = Uuid::new_v4();
        let token = SessionToken::generate();
        let player = LobbyPlayer::new(player_id, player_name, color_index, region, token.clone());
        let name = player.name.clone();
        let region = player.region.clone();

        let room_id = match self.registry.join(player, money) {
            Ok(room_id) => room_id,
            Err(e) => {
                warn!("Rejecting join from '{}': {}", name, e);
                self.metrics.joins_rejected.fetch_add(1, Ordering::Relaxed);
                self.send(
                    connection_id,
                    ServerMessage::JoinRejected {
                        reason: rejection_reason(&e),
                    },
                );
                return Disposition::Close;
            }
        };

        let Some(room) = self.registry.get_room(room_id) else {
            return Disposition::Close;
        };
        let accepted = ServerMessage::JoinAccepted {
            player_id,
            room_id,
            region,
            session_token: token.to_vec(),
            arena: room.arena_size(),
            snapshot: self.snapshot_for(player_id, &room.snapshot()),
            foods: room.foods(),
        };

        self.sessions.insert(Session::new(player_id, token, room_id, name));
        self.player_connections.insert(player_id, connection_id);
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.player_id = Some(player_id);
        }
        self.metrics.joins_total.fetch_add(1, Ordering::Relaxed);

        self.send(connection_id, accepted);
        Disposition::Continue
    }

    /// Take a player out of their room and forget their session
    fn release_player(&mut self, player_id: BodyId) {
        if let Err(e) = self.registry.leave(player_id) {
            debug!("Leave for player {}: {}", player_id, e);
        }
        self.sessions.remove(player_id);
        self.player_connections.remove(&player_id);
    }

    /// Tick every room and fan out events, resizes and snapshots
    pub fn tick(&mut self, dt: f32) {
        // Recipients are fixed before the tick so players who die still see why
        let mut recipients: HashMap<Uuid, Vec<BodyId>> = HashMap::new();
        for player_id in self.player_connections.keys() {
            if let Some(room_id) = self.sessions.get(*player_id).map(|s| s.room_id) {
                recipients.entry(room_id).or_default().push(*player_id);
            }
        }

        let results = self.registry.tick_all(dt);

        for (room_id, tick) in results {
            let members = recipients.remove(&room_id).unwrap_or_default();

            let deaths = tick
                .events
                .iter()
                .filter(|e| matches!(e, GameEvent::BodyDied { .. }))
                .count();
            self.metrics.deaths_total.fetch_add(deaths as u64, Ordering::Relaxed);

            for event in tick.events {
                self.broadcast(&members, ServerMessage::Event(event));
            }
            if let Some(size) = tick.resized {
                self.broadcast(&members, ServerMessage::ArenaResized(size));
            }

            if let Some(room) = self.registry.get_room(room_id) {
                let full = room.snapshot();
                for player_id in &members {
                    let snapshot = self.snapshot_for(*player_id, &full);
                    self.send_to_player(*player_id, ServerMessage::Snapshot(snapshot));
                }
            }

            // Forced rejoin: the connection stays open but is no longer bound
            for player_id in tick.dead_players {
                self.sessions.remove(player_id);
                if let Some(connection_id) = self.player_connections.remove(&player_id) {
                    if let Some(connection) = self.connections.get_mut(&connection_id) {
                        connection.player_id = None;
                    }
                }
            }
        }

        if self.registry.room_count() > 0 {
            self.registry.cleanup_idle();
        }
        self.update_metrics();
    }

    /// Kick everyone, close every room and drop every outbox.
    ///
    /// Writers flush what is queued, then close their streams.
    pub fn shutdown(&mut self, reason: &str) {
        for player_id in self.registry.shutdown() {
            self.send_to_player(
                player_id,
                ServerMessage::Kicked {
                    reason: reason.to_string(),
                },
            );
        }
        self.connections.clear();
        self.player_connections.clear();
        self.sessions = SessionManager::new();
        self.metrics.connections_active.store(0, Ordering::Relaxed);
    }

    /// Current mass and money for the wallet service
    pub fn standing(&self, player_id: BodyId) -> Option<Standing> {
        self.registry.standing(player_id)
    }

    /// Same lookup, keyed by the token handed out at join
    pub fn standing_by_token(&self, token: &[u8]) -> Option<Standing> {
        let token = SessionToken::try_from_slice(token)?;
        let player_id = self.sessions.validate_token(&token)?;
        self.registry.standing(player_id)
    }

    #[cfg(feature = "interest_broadcast")]
    fn snapshot_for(&self, viewer: BodyId, full: &RoomSnapshot) -> RoomSnapshot {
        self.aoi.filter_for_viewer(viewer, full)
    }

    #[cfg(not(feature = "interest_broadcast"))]
    fn snapshot_for(&self, _viewer: BodyId, full: &RoomSnapshot) -> RoomSnapshot {
        full.clone()
    }

    fn broadcast(&self, players: &[BodyId], message: ServerMessage) {
        for player_id in players {
            self.send_to_player(*player_id, message.clone());
        }
    }

    fn send_to_player(&self, player_id: BodyId, message: ServerMessage) {
        match self.player_connections.get(&player_id) {
            Some(connection_id) => self.send(*connection_id, message),
            None => debug!("No connection for player {}", player_id),
        }
    }

    fn send(&self, connection_id: ConnectionId, message: ServerMessage) {
        let Some(connection) = self.connections.get(&connection_id) else {
            return;
        };
        if connection.outbox.send(message).is_ok() {
            self.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("Outbox closed for connection {}", connection_id);
        }
    }

    fn update_metrics(&self) {
        let rooms = self.registry.list_rooms();
        let humans: usize = rooms.iter().map(|r| r.player_count).sum();
        let bots: usize = rooms.iter().map(|r| r.bot_count).sum();
        let widest = rooms.iter().map(|r| r.arena_width).fold(0.0f32, f32::max);
        let food: usize = rooms
            .iter()
            .filter_map(|r| self.registry.get_room(r.id))
            .map(|room| room.world().food.len())
            .sum();

        self.metrics.rooms_active.store(rooms.len() as u64, Ordering::Relaxed);
        self.metrics.human_players.store(humans as u64, Ordering::Relaxed);
        self.metrics.bot_players.store(bots as u64, Ordering::Relaxed);
        self.metrics.food_items.store(food as u64, Ordering::Relaxed);
        self.metrics.largest_arena_width.store(widest as u64, Ordering::Relaxed);
    }
}

fn rejection_reason(error: &RegistryError) -> String {
    match error {
        RegistryError::NoCapacity => "Server is full. Please try again later.".to_string(),
        other => other.to_string(),
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Start the room tick background task
pub fn start_game_loop(session: Arc<RwLock<GameSession>>, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let tick_duration = Duration::from_millis(physics::TICK_DURATION_MS);
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Game loop started at {} Hz", physics::TICK_RATE);
        let start = Instant::now();
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            {
                let mut session_guard = session.write().await;
                let tick_start = std::time::Instant::now();
                session_guard.tick(physics::DT);
                metrics.record_tick_time(tick_start.elapsed());
            }

            // Log stats periodically (every 30 seconds)
            if tick_count % (physics::TICK_RATE as u64 * 30) == 0 {
                let session_guard = session.read().await;
                info!(
                    "Server: {}s, {} rooms, {} players + {} bots, {} connections | densest cell {} segments | tick p95 {}us",
                    start.elapsed().as_secs(),
                    session_guard.registry.room_count(),
                    session_guard.registry.player_count(),
                    session_guard.registry.bot_count(),
                    session_guard.connection_count(),
                    session_guard.registry.densest_segment_cell(),
                    metrics.tick_time_p95_us.load(Ordering::Relaxed),
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::physics::DT;
    use crate::lobby::manager::RegistrySettings;
    use crate::net::protocol::SteerInput;
    use crate::util::vec2::Vec2;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn gateway(max_rooms: usize, max_players: usize) -> GameSession {
        let settings = RegistrySettings {
            max_rooms,
            max_players_per_room: max_players,
            bots_per_room: 2,
            food_per_room: 20,
            default_region: "global".to_string(),
            idle_timeout: Duration::from_secs(60),
        };
        GameSession::new(RoomRegistry::new(settings), Arc::new(Metrics::new()))
    }

    fn connect(session: &mut GameSession) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (session.connect(tx), rx)
    }

    fn join(name: &str) -> ClientMessage {
        ClientMessage::Join {
            player_name: name.to_string(),
            region: None,
            color_index: 1,
            money: 0.5,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_join_accepted() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);

        assert_eq!(session.handle_message(conn, join("<Alice>")), Disposition::Continue);

        let player_id = session.player_of(conn).unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::JoinAccepted {
                player_id: id,
                region,
                session_token,
                snapshot,
                foods,
                ..
            } => {
                assert_eq!(id, player_id);
                assert_eq!(region, "global");
                assert_eq!(session_token.len(), 32);
                assert_eq!(snapshot.bodies[0].id, player_id);
                assert_eq!(snapshot.bodies[0].name, "Alice");
                assert_eq!(foods.len(), 20);
            }
            other => panic!("Expected JoinAccepted, got {:?}", other),
        }
        assert_eq!(session.standing(player_id).unwrap().money, 0.5);
    }

    #[tokio::test]
    async fn test_join_rejected_when_full() {
        let mut session = gateway(1, 1);
        let (first, _rx1) = connect(&mut session);
        let (second, mut rx2) = connect(&mut session);

        session.handle_message(first, join("A"));
        assert_eq!(session.handle_message(second, join("B")), Disposition::Close);
        assert!(matches!(rx2.recv().await, Some(ServerMessage::JoinRejected { .. })));
        assert!(session.player_of(second).is_none());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);

        session.handle_message(conn, ClientMessage::Ping { timestamp: 1234 });
        match rx.recv().await.unwrap() {
            ServerMessage::Pong {
                client_timestamp,
                server_timestamp,
            } => {
                assert_eq!(client_timestamp, 1234);
                assert!(server_timestamp > 0);
            }
            other => panic!("Expected Pong, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tick_broadcasts_snapshot() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);
        session.handle_message(conn, join("A"));
        drain(&mut rx);

        session.tick(DT);
        let messages = drain(&mut rx);
        let snapshots = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::Snapshot(_)))
            .count();
        assert_eq!(snapshots, 1);
    }

    #[tokio::test]
    async fn test_steer_and_leave() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);
        session.handle_message(conn, join("A"));
        let player_id = session.player_of(conn).unwrap();

        let steer = ClientMessage::Steer(SteerInput {
            sequence: 1,
            heading: 2.0,
            boost: false,
        });
        assert_eq!(session.handle_message(conn, steer), Disposition::Continue);

        session.handle_message(conn, ClientMessage::Leave);
        assert!(session.player_of(conn).is_none());
        assert!(session.registry.room_of(player_id).is_none());
        assert_eq!(session.sessions.len(), 0);

        // The connection can join again
        drain(&mut rx);
        session.handle_message(conn, join("A again"));
        assert!(session.player_of(conn).is_some());
    }

    #[tokio::test]
    async fn test_disconnect_removes_body() {
        let mut session = gateway(10, 5);
        let (watcher, mut watcher_rx) = connect(&mut session);
        let (leaver, _rx) = connect(&mut session);
        session.handle_message(watcher, join("Watcher"));
        session.handle_message(leaver, join("Leaver"));
        let leaver_id = session.player_of(leaver).unwrap();
        drain(&mut watcher_rx);

        session.disconnect(leaver);
        assert_eq!(session.connection_count(), 1);
        assert!(session.registry.room_of(leaver_id).is_none());

        // The next tick tells the remaining player
        session.tick(DT);
        let messages = drain(&mut watcher_rx);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::Event(GameEvent::BodyLeft { body_id }) if *body_id == leaver_id
        )));
    }

    #[tokio::test]
    async fn test_dead_player_must_rejoin() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);
        session.handle_message(conn, join("Doomed"));
        let player_id = session.player_of(conn).unwrap();
        let room_id = session.registry.room_of(player_id).unwrap();
        drain(&mut rx);

        // Send the body far past the arena edge
        let room = session.registry.room_mut(room_id).unwrap();
        let body = room.world_mut().bodies.get_mut(&player_id).unwrap();
        body.position = Vec2::new(100_000.0, 0.0);
        body.outer_ring = false;

        session.tick(DT);

        let messages = drain(&mut rx);
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::Event(GameEvent::BodyDied { body_id, .. }) if *body_id == player_id
        )));
        assert!(session.player_of(conn).is_none());

        // Next tick sends nothing until the client joins again
        session.tick(DT);
        assert!(drain(&mut rx).is_empty());
        session.handle_message(conn, join("Doomed"));
        assert!(session.player_of(conn).is_some());
    }

    #[tokio::test]
    async fn test_standing_by_token() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);
        session.handle_message(conn, join("A"));

        let token = match rx.recv().await.unwrap() {
            ServerMessage::JoinAccepted { session_token, .. } => session_token,
            other => panic!("Expected JoinAccepted, got {:?}", other),
        };
        assert_eq!(session.standing_by_token(&token).unwrap().money, 0.5);
        assert!(session.standing_by_token(&[0u8; 32]).is_none());
        assert!(session.standing_by_token(&[1, 2, 3]).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_kicks_players() {
        let mut session = gateway(10, 5);
        let (conn, mut rx) = connect(&mut session);
        session.handle_message(conn, join("A"));
        drain(&mut rx);

        session.shutdown("Server shutting down");
        assert!(matches!(rx.recv().await, Some(ServerMessage::Kicked { .. })));
        // The outbox is gone, so a writer stops once the kick is flushed
        assert!(rx.recv().await.is_none());
        assert_eq!(session.registry.room_count(), 0);
        assert_eq!(session.connection_count(), 0);
    }
}
