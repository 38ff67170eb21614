use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::body::{Body, BodyId};
use crate::game::food::Food;
use crate::game::systems::arena::ArenaSize;
use crate::game::trail::VisibleSegment;
use crate::game::world::GameEvent;

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request to join a room. `money` is the balance the wallet service
    /// staked for this session.
    Join {
        player_name: String,
        region: Option<String>,
        color_index: u8,
        money: f64,
    },
    /// Steering intent
    Steer(SteerInput),
    /// Leave the room (connection stays open, a new `Join` may follow)
    Leave,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Join succeeded; carries everything needed to draw the first frame
    JoinAccepted {
        player_id: BodyId,
        room_id: Uuid,
        region: String,
        session_token: Vec<u8>,
        arena: ArenaSize,
        snapshot: RoomSnapshot,
        foods: Vec<Food>,
    },
    /// Join was rejected; the connection is closed afterwards
    JoinRejected { reason: String },
    /// Body list for this tick
    Snapshot(RoomSnapshot),
    /// Arena size changed
    ArenaResized(ArenaSize),
    /// Game event notification
    Event(GameEvent),
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    /// Server is kicking the player
    Kicked { reason: String },
}

/// Steering intent for one body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SteerInput {
    /// Increasing per client; older intents are ignored
    pub sequence: u64,
    /// Desired heading in radians
    pub heading: f32,
    pub boost: bool,
}

/// Room state as broadcast each tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub tick: u64,
    pub arena: ArenaSize,
    pub bodies: Vec<BodyView>,
    /// Bodies in the room before interest filtering
    pub total_bodies: u32,
}

/// One body as seen by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyView {
    pub id: BodyId,
    pub name: String,
    pub segments: Vec<VisibleSegment>,
    pub heading: f32,
    pub color_index: u8,
    pub mass: f32,
    pub money: f64,
    pub boosting: bool,
    pub alive: bool,
    pub ghost: bool,
    pub is_bot: bool,
}

impl BodyView {
    pub fn from_body(body: &Body) -> Self {
        Self {
            id: body.id,
            name: body.name.clone(),
            segments: body.segments.clone(),
            heading: body.heading,
            color_index: body.color_index,
            mass: body.mass,
            money: body.money,
            boosting: body.boosting,
            alive: body.alive,
            ghost: body.is_ghost(),
            is_bot: body.is_bot,
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with the browser client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
