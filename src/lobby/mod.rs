//! Rooms and player placement
//!
//! A [`room::GameRoom`] owns one arena's world and bot controller; the
//! [`manager::RoomRegistry`] owns every room and decides where a joining
//! player goes.

pub mod manager;
pub mod player;
pub mod room;
