//! Serpent Arena Server Library
//!
//! A real-time multiplayer snake arena server using WebTransport.
//!
//! # Features
//!
//! - `interest_broadcast` - Per-player snapshots filtered by distance (enabled by default).
//!   Without it every player receives the full room snapshot.

pub mod config;
pub mod util;
pub mod game;
pub mod lobby;
pub mod net;
pub mod metrics;
