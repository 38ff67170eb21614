//! Area of Interest (AOI) filtering for snapshots
//!
//! Each viewer receives their own body plus the bodies whose head is within
//! the interest radius of their head, closest first, up to a cap. A viewer
//! without a living body (just died, or not yet spawned) gets the bodies
//! nearest the arena centre instead.

use std::cell::RefCell;

use crate::game::body::BodyId;
use crate::game::constants::net::{INTEREST_RADIUS, MAX_BODIES_PER_SNAPSHOT};
use crate::net::protocol::{BodyView, RoomSnapshot};
use crate::util::vec2::Vec2;

// Thread-local reusable buffer to avoid per-filter allocations
thread_local! {
    /// (index into snapshot bodies, squared distance)
    static NEARBY_WITH_DISTANCE_BUFFER: RefCell<Vec<(usize, f32)>> = RefCell::new(Vec::with_capacity(256));
}

/// AOI configuration
#[derive(Debug, Clone)]
pub struct AOIConfig {
    /// Bodies whose head is farther than this from the viewer are dropped
    pub radius: f32,
    /// Maximum bodies per filtered snapshot, the viewer included
    pub max_bodies: usize,
}

impl Default for AOIConfig {
    fn default() -> Self {
        Self {
            radius: INTEREST_RADIUS,
            max_bodies: MAX_BODIES_PER_SNAPSHOT,
        }
    }
}

/// Head position of a snapshot body (its first segment)
#[inline]
fn head_of(body: &BodyView) -> Option<Vec2> {
    body.segments.first().map(|s| s.position())
}

/// Per-viewer snapshot filter
#[derive(Debug, Default)]
pub struct AOIManager {
    config: AOIConfig,
}

impl AOIManager {
    pub fn new(config: AOIConfig) -> Self {
        Self { config }
    }

    /// Personalized snapshot for `viewer_id`
    pub fn filter_for_viewer(&self, viewer_id: BodyId, full_snapshot: &RoomSnapshot) -> RoomSnapshot {
        let viewer = full_snapshot
            .bodies
            .iter()
            .find(|b| b.id == viewer_id && b.alive)
            .and_then(|b| head_of(b).map(|head| (b, head)));

        let mut bodies = Vec::with_capacity(self.config.max_bodies.min(full_snapshot.bodies.len()));
        let (centre, radius_sq) = match viewer {
            Some((own, head)) => {
                // Own body first so the cap never drops it
                bodies.push(own.clone());
                (head, self.config.radius * self.config.radius)
            }
            None => (Vec2::ZERO, f32::INFINITY),
        };

        let nearby: Vec<usize> = NEARBY_WITH_DISTANCE_BUFFER.with(|buffer_cell| {
            let mut buffer = buffer_cell.borrow_mut();
            buffer.clear();

            for (idx, body) in full_snapshot.bodies.iter().enumerate() {
                if body.id == viewer_id {
                    continue;
                }
                let Some(head) = head_of(body) else {
                    continue;
                };
                let distance_sq = head.distance_sq_to(centre);
                if distance_sq <= radius_sq {
                    buffer.push((idx, distance_sq));
                }
            }

            buffer.sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            buffer.iter().map(|(idx, _)| *idx).collect()
        });

        for idx in nearby {
            if bodies.len() >= self.config.max_bodies {
                break;
            }
            bodies.push(full_snapshot.bodies[idx].clone());
        }

        RoomSnapshot {
            tick: full_snapshot.tick,
            arena: full_snapshot.arena,
            bodies,
            // Totals come from the full snapshot so the UI shows correct counts
            total_bodies: full_snapshot.total_bodies,
        }
    }
}
