//! Arena sizing and boundary rules
//!
//! The arena is a circle centred at the origin whose diameter follows the
//! room's population. Bodies that leave it die, except outer-ring bodies
//! which are still sliding in from their spawn point.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::body::{Body, BodyId};
use crate::game::constants::arena::*;
use crate::game::constants::spawn::OUTER_RING_SLIDE_SPEED;
use crate::util::vec2::Vec2;

/// Arena dimensions sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaSize {
    pub width: f32,
    pub height: f32,
}

impl ArenaSize {
    pub fn square(side: f32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    /// Radius of the circular play area
    #[inline]
    pub fn radius(&self) -> f32 {
        self.width * 0.5
    }

    pub fn contains(&self, position: Vec2) -> bool {
        position.length_sq() <= self.radius() * self.radius()
    }
}

/// Arena events
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    /// Head crossed the arena edge
    BodyLeftArena { body_id: BodyId },
    /// Outer-ring body made it inside
    OuterRingEntered { body_id: BodyId },
}

/// Arena size for a population (players + bots).
/// Linear from `MIN_SIZE` at one occupant to `MAX_SIZE` at `FULL_POPULATION`.
pub fn arena_size_for_population(population: usize) -> ArenaSize {
    let span = (FULL_POPULATION - 1) as f32;
    let t = (population.max(1) - 1) as f32 / span;
    ArenaSize::square(MIN_SIZE + (MAX_SIZE - MIN_SIZE) * t.clamp(0.0, 1.0))
}

/// Applies the sizing policy with hysteresis so small population changes
/// do not spam resizes
#[derive(Debug, Clone)]
pub struct ArenaSizer {
    current: ArenaSize,
}

impl ArenaSizer {
    pub fn new(population: usize) -> Self {
        Self {
            current: arena_size_for_population(population),
        }
    }

    pub fn current(&self) -> ArenaSize {
        self.current
    }

    /// Recompute for `population`; returns the new size if it should be emitted
    pub fn update(&mut self, population: usize) -> Option<ArenaSize> {
        let next = arena_size_for_population(population);
        if (next.width - self.current.width).abs() > RESIZE_MIN_DELTA {
            self.current = next;
            Some(next)
        } else {
            None
        }
    }
}

/// Slide outer-ring bodies toward the centre, clearing the flag once inside
pub fn slide_outer_ring(bodies: &mut HashMap<BodyId, Body>, size: ArenaSize, dt: f32) -> Vec<ArenaEvent> {
    let mut events = Vec::new();
    let radius = size.radius();

    for body in bodies.values_mut() {
        if !body.alive || !body.outer_ring {
            continue;
        }

        let distance = body.position.length();
        if distance <= radius {
            body.outer_ring = false;
            events.push(ArenaEvent::OuterRingEntered { body_id: body.id });
            continue;
        }

        let step = (OUTER_RING_SLIDE_SPEED * dt).min(distance);
        let offset = -body.position.normalize() * step;
        body.position += offset;
        body.trail.translate(offset);
        for segment in body.segments.iter_mut() {
            segment.x += offset.x;
            segment.y += offset.y;
        }

        if body.position.length() <= radius {
            body.outer_ring = false;
            events.push(ArenaEvent::OuterRingEntered { body_id: body.id });
        }
    }

    events
}

/// Bodies whose head is outside the arena and not protected by the outer-ring rule
pub fn check_boundaries(bodies: &HashMap<BodyId, Body>, size: ArenaSize) -> Vec<ArenaEvent> {
    let radius_sq = size.radius() * size.radius();
    bodies
        .values()
        .filter(|b| b.alive && !b.outer_ring && b.position.length_sq() > radius_sq)
        .map(|b| ArenaEvent::BodyLeftArena { body_id: b.id })
        .collect()
}

/// After a shrink, put bodies caught outside the new edge on the outer-ring path
pub fn rescue_outside(bodies: &mut HashMap<BodyId, Body>, size: ArenaSize) -> usize {
    let mut rescued = 0;
    for body in bodies.values_mut() {
        if body.alive && !body.outer_ring && !size.contains(body.position) {
            body.outer_ring = true;
            rescued += 1;
        }
    }
    rescued
}
