use hashbrown::HashMap;
use rayon::prelude::*;

use crate::game::body::{Body, BodyId};
use crate::game::constants::{mass, movement};
use crate::util::vec2::{angle_delta, wrap_angle, Vec2};

/// Turn `current` toward `target` by at most one tick's turn budget.
/// The budget doubles while boosting.
pub fn steer_angle(current: f32, target: f32, boosting: bool, dt: f32) -> f32 {
    if !target.is_finite() {
        return current;
    }
    let rate = if boosting {
        movement::TURN_RATE * movement::BOOST_TURN_MULTIPLIER
    } else {
        movement::TURN_RATE
    };
    let max_turn = rate * dt;
    let delta = angle_delta(current, target);
    wrap_angle(current + delta.clamp(-max_turn, max_turn))
}

/// Forward speed in units per second
#[inline]
pub fn speed(boosting: bool) -> f32 {
    if boosting {
        movement::BASE_SPEED * movement::BOOST_SPEED_MULTIPLIER
    } else {
        movement::BASE_SPEED
    }
}

/// Drain mass for one tick of boosting.
/// Boosting stops instead of draining below the boost floor.
pub fn drain_boost(body: &mut Body, dt: f32) {
    if !body.boosting {
        return;
    }
    let cost = mass::BOOST_DRAIN_PER_SECOND * dt;
    if body.mass - cost < mass::MIN_TO_BOOST {
        body.boosting = false;
        return;
    }
    body.mass -= cost;
}

/// Steer, drain, move and resample a single body
pub fn update_body(body: &mut Body, dt: f32) {
    if !body.alive {
        return;
    }

    drain_boost(body, dt);
    // Outer-ring bodies head for the centre until they are inside
    let target = if body.outer_ring {
        body.position.angle_toward(Vec2::ZERO)
    } else {
        body.target_heading
    };
    body.heading = steer_angle(body.heading, target, body.boosting, dt);
    body.position += Vec2::from_angle(body.heading) * (speed(body.boosting) * dt);
    body.resample();
}

/// Integrate every living body in parallel
pub fn update(bodies: &mut HashMap<BodyId, Body>, dt: f32) {
    bodies.par_values_mut().for_each(|body| update_body(body, dt));
}
