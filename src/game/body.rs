//! Snake bodies
//!
//! One type for players and bots. The server owns every body: clients only
//! send steering intents, and the tick integrates movement, records the head
//! trail and resamples the visible segments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{mass, mass_to_radius, spawn};
use crate::game::trail::{Trail, TrailSampler, VisibleSegment};
use crate::util::vec2::{angle_delta, wrap_angle, Vec2};

/// Unique body identifier (same as the owning player's id for humans)
pub type BodyId = Uuid;

/// Heading changes smaller than this do not count as steering
const STEER_EPSILON: f32 = 0.01;

/// Snake body state
///
/// Hot fields (touched by every physics step) come first, then the fields
/// used by collisions and snapshots, then identity.
#[derive(Debug, Clone)]
pub struct Body {
    // === HOT FIELDS ===
    /// Head position in arena space
    pub position: Vec2,
    /// Current heading (radians)
    pub heading: f32,
    /// Heading the body is turning toward
    pub target_heading: f32,
    /// Boost requested and allowed this tick
    pub boosting: bool,
    pub mass: f32,
    pub alive: bool,
    /// Remaining spawn protection (seconds); 0 once it has ended
    pub ghost_timer: f32,
    /// Spawned outside the arena edge and still sliding in
    pub outer_ring: bool,

    // === WARM FIELDS ===
    pub trail: Trail,
    pub sampler: TrailSampler,
    /// Visible segments from the last resample, head first
    pub segments: Vec<VisibleSegment>,
    /// Balance carried by this body; dropped as crates on death
    pub money: f64,
    /// Highest steering sequence applied
    pub last_input_sequence: u64,
    pub is_bot: bool,
    pub color_index: u8,
    /// Tick the body spawned on
    pub spawn_tick: u64,

    // === COLD FIELDS ===
    pub id: BodyId,
    pub name: String,
}

impl Body {
    /// A freshly spawned body at `position`, facing `heading`
    pub fn new(id: BodyId, name: String, is_bot: bool, color_index: u8, position: Vec2, heading: f32) -> Self {
        let heading = if heading.is_finite() { wrap_angle(heading) } else { 0.0 };
        let mut body = Self {
            position,
            heading,
            target_heading: heading,
            boosting: false,
            mass: mass::STARTING,
            alive: true,
            ghost_timer: spawn::GHOST_DURATION,
            outer_ring: false,
            trail: Trail::new(position),
            sampler: TrailSampler::new(mass::STARTING),
            segments: Vec::new(),
            money: 0.0,
            last_input_sequence: 0,
            is_bot,
            color_index,
            spawn_tick: 0,
            id,
            name,
        };
        body.resample();
        body
    }

    /// Collision radius based on mass
    pub fn radius(&self) -> f32 {
        mass_to_radius(self.mass)
    }

    /// Spawn protection active: neither collides nor can be collided with
    pub fn is_ghost(&self) -> bool {
        self.ghost_timer > 0.0
    }

    pub fn end_ghost(&mut self) {
        self.ghost_timer = 0.0;
    }

    /// Whether the body has enough mass to boost
    pub fn can_boost(&self) -> bool {
        self.mass >= mass::MIN_TO_BOOST
    }

    /// Apply a steering intent.
    ///
    /// Out-of-order intents (sequence not newer than the last one applied)
    /// and non-finite headings are ignored. The first intent that turns or
    /// boosts ends spawn protection. Returns true if the intent was applied.
    pub fn apply_intent(&mut self, sequence: u64, heading: f32, boost: bool) -> bool {
        if !self.alive || !heading.is_finite() {
            return false;
        }
        if sequence != 0 && sequence <= self.last_input_sequence {
            return false;
        }
        if sequence != 0 {
            self.last_input_sequence = sequence;
        }

        let heading = wrap_angle(heading);
        let turned = angle_delta(self.target_heading, heading).abs() > STEER_EPSILON;
        let boost = boost && self.can_boost();

        if self.is_ghost() && (turned || boost) {
            self.end_ghost();
        }

        self.target_heading = heading;
        self.boosting = boost;
        true
    }

    /// Eat food of `amount` mass. Growth stops at the mass cap; the food is
    /// still consumed. Returns the mass actually gained.
    pub fn eat(&mut self, amount: f32) -> f32 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let before = self.mass;
        self.mass = (self.mass + amount).min(mass::MAXIMUM);
        self.mass - before
    }

    /// Add collected money
    pub fn collect_money(&mut self, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.money += value;
        }
    }

    /// Record the head into the trail and resample the visible segments
    pub fn resample(&mut self) {
        self.trail.record(self.position);
        self.trail.truncate_for_mass(self.mass);
        self.segments = self.sampler.sample(&self.trail, self.mass);
    }

    /// Mark dead and hide the body. Returns the segments it died with.
    pub fn kill(&mut self) -> Vec<VisibleSegment> {
        self.alive = false;
        self.boosting = false;
        self.trail.clear();
        std::mem::take(&mut self.segments)
    }

    /// Owner's score as seen by the wallet collaborator
    pub fn standing(&self) -> Standing {
        Standing {
            mass: self.mass,
            money: self.money,
        }
    }
}

/// Score and earnings of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub mass: f32,
    pub money: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_body() -> Body {
        Body::new(Uuid::new_v4(), "Test".to_string(), false, 0, Vec2::new(100.0, 0.0), 0.0)
    }

    #[test]
    fn test_body_new() {
        let body = test_body();
        assert!(body.alive);
        assert!(body.is_ghost());
        assert_eq!(body.mass, mass::STARTING);
        assert_eq!(body.segments.len(), 1);
        assert_eq!(body.segments[0].position(), Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_eat_caps_at_maximum() {
        let mut body = test_body();
        for _ in 0..10 {
            body.eat(1.0);
        }
        assert_eq!(body.mass, 16.0);

        body.mass = mass::MAXIMUM;
        assert_eq!(body.eat(5.0), 0.0);
        assert_eq!(body.mass, mass::MAXIMUM);
    }

    #[test]
    fn test_eat_rejects_bad_amounts() {
        let mut body = test_body();
        assert_eq!(body.eat(f32::NAN), 0.0);
        assert_eq!(body.eat(-3.0), 0.0);
        assert_eq!(body.mass, mass::STARTING);
    }

    #[test]
    fn test_straight_intent_keeps_ghost() {
        let mut body = test_body();
        assert!(body.apply_intent(1, 0.0, false));
        assert!(body.is_ghost());
    }

    #[test]
    fn test_turning_ends_ghost() {
        let mut body = test_body();
        assert!(body.apply_intent(1, 1.0, false));
        assert!(!body.is_ghost());
        assert_eq!(body.target_heading, 1.0);
    }

    #[test]
    fn test_boost_ends_ghost() {
        let mut body = test_body();
        assert!(body.apply_intent(1, 0.0, true));
        assert!(!body.is_ghost());
        assert!(body.boosting);
    }

    #[test]
    fn test_boost_refused_below_minimum() {
        let mut body = test_body();
        body.mass = mass::MIN_TO_BOOST - 1.0;
        body.apply_intent(1, 0.0, true);
        assert!(!body.boosting);
    }

    #[test]
    fn test_stale_and_invalid_intents_ignored() {
        let mut body = test_body();
        assert!(body.apply_intent(5, 0.5, false));
        assert!(!body.apply_intent(4, 2.0, false));
        assert!(!body.apply_intent(6, f32::NAN, false));
        assert_eq!(body.target_heading, 0.5);
        assert_eq!(body.last_input_sequence, 5);
    }

    #[test]
    fn test_kill_hides_body() {
        let mut body = test_body();
        let segments = body.kill();
        assert_eq!(segments.len(), 1);
        assert!(!body.alive);
        assert!(body.segments.is_empty());
        assert!(!body.apply_intent(10, 1.0, true));
    }

    #[test]
    fn test_collect_money() {
        let mut body = test_body();
        body.collect_money(2.5);
        body.collect_money(f64::NAN);
        body.collect_money(-1.0);
        assert_eq!(body.standing().money, 2.5);
    }
}
