use hashbrown::HashMap;
use rand::Rng;
use rayon::prelude::*;
use std::f32::consts::PI;

use crate::game::body::{Body, BodyId};
use crate::game::constants::ai::*;
use crate::game::world::World;
use crate::util::vec2::wrap_angle;

/// Bot behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    /// Drift around, re-rolling the heading now and then
    Wander,
    /// Steer away from a nearby body
    Avoid,
    /// Hunt a smaller human
    Aggro,
}

/// Per-bot memory kept between ticks
#[derive(Debug, Clone)]
pub struct BotBrain {
    pub mode: BotMode,
    /// Heading chosen by the last wander roll
    pub wander_heading: f32,
    /// Seconds until the next wander roll
    pub wander_timer: f32,
    /// Human being hunted while in `Aggro`
    pub target_id: Option<BodyId>,
}

impl Default for BotBrain {
    fn default() -> Self {
        Self {
            mode: BotMode::Wander,
            wander_heading: 0.0,
            wander_timer: 0.0,
            target_id: None,
        }
    }
}

/// Steering produced for one bot this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotIntent {
    pub target_heading: f32,
    pub boost: bool,
}

/// Drives every bot body in a room
#[derive(Debug, Default)]
pub struct BotController {
    brains: HashMap<BodyId, BotBrain>,
}

impl BotController {
    pub fn new() -> Self {
        Self {
            brains: HashMap::new(),
        }
    }

    pub fn register_bot(&mut self, bot_id: BodyId) {
        self.brains.entry(bot_id).or_default();
    }

    pub fn get(&self, bot_id: BodyId) -> Option<&BotBrain> {
        self.brains.get(&bot_id)
    }

    pub fn mode(&self, bot_id: BodyId) -> Option<BotMode> {
        self.brains.get(&bot_id).map(|b| b.mode)
    }

    pub fn len(&self) -> usize {
        self.brains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brains.is_empty()
    }

    /// Track bots that spawned or died since the last tick
    fn sync(&mut self, world: &World) {
        self.brains.retain(|id, _| world.bodies.get(id).map_or(false, |b| b.is_bot && b.alive));
        for body in world.bodies.values().filter(|b| b.is_bot && b.alive) {
            self.register_bot(body.id);
        }
    }

    /// Compute this tick's intents for every bot.
    /// Decisions run in parallel against the read-only world; brain updates
    /// are written back sequentially.
    pub fn update(&mut self, world: &World, dt: f32) -> Vec<(BodyId, BotIntent)> {
        self.sync(world);

        let snapshot: Vec<(BodyId, BotBrain)> = self
            .brains
            .iter()
            .map(|(&id, brain)| (id, brain.clone()))
            .collect();

        let decisions: Vec<(BodyId, BotBrain, BotIntent)> = snapshot
            .into_par_iter()
            .filter_map(|(bot_id, mut brain)| {
                let bot = world.bodies.get(&bot_id)?;
                let intent = decide(&mut brain, bot, world, dt, &mut rand::thread_rng());
                Some((bot_id, brain, intent))
            })
            .collect();

        let mut intents = Vec::with_capacity(decisions.len());
        for (bot_id, brain, intent) in decisions {
            if let Some(slot) = self.brains.get_mut(&bot_id) {
                *slot = brain;
            }
            intents.push((bot_id, intent));
        }
        intents
    }
}

/// Pick a mode and heading for one bot
pub fn decide<R: Rng>(brain: &mut BotBrain, bot: &Body, world: &World, dt: f32, rng: &mut R) -> BotIntent {
    // Closest segment of any other body
    let threat = world
        .segment_grid
        .nearest(bot.position, AVOID_RADIUS, |seg| seg.body_id != bot.id);

    if let Some((segment, _, distance)) = threat {
        brain.mode = BotMode::Avoid;
        brain.target_id = None;
        let away = if distance > f32::EPSILON {
            segment.angle_toward(bot.position)
        } else {
            wrap_angle(bot.heading + PI)
        };
        return BotIntent {
            target_heading: away,
            boost: bot.can_boost() && rng.gen_bool(AVOID_BOOST_CHANCE),
        };
    }

    if let Some(prey) = find_prey(bot, world) {
        brain.mode = BotMode::Aggro;
        brain.target_id = Some(prey.id);
        let distance = bot.position.distance_to(prey.position);
        return BotIntent {
            target_heading: bot.position.angle_toward(prey.position),
            boost: distance < AGGRO_BOOST_DISTANCE && bot.can_boost(),
        };
    }

    if brain.mode != BotMode::Wander {
        // Fresh roll when falling back to wandering
        brain.wander_timer = 0.0;
    }
    brain.mode = BotMode::Wander;
    brain.target_id = None;

    brain.wander_timer -= dt;
    if brain.wander_timer <= 0.0 {
        brain.wander_timer = rng.gen_range(WANDER_MIN_INTERVAL..=WANDER_MAX_INTERVAL);
        let radius = world.arena_size().radius();
        brain.wander_heading = if bot.position.length() > radius * WANDER_EDGE_FRACTION {
            let to_centre = (-bot.position).angle();
            wrap_angle(to_centre + rng.gen_range(-WANDER_CENTER_SPREAD..=WANDER_CENTER_SPREAD))
        } else {
            rng.gen_range(-PI..PI)
        };
    }

    BotIntent {
        target_heading: brain.wander_heading,
        boost: false,
    }
}

/// Nearest living human in hunting range that this bot outweighs
fn find_prey<'a>(bot: &Body, world: &'a World) -> Option<&'a Body> {
    let range_sq = HUNT_RANGE * HUNT_RANGE;
    world
        .bodies
        .values()
        .filter(|b| b.alive && !b.is_bot && !b.is_ghost())
        .filter(|b| bot.mass > b.mass * AGGRO_MASS_FRACTION)
        .map(|b| (b, b.position.distance_sq_to(bot.position)))
        .filter(|(_, d_sq)| *d_sq <= range_sq)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::physics::DT;
    use crate::game::trail::{Trail, TrailSampler};
    use crate::util::vec2::{angle_delta, Vec2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn empty_world() -> World {
        World::new(0, &mut StdRng::seed_from_u64(8))
    }

    /// Settled body lying along -x from `head`
    fn stretched(head: Vec2, mass: f32, is_bot: bool) -> Body {
        let mut body = Body::new(Uuid::new_v4(), "Test".to_string(), is_bot, 0, head, 0.0);
        body.mass = mass;
        body.trail = Trail::from((0..300).map(|i| head - Vec2::new(i as f32 * 4.0, 0.0)).collect::<Vec<_>>());
        body.sampler = TrailSampler::new(mass);
        body.segments = body.sampler.sample(&body.trail, mass);
        body.end_ghost();
        body
    }

    #[test]
    fn test_avoids_nearby_segment() {
        let mut world = empty_world();
        let player = stretched(Vec2::new(0.0, 0.0), 30.0, false);
        // A non-head segment of the player lies around x = -100
        let bot = stretched(Vec2::new(-100.0, 30.0), 10.0, true);
        let bot_id = bot.id;
        world.bodies.insert(player.id, player);
        world.bodies.insert(bot_id, bot);
        world.rebuild_segment_grid();

        let mut controller = BotController::new();
        let intents = controller.update(&world, DT);

        assert_eq!(controller.mode(bot_id), Some(BotMode::Avoid));
        let (_, intent) = intents.iter().find(|(id, _)| *id == bot_id).copied().unwrap();
        // Pointing away from the body below means heading up (+y)
        assert!(angle_delta(intent.target_heading, PI / 2.0).abs() < 0.3);
    }

    #[test]
    fn test_avoid_ignores_own_segments() {
        let mut world = empty_world();
        let bot = stretched(Vec2::ZERO, 30.0, true);
        let bot_id = bot.id;
        world.bodies.insert(bot_id, bot);
        world.rebuild_segment_grid();

        let mut controller = BotController::new();
        controller.update(&world, DT);
        assert_eq!(controller.mode(bot_id), Some(BotMode::Wander));
    }

    #[test]
    fn test_hunts_smaller_player() {
        let mut world = empty_world();
        let mut player = Body::new(Uuid::new_v4(), "Prey".to_string(), false, 0, Vec2::new(200.0, 0.0), 0.0);
        player.end_ghost();
        let player_id = player.id;
        let bot = Body::new(Uuid::new_v4(), "Hunter".to_string(), true, 0, Vec2::new(0.0, 0.0), PI);
        let bot_id = bot.id;
        world.bodies.insert(player_id, player);
        world.bodies.insert(bot_id, bot);
        world.rebuild_segment_grid();

        let mut controller = BotController::new();
        let intents = controller.update(&world, DT);

        assert_eq!(controller.mode(bot_id), Some(BotMode::Aggro));
        assert_eq!(controller.get(bot_id).and_then(|b| b.target_id), Some(player_id));
        let (_, intent) = intents[0];
        assert!(intent.target_heading.abs() < 1e-4);
        // 200 units away: not close enough to boost
        assert!(!intent.boost);
    }

    #[test]
    fn test_ignores_much_bigger_player() {
        let mut world = empty_world();
        let mut player = Body::new(Uuid::new_v4(), "Big".to_string(), false, 0, Vec2::new(100.0, 0.0), 0.0);
        player.mass = 60.0;
        player.end_ghost();
        let bot = Body::new(Uuid::new_v4(), "Small".to_string(), true, 0, Vec2::ZERO, PI);
        let bot_id = bot.id;
        world.bodies.insert(player.id, player);
        world.bodies.insert(bot_id, bot);
        world.rebuild_segment_grid();

        let mut controller = BotController::new();
        controller.update(&world, DT);
        assert_eq!(controller.mode(bot_id), Some(BotMode::Wander));
    }

    #[test]
    fn test_boosts_when_prey_close() {
        let mut world = empty_world();
        let mut player = Body::new(Uuid::new_v4(), "Prey".to_string(), false, 0, Vec2::new(80.0, 0.0), 0.0);
        player.end_ghost();
        let bot = Body::new(Uuid::new_v4(), "Hunter".to_string(), true, 0, Vec2::ZERO, PI);
        world.bodies.insert(player.id, player);
        world.bodies.insert(bot.id, bot);
        world.rebuild_segment_grid();

        let intents = BotController::new().update(&world, DT);
        assert!(intents[0].1.boost);
    }

    #[test]
    fn test_wander_biases_toward_centre_near_edge() {
        let world = empty_world();
        let radius = world.arena_size().radius();
        let bot = Body::new(Uuid::new_v4(), "Edge".to_string(), true, 0, Vec2::new(radius * 0.9, 0.0), 0.0);
        let mut rng = StdRng::seed_from_u64(77);

        for _ in 0..50 {
            let mut brain = BotBrain::default();
            let intent = decide(&mut brain, &bot, &world, DT, &mut rng);
            assert_eq!(brain.mode, BotMode::Wander);
            assert!(angle_delta(intent.target_heading, PI).abs() <= WANDER_CENTER_SPREAD + 1e-4);
            assert!(brain.wander_timer >= WANDER_MIN_INTERVAL && brain.wander_timer <= WANDER_MAX_INTERVAL);
        }
    }

    #[test]
    fn test_wander_holds_heading_between_rolls() {
        let world = empty_world();
        let bot = Body::new(Uuid::new_v4(), "Drifter".to_string(), true, 0, Vec2::ZERO, 0.0);
        let mut rng = StdRng::seed_from_u64(3);
        let mut brain = BotBrain::default();

        let first = decide(&mut brain, &bot, &world, DT, &mut rng);
        let second = decide(&mut brain, &bot, &world, DT, &mut rng);
        assert_eq!(first.target_heading, second.target_heading);
    }

    #[test]
    fn test_controller_tracks_bot_lifecycle() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut world = World::new(0, &mut rng);
        let a = world.spawn_bot(0, &mut rng);
        let b = world.spawn_bot(1, &mut rng);

        let mut controller = BotController::new();
        assert_eq!(controller.update(&world, DT).len(), 2);

        world.remove_body(a, &mut rng);
        controller.update(&world, DT);
        assert_eq!(controller.len(), 1);
        assert!(controller.get(b).is_some());
    }
}
