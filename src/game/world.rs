//! One arena's simulation state and its tick
//!
//! The world owns every body and food item in a room. Inbound handlers
//! spawn/remove bodies and apply intents; the room's tick calls [`World::step`]
//! which runs the fixed pipeline (ghost expiry, movement, outer-ring slide,
//! food, collisions and boundaries, bot respawns, arena sizing). Everything
//! clients must hear about is queued as a [`GameEvent`] and drained by the
//! room after the tick.

use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::game::body::{Body, BodyId, Standing};
use crate::game::constants::{ai, food as food_consts, mass_to_radius, mass as mass_consts, room, spawn};
use crate::game::food::{death_drops, Food, FoodField, FoodId, FoodKind};
use crate::game::spatial::{SpatialGrid, SEGMENT_GRID_CELL_SIZE};
use crate::game::systems::arena::{self, ArenaEvent, ArenaSize, ArenaSizer};
use crate::game::systems::{physics, spawn as spawn_locator};
use crate::util::vec2::Vec2;

/// Handle stored in the segment grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentRef {
    pub body_id: BodyId,
    /// 0 is the head
    pub index: u16,
    /// Owner's collision radius
    pub radius: f32,
    /// Owner is spawn-protected
    pub ghost: bool,
}

/// Why a body died
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathReason {
    /// Head ran into another body
    Collision,
    /// Head left the arena
    Boundary,
    /// Owner left or disconnected
    Left,
}

/// Gameplay events broadcast to every member of the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameEvent {
    FoodSpawned(Food),
    FoodEaten { food_id: FoodId, body_id: BodyId, mass_gained: f32 },
    CrateCollected { food_id: FoodId, body_id: BodyId, value: f64 },
    CrateExpired { food_id: FoodId },
    /// Remains timed out, or food was left outside a shrunken arena
    FoodRemoved { food_id: FoodId },
    BodyDied { body_id: BodyId, killer: Option<BodyId>, reason: DeathReason },
    BodyJoined { body_id: BodyId, name: String, is_bot: bool, color_index: u8 },
    BodyLeft { body_id: BodyId },
}

/// What a tick produced besides queued events
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// New arena size, if the sizing policy emitted one
    pub resized: Option<ArenaSize>,
    /// Human bodies that died this tick and must rejoin
    pub dead_players: Vec<BodyId>,
}

/// Bot waiting to be replaced
#[derive(Debug, Clone)]
struct PendingBot {
    timer: f32,
    color_index: u8,
}

/// Complete state of one arena
#[derive(Debug, Clone)]
pub struct World {
    pub tick: u64,
    pub bodies: HashMap<BodyId, Body>,
    pub food: FoodField,
    pub arena: ArenaSizer,
    /// Every visible segment, rebuilt after movement each tick
    pub segment_grid: SpatialGrid<SegmentRef>,
    pending_bots: Vec<PendingBot>,
    events: Vec<GameEvent>,
}

impl World {
    /// A world with its pellet field already filled
    pub fn new<R: Rng>(pellet_target: usize, rng: &mut R) -> Self {
        let arena = ArenaSizer::new(1);
        let mut food = FoodField::new(pellet_target);
        food.refill_pellets(arena.current().radius(), 0, rng);

        Self {
            tick: 0,
            bodies: HashMap::new(),
            food,
            arena,
            segment_grid: SpatialGrid::new(SEGMENT_GRID_CELL_SIZE),
            pending_bots: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn arena_size(&self) -> ArenaSize {
        self.arena.current()
    }

    /// Players plus bots, counting bots waiting to respawn
    pub fn population(&self) -> usize {
        self.bodies.len() + self.pending_bots.len()
    }

    pub fn human_count(&self) -> usize {
        self.bodies.values().filter(|b| !b.is_bot).count()
    }

    pub fn bot_count(&self) -> usize {
        self.bodies.values().filter(|b| b.is_bot).count() + self.pending_bots.len()
    }

    pub fn get_body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn standing(&self, id: BodyId) -> Option<Standing> {
        self.bodies.get(&id).map(|b| b.standing())
    }

    /// Heads of every living body
    pub fn heads(&self) -> Vec<Vec2> {
        self.bodies.values().filter(|b| b.alive).map(|b| b.position).collect()
    }

    /// Place a new body using the safe spawn locator
    pub fn spawn_body<R: Rng>(
        &mut self,
        id: BodyId,
        name: String,
        is_bot: bool,
        color_index: u8,
        money: f64,
        rng: &mut R,
    ) -> &Body {
        let point = spawn_locator::locate(&self.heads(), self.arena_size().radius(), rng);

        let mut body = Body::new(id, name, is_bot, color_index, point.position, point.heading);
        body.outer_ring = point.is_outer_ring;
        body.money = if money.is_finite() { money.max(0.0) } else { 0.0 };
        body.spawn_tick = self.tick;

        debug!(
            "Spawned {} {} at ({:.0}, {:.0}){}",
            if is_bot { "bot" } else { "player" },
            body.name,
            point.position.x,
            point.position.y,
            if point.is_outer_ring { " on outer ring" } else { "" }
        );

        self.events.push(GameEvent::BodyJoined {
            body_id: id,
            name: body.name.clone(),
            is_bot,
            color_index,
        });
        self.bodies.insert(id, body);
        &self.bodies[&id]
    }

    /// Spawn a bot with a random name
    pub fn spawn_bot<R: Rng>(&mut self, color_index: u8, rng: &mut R) -> BodyId {
        let id = Uuid::new_v4();
        let name = ai::NAMES[rng.gen_range(0..ai::NAMES.len())].to_string();
        self.spawn_body(id, name, true, color_index % room::COLOR_COUNT, 0.0, rng);
        id
    }

    /// Remove a body whose owner left, dropping its mass and money
    pub fn remove_body<R: Rng>(&mut self, id: BodyId, rng: &mut R) -> Option<Body> {
        let mut body = self.bodies.remove(&id)?;
        self.drop_remains(&mut body, rng);
        self.events.push(GameEvent::BodyDied {
            body_id: id,
            killer: None,
            reason: DeathReason::Left,
        });
        self.events.push(GameEvent::BodyLeft { body_id: id });
        Some(body)
    }

    /// Forward a steering intent to a body
    pub fn apply_intent(&mut self, id: BodyId, sequence: u64, heading: f32, boost: bool) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => body.apply_intent(sequence, heading, boost),
            None => {
                debug!("Intent for unknown body {}", id);
                false
            }
        }
    }

    /// Take all events queued since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Rebuild the segment grid from current body segments
    pub fn rebuild_segment_grid(&mut self) {
        let segments = self.bodies.values().filter(|b| b.alive).flat_map(|body| {
            let radius = body.radius();
            let ghost = body.is_ghost();
            body.segments.iter().enumerate().map(move |(index, segment)| {
                let handle = SegmentRef {
                    body_id: body.id,
                    index: index as u16,
                    radius,
                    ghost,
                };
                (segment.position(), handle)
            })
        });
        self.segment_grid.rebuild(segments);
    }

    /// Advance the simulation by one tick
    pub fn step<R: Rng>(&mut self, dt: f32, rng: &mut R) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // Ghost expiry
        for body in self.bodies.values_mut() {
            if body.ghost_timer > 0.0 {
                body.ghost_timer = (body.ghost_timer - dt).max(0.0);
            }
        }

        // Movement, boost drain, trail and resampling
        physics::update(&mut self.bodies, dt);

        let size = self.arena_size();
        for event in arena::slide_outer_ring(&mut self.bodies, size, dt) {
            if let ArenaEvent::OuterRingEntered { body_id } = event {
                debug!("Body {} entered the arena from the outer ring", body_id);
            }
        }

        self.update_food(dt, rng);

        self.rebuild_segment_grid();
        let deaths = self.find_deaths();
        for (body_id, killer, reason) in deaths {
            let Some(mut body) = self.bodies.remove(&body_id) else {
                continue;
            };
            self.drop_remains(&mut body, rng);
            self.events.push(GameEvent::BodyDied {
                body_id,
                killer,
                reason,
            });

            if body.is_bot {
                self.pending_bots.push(PendingBot {
                    timer: spawn::BOT_RESPAWN_DELAY,
                    color_index: body.color_index,
                });
            } else {
                outcome.dead_players.push(body_id);
            }
        }

        self.respawn_bots(dt, rng);

        if let Some(size) = self.arena.update(self.population()) {
            let rescued = arena::rescue_outside(&mut self.bodies, size);
            // Food past the new edge is unreachable; pellets are re-seeded inside
            let culled = self.food.cull_outside(size.radius());
            for item in &culled {
                self.events.push(GameEvent::FoodRemoved { food_id: item.id });
            }
            self.refill_food(rng);
            debug!(
                "Arena resized to {:.0} for population {} ({} bodies sliding back in, {} food culled)",
                size.width,
                self.population(),
                rescued,
                culled.len()
            );
            outcome.resized = Some(size);
        }

        self.tick += 1;
        outcome
    }

    /// Pickups, crate expiry and pellet respawn
    fn update_food<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        let mut eaters: Vec<(BodyId, Vec2, f32)> = self
            .bodies
            .values()
            .filter(|b| b.alive)
            .map(|b| (b.id, b.position, b.radius() + food_consts::PICKUP_RADIUS))
            .collect();
        // Deterministic order so contested food goes to the same body every run
        eaters.sort_by_key(|(id, _, _)| *id);

        for (body_id, head, reach) in eaters {
            let eaten = self.food.take_within(head, reach);
            let Some(body) = self.bodies.get_mut(&body_id) else {
                continue;
            };
            for item in eaten {
                match item.kind {
                    FoodKind::Pellet | FoodKind::Remains => {
                        let mass_gained = body.eat(item.mass);
                        self.events.push(GameEvent::FoodEaten {
                            food_id: item.id,
                            body_id,
                            mass_gained,
                        });
                    }
                    FoodKind::MoneyCrate => {
                        body.collect_money(item.value);
                        self.events.push(GameEvent::CrateCollected {
                            food_id: item.id,
                            body_id,
                            value: item.value,
                        });
                    }
                }
            }
        }

        for expired in self.food.expire(dt) {
            self.events.push(match expired.kind {
                FoodKind::MoneyCrate => GameEvent::CrateExpired { food_id: expired.id },
                FoodKind::Pellet | FoodKind::Remains => GameEvent::FoodRemoved { food_id: expired.id },
            });
        }

        self.refill_food(rng);
    }

    /// Re-seed pellets inside the current arena
    fn refill_food<R: Rng>(&mut self, rng: &mut R) {
        let radius = self.arena_size().radius();
        for id in self.food.refill_pellets(radius, self.tick, rng) {
            if let Some(item) = self.food.get(id) {
                self.events.push(GameEvent::FoodSpawned(item.clone()));
            }
        }
    }

    /// Collisions against other bodies and boundary exits
    fn find_deaths(&self) -> Vec<(BodyId, Option<BodyId>, DeathReason)> {
        let mut deaths = Vec::new();
        let query_reach = mass_to_radius(mass_consts::MAXIMUM) * 2.0;

        for body in self.bodies.values() {
            if !body.alive || body.is_ghost() {
                continue;
            }
            let head_radius = body.radius();

            let hit = self
                .segment_grid
                .query_radius(body.position, query_reach)
                .into_iter()
                .filter(|(_, seg)| seg.body_id != body.id && !seg.ghost)
                .filter(|(p, seg)| p.distance_to(body.position) < head_radius + seg.radius)
                .min_by(|a, b| {
                    a.0.distance_sq_to(body.position)
                        .partial_cmp(&b.0.distance_sq_to(body.position))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

            if let Some((_, seg)) = hit {
                deaths.push((body.id, Some(seg.body_id), DeathReason::Collision));
            }
        }

        for event in arena::check_boundaries(&self.bodies, self.arena_size()) {
            if let ArenaEvent::BodyLeftArena { body_id } = event {
                if !deaths.iter().any(|(id, _, _)| *id == body_id) {
                    deaths.push((body_id, None, DeathReason::Boundary));
                }
            }
        }

        deaths
    }

    /// Turn a dead body's mass and money into collectibles along its segments
    fn drop_remains<R: Rng>(&mut self, body: &mut Body, rng: &mut R) {
        let head = body.position;
        let segments = body.kill();
        for drop in death_drops(&segments, head, body.mass, body.money, rng) {
            let id = self.food.spawn(drop.kind, drop.position, drop.mass, drop.value, self.tick);
            if let Some(item) = self.food.get(id) {
                self.events.push(GameEvent::FoodSpawned(item.clone()));
            }
        }
    }

    fn respawn_bots<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        let mut ready = Vec::new();
        self.pending_bots.retain_mut(|pending| {
            pending.timer -= dt;
            if pending.timer <= 0.0 {
                ready.push(pending.color_index);
                false
            } else {
                true
            }
        });
        for color_index in ready {
            self.spawn_bot(color_index, rng);
        }
    }
}
