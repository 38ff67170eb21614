//! Food, remains and money crates
//!
//! Pellets keep a constant count per room, remains are what a dead body
//! leaves behind along its last segments, and money crates carry the dead
//! body's balance until someone picks them up or they expire.

use hashbrown::HashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::food::*;
use crate::game::spatial::{SpatialGrid, FOOD_GRID_CELL_SIZE};
use crate::game::trail::VisibleSegment;
use crate::util::vec2::Vec2;

/// Food identifier, unique within a room
pub type FoodId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodKind {
    /// Ambient food, respawned to hold the room's pellet count
    Pellet,
    /// Mass dropped by a dead body; expires if uneaten
    Remains,
    /// Money dropped by a dead body; expires if uncollected
    MoneyCrate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: FoodId,
    pub position: Vec2,
    /// Mass gained by the eater
    pub mass: f32,
    /// Money gained by the eater (crates only)
    pub value: f64,
    pub kind: FoodKind,
    pub spawn_tick: u64,
    /// Seconds left before expiry, for kinds that expire
    #[serde(skip)]
    pub expires_in: Option<f32>,
}

/// A collectible to place when a body dies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeathDrop {
    pub kind: FoodKind,
    pub position: Vec2,
    pub mass: f32,
    pub value: f64,
}

/// Split a dead body's mass and money over its last visible segments.
///
/// Each segment receives `mass / k` of remains and, when the body carried
/// money, a crate worth `money / k`, where `k` is the segment count. A body
/// with no visible segments drops everything at its head.
pub fn death_drops<R: Rng>(
    segments: &[VisibleSegment],
    head: Vec2,
    mass: f32,
    money: f64,
    rng: &mut R,
) -> Vec<DeathDrop> {
    let anchors: Vec<Vec2> = if segments.is_empty() {
        vec![head]
    } else {
        segments.iter().map(|s| s.position()).collect()
    };
    let k = anchors.len();

    let remains_each = if mass.is_finite() && mass > 0.0 { mass / k as f32 } else { 0.0 };
    let crate_each = if money.is_finite() && money > 0.0 { money / k as f64 } else { 0.0 };

    let mut drops = Vec::with_capacity(k * 2);
    for anchor in anchors {
        if remains_each > 0.0 {
            drops.push(DeathDrop {
                kind: FoodKind::Remains,
                position: jitter(anchor, rng),
                mass: remains_each,
                value: 0.0,
            });
        }
        if crate_each > 0.0 {
            drops.push(DeathDrop {
                kind: FoodKind::MoneyCrate,
                position: jitter(anchor, rng),
                mass: 0.0,
                value: crate_each,
            });
        }
    }
    drops
}

fn jitter<R: Rng>(anchor: Vec2, rng: &mut R) -> Vec2 {
    anchor
        + Vec2::new(
            rng.gen_range(-REMAINS_JITTER..=REMAINS_JITTER),
            rng.gen_range(-REMAINS_JITTER..=REMAINS_JITTER),
        )
}

/// Uniformly random point inside a disc of `radius` centred at the origin
pub fn random_point_in_disc<R: Rng>(radius: f32, rng: &mut R) -> Vec2 {
    let r = radius.max(0.0) * rng.gen::<f32>().sqrt();
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec2::from_angle(angle) * r
}

/// All food in one room, indexed by id and by position
#[derive(Debug, Clone)]
pub struct FoodField {
    foods: HashMap<FoodId, Food>,
    grid: SpatialGrid<FoodId>,
    next_id: FoodId,
    pellet_target: usize,
    pellet_count: usize,
}

impl FoodField {
    pub fn new(pellet_target: usize) -> Self {
        Self {
            foods: HashMap::with_capacity(pellet_target * 2),
            grid: SpatialGrid::new(FOOD_GRID_CELL_SIZE),
            next_id: 1,
            pellet_target,
            pellet_count: 0,
        }
    }

    /// Place a food item and return its id
    pub fn spawn(&mut self, kind: FoodKind, position: Vec2, mass: f32, value: f64, tick: u64) -> FoodId {
        let id = self.next_id;
        self.next_id += 1;

        let expires_in = match kind {
            FoodKind::MoneyCrate => Some(CRATE_LIFETIME),
            FoodKind::Remains => Some(REMAINS_LIFETIME),
            FoodKind::Pellet => None,
        };
        if kind == FoodKind::Pellet {
            self.pellet_count += 1;
        }

        self.grid.insert(position, id);
        self.foods.insert(
            id,
            Food {
                id,
                position,
                mass,
                value,
                kind,
                spawn_tick: tick,
                expires_in,
            },
        );
        id
    }

    pub fn remove(&mut self, id: FoodId) -> Option<Food> {
        let food = self.foods.remove(&id)?;
        self.grid.remove(food.position, id);
        if food.kind == FoodKind::Pellet {
            self.pellet_count -= 1;
        }
        Some(food)
    }

    /// Remove and return every item within `radius` of `position`
    pub fn take_within(&mut self, position: Vec2, radius: f32) -> Vec<Food> {
        let hits = self.grid.query_radius(position, radius);
        hits.into_iter().filter_map(|(_, id)| self.remove(id)).collect()
    }

    /// Age expiring items and remove those whose time ran out
    pub fn expire(&mut self, dt: f32) -> Vec<Food> {
        let mut expired_ids = Vec::new();
        for food in self.foods.values_mut() {
            if let Some(left) = food.expires_in.as_mut() {
                *left -= dt;
                if *left <= 0.0 {
                    expired_ids.push(food.id);
                }
            }
        }
        expired_ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove every item farther than `radius` from the centre
    pub fn cull_outside(&mut self, radius: f32) -> Vec<Food> {
        let radius_sq = radius * radius;
        let outside: Vec<FoodId> = self
            .foods
            .values()
            .filter(|f| f.position.length_sq() > radius_sq)
            .map(|f| f.id)
            .collect();
        outside.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Top the pellet count back up to its target, returning the new ids
    pub fn refill_pellets<R: Rng>(&mut self, arena_radius: f32, tick: u64, rng: &mut R) -> Vec<FoodId> {
        let missing = self.pellet_target.saturating_sub(self.pellet_count);
        (0..missing)
            .map(|_| {
                let position = random_point_in_disc(arena_radius, rng);
                self.spawn(FoodKind::Pellet, position, PELLET_MASS, 0.0, tick)
            })
            .collect()
    }

    pub fn get(&self, id: FoodId) -> Option<&Food> {
        self.foods.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Food> {
        self.foods.values()
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }

    pub fn pellet_count(&self) -> usize {
        self.pellet_count
    }

    pub fn pellet_target(&self) -> usize {
        self.pellet_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn segments_along_x(count: usize) -> Vec<VisibleSegment> {
        (0..count)
            .map(|i| VisibleSegment {
                x: -(i as f32) * 10.0,
                y: 0.0,
                opacity: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_death_drops_preserve_totals() {
        let mut rng = StdRng::seed_from_u64(7);
        let segments = segments_along_x(16);
        let drops = death_drops(&segments, Vec2::ZERO, 16.0, 3.3, &mut rng);

        let mass: f32 = drops.iter().map(|d| d.mass).sum();
        let money: f64 = drops.iter().map(|d| d.value).sum();
        assert!((mass - 16.0).abs() < 1.0);
        assert!((money - 3.3).abs() < 1e-9);

        let remains = drops.iter().filter(|d| d.kind == FoodKind::Remains).count();
        let crates = drops.iter().filter(|d| d.kind == FoodKind::MoneyCrate).count();
        assert_eq!(remains, 16);
        assert_eq!(crates, 16);
    }

    #[test]
    fn test_death_drops_stay_near_segments() {
        let mut rng = StdRng::seed_from_u64(1);
        let segments = segments_along_x(5);
        let drops = death_drops(&segments, Vec2::ZERO, 5.0, 0.0, &mut rng);

        assert_eq!(drops.len(), 5);
        for (drop, seg) in drops.iter().zip(segments.iter()) {
            assert!((drop.position.x - seg.x).abs() <= REMAINS_JITTER);
            assert!((drop.position.y - seg.y).abs() <= REMAINS_JITTER);
        }
    }

    #[test]
    fn test_death_drops_without_segments_use_head() {
        let mut rng = StdRng::seed_from_u64(3);
        let head = Vec2::new(500.0, -200.0);
        let drops = death_drops(&[], head, 12.0, 4.0, &mut rng);

        assert_eq!(drops.len(), 2);
        assert!(drops.iter().all(|d| d.position.distance_to(head) < REMAINS_JITTER * 2.0));
        assert_eq!(drops[0].mass, 12.0);
        assert_eq!(drops[1].value, 4.0);
    }

    #[test]
    fn test_no_crates_without_money() {
        let mut rng = StdRng::seed_from_u64(3);
        let drops = death_drops(&segments_along_x(4), Vec2::ZERO, 8.0, f64::NAN, &mut rng);
        assert!(drops.iter().all(|d| d.kind == FoodKind::Remains));
    }

    #[test]
    fn test_random_point_in_disc() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            assert!(random_point_in_disc(1000.0, &mut rng).length() <= 1000.0 + 1e-3);
        }
    }

    #[test]
    fn test_refill_holds_pellet_count() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut field = FoodField::new(50);
        assert_eq!(field.refill_pellets(1500.0, 0, &mut rng).len(), 50);
        assert_eq!(field.pellet_count(), 50);

        let id = field.iter().next().map(|f| f.id).unwrap();
        field.remove(id);
        assert_eq!(field.pellet_count(), 49);

        let refilled = field.refill_pellets(1500.0, 1, &mut rng);
        assert_eq!(refilled.len(), 1);
        assert_eq!(field.pellet_count(), 50);
    }

    #[test]
    fn test_remains_do_not_count_as_pellets() {
        let mut field = FoodField::new(10);
        field.spawn(FoodKind::Remains, Vec2::ZERO, 2.0, 0.0, 0);
        assert_eq!(field.pellet_count(), 0);
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn test_take_within() {
        let mut field = FoodField::new(0);
        let near = field.spawn(FoodKind::Pellet, Vec2::new(5.0, 0.0), 1.0, 0.0, 0);
        let far = field.spawn(FoodKind::Pellet, Vec2::new(500.0, 0.0), 1.0, 0.0, 0);

        let eaten = field.take_within(Vec2::ZERO, 10.0);
        assert_eq!(eaten.len(), 1);
        assert_eq!(eaten[0].id, near);
        assert!(field.get(near).is_none());
        assert!(field.get(far).is_some());
    }

    #[test]
    fn test_crates_expire() {
        let mut field = FoodField::new(0);
        let crate_id = field.spawn(FoodKind::MoneyCrate, Vec2::ZERO, 0.0, 1.0, 0);
        let remains_id = field.spawn(FoodKind::Remains, Vec2::ZERO, 1.0, 0.0, 0);

        assert!(field.expire(CRATE_LIFETIME - 1.0).is_empty());
        let expired = field.expire(1.5);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, crate_id);
        assert!(field.get(remains_id).is_some());
    }

    #[test]
    fn test_remains_expire_after_lifetime() {
        let mut field = FoodField::new(0);
        let remains_id = field.spawn(FoodKind::Remains, Vec2::ZERO, 1.0, 0.0, 0);

        assert!(field.expire(REMAINS_LIFETIME - 1.0).is_empty());
        let expired = field.expire(1.5);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, remains_id);
        assert!(field.is_empty());
    }

    #[test]
    fn test_cull_outside_keeps_pellet_count_honest() {
        let mut field = FoodField::new(3);
        let inside = field.spawn(FoodKind::Pellet, Vec2::new(100.0, 0.0), 1.0, 0.0, 0);
        field.spawn(FoodKind::Pellet, Vec2::new(0.0, 900.0), 1.0, 0.0, 0);
        field.spawn(FoodKind::Remains, Vec2::new(-950.0, 0.0), 2.0, 0.0, 0);
        field.spawn(FoodKind::MoneyCrate, Vec2::new(700.0, 700.0), 0.0, 1.0, 0);

        let culled = field.cull_outside(500.0);
        assert_eq!(culled.len(), 3);
        assert_eq!(field.len(), 1);
        assert!(field.get(inside).is_some());
        assert_eq!(field.pellet_count(), 1);

        let mut rng = StdRng::seed_from_u64(9);
        let added = field.refill_pellets(500.0, 1, &mut rng);
        assert_eq!(added.len(), 2);
        assert!(field.iter().all(|f| f.position.length() <= 500.0));
    }
}
