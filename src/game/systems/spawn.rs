//! Safe spawn locator
//!
//! Picks a spawn point away from every live head. The arena's bounding
//! square is split into a density grid; the emptiest cells are tried first.
//! When nothing inside the arena is far enough from everyone, the body is
//! placed on a ring just outside the edge and slides in.

use rand::seq::SliceRandom;
use rand::Rng;
use std::f32::consts::{PI, TAU};

use crate::game::constants::spawn::*;
use crate::util::vec2::{wrap_angle, Vec2};

/// Where and how a body should enter the arena
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub position: Vec2,
    /// Initial heading (outer-ring spawns face the centre)
    pub heading: f32,
    pub is_outer_ring: bool,
}

/// Per-cell head density over the arena's bounding square
struct DensityGrid {
    cells: [[f32; GRID_SIZE]; GRID_SIZE],
    origin: f32,
    cell_size: f32,
}

impl DensityGrid {
    fn new(arena_radius: f32) -> Self {
        Self {
            cells: [[0.0; GRID_SIZE]; GRID_SIZE],
            origin: -arena_radius,
            cell_size: (arena_radius * 2.0) / GRID_SIZE as f32,
        }
    }

    fn cell_of(&self, p: Vec2) -> (usize, usize) {
        let index = |v: f32| {
            let i = ((v - self.origin) / self.cell_size).floor();
            i.clamp(0.0, (GRID_SIZE - 1) as f32) as usize
        };
        (index(p.x), index(p.y))
    }

    fn add_head(&mut self, head: Vec2) {
        let (cx, cy) = self.cell_of(head);
        for dx in -1i32..=1 {
            for dy in -1i32..=1 {
                let x = cx as i32 + dx;
                let y = cy as i32 + dy;
                if x < 0 || y < 0 || x >= GRID_SIZE as i32 || y >= GRID_SIZE as i32 {
                    continue;
                }
                let weight = if dx == 0 && dy == 0 { 1.0 } else { NEIGHBOR_BLEED };
                self.cells[x as usize][y as usize] += weight;
            }
        }
    }

    /// Cells ordered emptiest first; equal densities in random order
    fn ranked_cells<R: Rng>(&self, rng: &mut R) -> Vec<(usize, usize)> {
        let mut cells: Vec<(usize, usize)> = (0..GRID_SIZE)
            .flat_map(|x| (0..GRID_SIZE).map(move |y| (x, y)))
            .collect();
        cells.shuffle(rng);
        // Stable sort keeps the shuffled order among ties
        cells.sort_by(|a, b| {
            self.cells[a.0][a.1]
                .partial_cmp(&self.cells[b.0][b.1])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        cells
    }

    fn random_point_in<R: Rng>(&self, (x, y): (usize, usize), rng: &mut R) -> Vec2 {
        let min_x = self.origin + x as f32 * self.cell_size;
        let min_y = self.origin + y as f32 * self.cell_size;
        Vec2::new(
            min_x + rng.gen::<f32>() * self.cell_size,
            min_y + rng.gen::<f32>() * self.cell_size,
        )
    }
}

/// Find a spawn point at least `MIN_DISTANCE` from every head in `heads`
pub fn locate<R: Rng>(heads: &[Vec2], arena_radius: f32, rng: &mut R) -> SpawnPoint {
    let heads: Vec<Vec2> = heads.iter().copied().filter(|h| h.is_finite()).collect();

    if arena_radius.is_finite() && arena_radius > EDGE_MARGIN {
        let mut grid = DensityGrid::new(arena_radius);
        for head in &heads {
            grid.add_head(*head);
        }

        let usable_radius_sq = (arena_radius - EDGE_MARGIN).powi(2);
        let min_distance_sq = MIN_DISTANCE * MIN_DISTANCE;

        for cell in grid.ranked_cells(rng) {
            for _ in 0..ATTEMPTS_PER_CELL {
                let candidate = grid.random_point_in(cell, rng);
                if candidate.length_sq() > usable_radius_sq {
                    continue;
                }
                if heads.iter().all(|h| h.distance_sq_to(candidate) >= min_distance_sq) {
                    return SpawnPoint {
                        position: candidate,
                        heading: rng.gen_range(-PI..PI),
                        is_outer_ring: false,
                    };
                }
            }
        }
    }

    outer_ring(arena_radius, rng)
}

/// Spawn on the ring just outside the arena edge, facing the centre
pub fn outer_ring<R: Rng>(arena_radius: f32, rng: &mut R) -> SpawnPoint {
    let radius = if arena_radius.is_finite() { arena_radius.max(0.0) } else { 0.0 };
    let angle = rng.gen_range(0.0..TAU);
    SpawnPoint {
        position: Vec2::from_angle(angle) * (radius + OUTER_RING_MARGIN),
        heading: wrap_angle(angle + PI),
        is_outer_ring: true,
    }
}
