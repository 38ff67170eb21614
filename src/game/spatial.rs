//! Spatial hash grid for O(n) proximity queries
//!
//! Divides the arena into square cells and buckets items by position.
//! Used for body segments (collisions, bot avoidance) and food pickup, so
//! a query only walks the handful of cells that can contain a hit.

use crate::util::vec2::Vec2;
use hashbrown::HashMap;
use smallvec::SmallVec;

// ============================================================================
// Grid Constants
// ============================================================================

/// Cell size for the body segment grid (world units)
/// Roughly 2x the largest body radius so head-vs-segment hits stay in the 3x3 block
pub const SEGMENT_GRID_CELL_SIZE: f32 = 32.0;

/// Cell size for the food grid
pub const FOOD_GRID_CELL_SIZE: f32 = 128.0;

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for item vectors within cells
const CELL_INITIAL_CAPACITY: usize = 8;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Query results small enough to stay on the stack most of the time
pub type NearbyItems<T> = SmallVec<[(Vec2, T); 16]>;

/// Spatial hash grid over copyable handles
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    /// Cell size in world units
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    /// Map from cell key to items in that cell
    cells: HashMap<CellKey, Vec<(Vec2, T)>>,
}

impl<T: Copy + PartialEq> SpatialGrid<T> {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(GRID_INITIAL_CAPACITY),
        }
    }

    /// Clear all items, keeping cell allocations for the next rebuild
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    pub fn insert(&mut self, position: Vec2, item: T) {
        if !position.is_finite() {
            return;
        }
        let cell_key = self.position_to_cell(position);
        self.cells
            .entry(cell_key)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push((position, item));
    }

    /// Remove an item previously inserted at `position`.
    /// Returns true if it was found.
    pub fn remove(&mut self, position: Vec2, item: T) -> bool {
        let cell_key = self.position_to_cell(position);
        if let Some(cell) = self.cells.get_mut(&cell_key) {
            if let Some(idx) = cell.iter().position(|(_, it)| *it == item) {
                cell.swap_remove(idx);
                return true;
            }
        }
        false
    }

    /// Every item in the cells overlapping a square of half-width `radius`.
    /// Callers filter by exact distance.
    pub fn query_cells(&self, position: Vec2, radius: f32) -> impl Iterator<Item = &(Vec2, T)> + '_ {
        let (cx, cy) = self.position_to_cell(position);
        let reach = (radius.max(0.0) * self.inv_cell_size).ceil() as i32;

        (-reach..=reach).flat_map(move |dx| {
            (-reach..=reach).flat_map(move |dy| {
                self.cells
                    .get(&(cx + dx, cy + dy))
                    .into_iter()
                    .flat_map(|cell| cell.iter())
            })
        })
    }

    /// Items strictly within `radius` of `position`
    pub fn query_radius(&self, position: Vec2, radius: f32) -> NearbyItems<T> {
        let radius_sq = radius * radius;
        self.query_cells(position, radius)
            .filter(|(p, _)| p.distance_sq_to(position) < radius_sq)
            .copied()
            .collect()
    }

    /// Closest item within `radius` accepted by `filter`, with its distance
    pub fn nearest<F>(&self, position: Vec2, radius: f32, mut filter: F) -> Option<(Vec2, T, f32)>
    where
        F: FnMut(&T) -> bool,
    {
        let radius_sq = radius * radius;
        let mut best: Option<(Vec2, T, f32)> = None;

        for &(p, item) in self.query_cells(position, radius) {
            let d_sq = p.distance_sq_to(position);
            if d_sq >= radius_sq || !filter(&item) {
                continue;
            }
            if best.map_or(true, |(_, _, b)| d_sq < b) {
                best = Some((p, item, d_sq));
            }
        }

        best.map(|(p, item, d_sq)| (p, item, d_sq.sqrt()))
    }

    /// Rebuild the grid from scratch
    pub fn rebuild(&mut self, items: impl Iterator<Item = (Vec2, T)>) {
        self.clear();
        for (position, item) in items {
            self.insert(position, item);
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(|c| c.is_empty())
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> SpatialGridStats {
        let non_empty_cells = self.cells.values().filter(|c| !c.is_empty()).count();
        let total_items: usize = self.cells.values().map(|c| c.len()).sum();
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);

        SpatialGridStats {
            non_empty_cells,
            total_items,
            max_per_cell,
        }
    }
}

/// Statistics about a spatial grid
#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_items: usize,
    pub max_per_cell: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid() {
        let grid: SpatialGrid<u32> = SpatialGrid::new(64.0);
        assert_eq!(grid.cell_size(), 64.0);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_insert_and_query() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(100.0, 100.0), 7u32);

        let results = grid.query_radius(Vec2::new(100.0, 100.0), 20.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 7);
    }

    #[test]
    fn test_query_crosses_cells() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(80.0, 80.0), 1u32);
        grid.insert(Vec2::new(130.0, 80.0), 2u32);
        grid.insert(Vec2::new(400.0, 80.0), 3u32);

        let results = grid.query_radius(Vec2::new(80.0, 80.0), 100.0);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, id)| *id != 3));
    }

    #[test]
    fn test_query_reaches_beyond_one_cell() {
        let mut grid = SpatialGrid::new(32.0);
        grid.insert(Vec2::new(300.0, 0.0), 1u32);

        assert!(grid.query_radius(Vec2::ZERO, 320.0).len() == 1);
        assert!(grid.query_radius(Vec2::ZERO, 250.0).is_empty());
    }

    #[test]
    fn test_nearest_with_filter() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(10.0, 0.0), 1u32);
        grid.insert(Vec2::new(20.0, 0.0), 2u32);
        grid.insert(Vec2::new(30.0, 0.0), 3u32);

        let (_, id, d) = grid.nearest(Vec2::ZERO, 50.0, |_| true).unwrap();
        assert_eq!(id, 1);
        assert!((d - 10.0).abs() < 1e-5);

        let (_, id, _) = grid.nearest(Vec2::ZERO, 50.0, |id| *id != 1).unwrap();
        assert_eq!(id, 2);

        assert!(grid.nearest(Vec2::ZERO, 5.0, |_| true).is_none());
    }

    #[test]
    fn test_remove() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(100.0, 100.0), 1u64);
        grid.insert(Vec2::new(110.0, 100.0), 2u64);

        assert!(grid.remove(Vec2::new(100.0, 100.0), 1));
        assert!(!grid.remove(Vec2::new(100.0, 100.0), 1));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_non_finite_positions_are_ignored() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(f32::NAN, 0.0), 1u32);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_rebuild_and_stats() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(Vec2::new(5000.0, 5000.0), 99u32);

        grid.rebuild(
            vec![
                (Vec2::new(100.0, 100.0), 1u32),
                (Vec2::new(101.0, 100.0), 2),
                (Vec2::new(102.0, 100.0), 3),
                (Vec2::new(500.0, 500.0), 4),
            ]
            .into_iter(),
        );

        let stats = grid.stats();
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.non_empty_cells, 2);
        assert_eq!(stats.max_per_cell, 3);
    }
}
