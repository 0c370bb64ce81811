//! Spatial partitioning for efficient neighbor queries.
//!
//! Provides O(1) cell lookup and O(k) neighbor queries where k is the number
//! of agents in nearby cells, rather than O(n) for brute force. The collision
//! resolver uses this as its broad phase, and chain-lightning hops and
//! movement separation query it too.

use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Grid-based spatial partitioning over the live agents.
///
/// Rebuilt at the start of every tick, before any system that queries it.
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in world units.
    pub cell_size: f32,
    /// Map from cell coordinates to agents in that cell.
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    /// Total tracked agents.
    count: usize,
}

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub agent_id: u32,
    pub x: f32,
    pub z: f32,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            count: 0,
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, z: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    /// Clear all entries (call before rebuilding each tick).
    pub fn clear(&mut self) {
        self.cells.clear();
        self.count = 0;
    }

    pub fn insert(&mut self, entity: Entity, agent_id: u32, x: f32, z: f32) {
        let cell = self.world_to_cell(x, z);
        self.cells.entry(cell).or_default().push(SpatialEntry {
            entity,
            agent_id,
            x,
            z,
        });
        self.count += 1;
    }

    /// All agents within `radius` of a ground-plane point, sorted closest
    /// first.
    pub fn query_radius(&self, x: f32, z: f32, radius: f32) -> Vec<SpatialEntry> {
        let radius_sq = radius * radius;
        let cells_to_check = (radius / self.cell_size).ceil() as i32 + 1;
        let center = self.world_to_cell(x, z);

        let mut results = Vec::new();
        for dx in -cells_to_check..=cells_to_check {
            for dz in -cells_to_check..=cells_to_check {
                let cell = (center.0 + dx, center.1 + dz);
                if let Some(entries) = self.cells.get(&cell) {
                    for entry in entries {
                        let dist_sq = (entry.x - x).powi(2) + (entry.z - z).powi(2);
                        if dist_sq <= radius_sq {
                            results.push(*entry);
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| {
            let da = (a.x - x).powi(2) + (a.z - z).powi(2);
            let db = (b.x - x).powi(2) + (b.z - z).powi(2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });

        results
    }

    /// Nearest agent within `radius` whose id is not in `exclude`.
    /// The greedy chain-lightning hop.
    pub fn nearest_excluding(
        &self,
        x: f32,
        z: f32,
        radius: f32,
        exclude: &[u32],
    ) -> Option<SpatialEntry> {
        self.query_radius(x, z, radius)
            .into_iter()
            .find(|e| !exclude.contains(&e.agent_id))
    }

    pub fn total_count(&self) -> usize {
        self.count
    }
}

/// System that rebuilds the spatial grid from live agents each tick.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(
        Entity,
        &crate::components::AgentId,
        &crate::components::Position,
        &crate::components::Dead,
    )>,
) {
    grid.clear();

    for (entity, id, pos, dead) in query.iter() {
        if dead.0 {
            continue;
        }
        grid.insert(entity, id.0, pos.x, pos.z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_grid_insert_query() {
        let mut grid = SpatialGrid::new(10.0);

        grid.insert(Entity::from_raw(1), 1, 5.0, 5.0);
        grid.insert(Entity::from_raw(2), 2, 15.0, 5.0);
        grid.insert(Entity::from_raw(3), 3, 100.0, 100.0);

        let nearby = grid.query_radius(5.0, 5.0, 15.0);
        assert_eq!(nearby.len(), 2);

        let nearby = grid.query_radius(5.0, 5.0, 5.0);
        assert_eq!(nearby.len(), 1);

        let nearby = grid.query_radius(100.0, 100.0, 10.0);
        assert_eq!(nearby.len(), 1);
        assert_eq!(grid.total_count(), 3);
    }

    #[test]
    fn test_query_sorted_closest_first() {
        let mut grid = SpatialGrid::new(10.0);

        grid.insert(Entity::from_raw(1), 1, 30.0, 0.0);
        grid.insert(Entity::from_raw(2), 2, 20.0, 0.0);
        grid.insert(Entity::from_raw(3), 3, 10.0, 0.0);

        let results = grid.query_radius(0.0, 0.0, 50.0);
        assert_eq!(results[0].agent_id, 3);
        assert_eq!(results[1].agent_id, 2);
        assert_eq!(results[2].agent_id, 1);
    }

    #[test]
    fn test_nearest_excluding_skips_visited() {
        let mut grid = SpatialGrid::new(10.0);

        grid.insert(Entity::from_raw(1), 1, 5.0, 0.0);
        grid.insert(Entity::from_raw(2), 2, 10.0, 0.0);

        let hop = grid.nearest_excluding(0.0, 0.0, 50.0, &[1]);
        assert_eq!(hop.unwrap().agent_id, 2);

        let none = grid.nearest_excluding(0.0, 0.0, 50.0, &[1, 2]);
        assert!(none.is_none());
    }
}
