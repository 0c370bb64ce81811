//! Simulation configuration and the global tick counter.

use crate::components::EnemyClass;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// One row of the weighted enemy spawn table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnemyWeight {
    pub class: EnemyClass,
    pub weight: u32,
}

/// Configuration for a simulation run.
///
/// Loadable from JSON so level setup and the game-settings data source can
/// provide grid dimensions, the target cell, spawn lanes, and the weighted
/// enemy table without recompiling.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g. 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Grid dimensions in cells.
    pub grid_width: i32,
    pub grid_length: i32,
    /// Size of each grid cell in world units.
    pub cell_size: f32,
    /// World position of the grid's (0, 0) corner.
    pub grid_origin: (f32, f32),
    /// Cell every agent converges on.
    pub target: (i32, i32),
    /// Interior rectangle (min_x, min_z, max_x, max_z) for bounded
    /// re-solves. `None` keeps the whole grid in scope.
    pub pathfinding_region: Option<(i32, i32, i32, i32)>,
    /// Seconds between spawns on each lane.
    pub spawn_interval: f32,
    /// World positions agents spawn from. One timer per lane.
    pub spawn_lanes: Vec<(f32, f32)>,
    /// Weighted enemy-type table sampled on each spawn.
    pub enemy_table: Vec<EnemyWeight>,
    /// Shield dome radius around its anchor cell.
    pub shield_radius: f32,
    pub shield_health: f32,
    /// Cell size of the agent spatial grid.
    pub spatial_cell_size: f32,
    /// Seed for the spawn table sampler. Fixed seed, reproducible run.
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            grid_width: 64,
            grid_length: 64,
            cell_size: 1.0,
            grid_origin: (0.0, 0.0),
            target: (32, 32),
            pathfinding_region: None,
            spawn_interval: 2.0,
            spawn_lanes: Vec::new(),
            enemy_table: vec![
                EnemyWeight {
                    class: EnemyClass::Husk,
                    weight: 6,
                },
                EnemyWeight {
                    class: EnemyClass::Sprinter,
                    weight: 3,
                },
                EnemyWeight {
                    class: EnemyClass::Juggernaut,
                    weight: 1,
                },
            ],
            shield_radius: 6.0,
            shield_health: 500.0,
            spatial_cell_size: 8.0,
            rng_seed: 0x5eed,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from the game-settings JSON source.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Global simulation tick counter, incremented each fixed update.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_round_trip() {
        let config = SimConfig {
            grid_width: 20,
            grid_length: 20,
            target: (10, 10),
            spawn_lanes: vec![(0.0, 0.0), (19.0, 0.0)],
            ..Default::default()
        };

        let json = config.to_json().unwrap();
        let restored = SimConfig::from_json(&json).unwrap();
        assert_eq!(restored.grid_width, 20);
        assert_eq!(restored.target, (10, 10));
        assert_eq!(restored.spawn_lanes.len(), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json(r#"{"grid_width": 32}"#).unwrap();
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.grid_length, 64);
        assert!(!config.enemy_table.is_empty());
    }
}
