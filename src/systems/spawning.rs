//! Spawner - feeds agents into the simulation from configured lanes.
//!
//! Each lane has its own timer. When a timer expires the lane checks that
//! the flow field offers a path from its cell; if not, the expired timer is
//! left in place and the lane retries on the next tick instead of
//! propagating an error.

use crate::components::{AgentBundle, EnemyClass};
use crate::config::{EnemyWeight, SimConfig};
use crate::grid::FlowGrid;
use crate::systems::lifecycle::AgentRegistry;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-lane timers and the id/rng state of the spawner.
#[derive(Resource, Debug)]
pub struct SpawnerState {
    pub timers: Vec<f32>,
    pub next_agent_id: u32,
    pub paused: bool,
    rng: StdRng,
}

impl SpawnerState {
    pub fn new(lanes: usize, seed: u64) -> Self {
        Self {
            timers: vec![0.0; lanes],
            next_agent_id: 0,
            paused: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// System that spawns agents on expired lane timers.
///
/// ## Data Access
/// - Reads: DeltaTime, SimConfig, FlowGrid
/// - Writes: SpawnerState, AgentRegistry, Commands
pub fn spawn_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    grid: Res<FlowGrid>,
    mut state: ResMut<SpawnerState>,
    mut registry: ResMut<AgentRegistry>,
    mut commands: Commands,
) {
    if state.paused {
        return;
    }
    let delta = dt.0;
    let lanes = config.spawn_lanes.len().min(state.timers.len());

    for lane in 0..lanes {
        state.timers[lane] -= delta;
        if state.timers[lane] > 0.0 {
            continue;
        }

        let (lx, lz) = config.spawn_lanes[lane];
        let (cx, cz) = grid.world_to_cell(lx, lz);
        if !grid.has_path_from(cx, cz) {
            // No path from this lane yet; retry the same slot next tick.
            continue;
        }

        let class = pick_class(&config.enemy_table, &mut state.rng);
        let id = state.next_agent_id;
        state.next_agent_id = state.next_agent_id.wrapping_add(1);

        let entity = commands.spawn(AgentBundle::new(id, class, lx, lz)).id();
        registry.entities.push(entity);
        state.timers[lane] = config.spawn_interval;
    }
}

/// Sample the weighted enemy table.
fn pick_class(table: &[EnemyWeight], rng: &mut StdRng) -> EnemyClass {
    let total: u32 = table.iter().map(|entry| entry.weight).sum();
    if total == 0 {
        return EnemyClass::default();
    }
    let mut roll = rng.random_range(0..total);
    for entry in table {
        if roll < entry.weight {
            return entry.class;
        }
        roll -= entry.weight;
    }
    EnemyClass::default()
}
