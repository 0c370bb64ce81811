//! Building and shield damage aggregation.
//!
//! Converts per-agent attack state into accumulated damage against placed
//! structures and the shared shield. The shield resolves first and
//! exclusively: an agent flagged `is_at_shield` never damages the building
//! behind it.

use crate::components::*;
use crate::events::{BuildingDamageEvent, FrameEvents};
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// The shared shield dome. A resource, not an entity: there is at most one.
#[derive(Resource, Debug, Clone)]
pub struct ShieldState {
    pub active: bool,
    pub health: f32,
    pub max: f32,
    /// Ground-plane center of the dome.
    pub center: (f32, f32),
    pub radius: f32,
    /// Damage absorbed during the last tick, for the recharge state machine.
    pub last_tick_damage: f32,
}

impl Default for ShieldState {
    fn default() -> Self {
        Self {
            active: false,
            health: 0.0,
            max: 0.0,
            center: (0.0, 0.0),
            radius: 0.0,
            last_tick_damage: 0.0,
        }
    }
}

impl ShieldState {
    pub fn activate(&mut self, center: (f32, f32), radius: f32, health: f32) {
        self.active = true;
        self.center = center;
        self.radius = radius;
        self.health = health;
        self.max = health;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// Match outcome flag, set when the core structure is destroyed.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct MatchState {
    pub core_destroyed: bool,
}

impl MatchState {
    pub fn is_over(&self) -> bool {
        self.core_destroyed
    }
}

/// Grid cells whose structure was destroyed this tick. Drained by the
/// driver after the schedule runs, which clears the cells and re-solves
/// the flow field in bounded scope.
#[derive(Resource, Debug, Default)]
pub struct PendingGridChanges {
    pub destroyed_cells: Vec<(i32, i32)>,
}

/// System that aggregates melee damage from attacking agents.
///
/// ## Data Access
/// - Reads: DeltaTime, AttackState, AgentStats, Dead
/// - Writes: ShieldState, StructureHealth, FrameEvents, MatchState,
///   PendingGridChanges
pub fn structure_damage_system(
    dt: Res<DeltaTime>,
    mut commands: Commands,
    mut shield: ResMut<ShieldState>,
    mut events: ResMut<FrameEvents>,
    mut match_state: ResMut<MatchState>,
    mut grid_changes: ResMut<PendingGridChanges>,
    agents: Query<(&AttackState, &AgentStats, &Dead)>,
    mut structures: Query<(Entity, &GridAnchor, &mut StructureHealth, &StructureKind)>,
) {
    let delta = dt.0;

    let mut shield_total = 0.0;
    let mut cell_damage: HashMap<(i32, i32), f32> = HashMap::new();

    for (attack, stats, dead) in agents.iter() {
        if dead.0 || !attack.is_attacking {
            continue;
        }
        if attack.is_at_shield {
            shield_total += stats.melee_damage * delta;
        } else if let Some(cell) = attack.attack_cell {
            *cell_damage.entry(cell).or_insert(0.0) += stats.melee_damage * delta;
        }
    }

    // Shield accumulator resolves first.
    shield.last_tick_damage = 0.0;
    if shield.active && shield_total > 0.0 {
        shield.health -= shield_total;
        shield.last_tick_damage = shield_total;
        events.shield_damage += shield_total;
        if shield.health <= 0.0 {
            shield.health = 0.0;
            shield.active = false;
        }
    }

    for (entity, anchor, mut health, kind) in structures.iter_mut() {
        let Some(&amount) = cell_damage.get(&(anchor.x, anchor.z)) else {
            continue;
        };
        health.damage(amount);
        events.building_damage.push(BuildingDamageEvent {
            cell: (anchor.x, anchor.z),
            amount,
        });
        if health.is_destroyed() {
            grid_changes.destroyed_cells.push((anchor.x, anchor.z));
            commands.entity(entity).despawn();
            if *kind == StructureKind::Core {
                match_state.core_destroyed = true;
            }
        }
    }
}
