//! Lifecycle compaction of the dense agent and projectile registries.
//!
//! The registries are the presentation-ordered backing arrays: snapshots
//! list entities in registry order, and removals are reported as indices
//! into that order so the presentation layer can mirror the exact same
//! swap-remove compaction.

use crate::components::{Dead, ProjectileState};
use bevy_ecs::prelude::*;

/// Dense, presentation-ordered list of live agent entities.
#[derive(Resource, Debug, Default)]
pub struct AgentRegistry {
    pub entities: Vec<Entity>,
}

/// Dense, presentation-ordered list of live projectile entities.
#[derive(Resource, Debug, Default)]
pub struct ProjectileRegistry {
    pub entities: Vec<Entity>,
}

/// Indices removed from the registries this tick, in removal order.
///
/// Swap-remove is not order-preserving: consumers must apply the removals
/// in sequence to their mirrored lists.
#[derive(Resource, Debug, Default)]
pub struct RemovalBuffer {
    pub agents: Vec<usize>,
    pub projectiles: Vec<usize>,
}

/// System that compacts the registries and despawns dead entities.
///
/// ## Data Access
/// - Reads: Dead, ProjectileState
/// - Writes: AgentRegistry, ProjectileRegistry, RemovalBuffer, Commands
pub fn lifecycle_system(
    mut commands: Commands,
    mut agent_registry: ResMut<AgentRegistry>,
    mut projectile_registry: ResMut<ProjectileRegistry>,
    mut removals: ResMut<RemovalBuffer>,
    agents: Query<&Dead>,
    projectiles: Query<&ProjectileState>,
) {
    removals.agents.clear();
    removals.projectiles.clear();

    compact(
        &mut agent_registry.entities,
        &mut removals.agents,
        &mut commands,
        |entity| agents.get(entity).map(|dead| dead.0).unwrap_or(true),
    );
    compact(
        &mut projectile_registry.entities,
        &mut removals.projectiles,
        &mut commands,
        |entity| {
            projectiles
                .get(entity)
                .map(|state| state.to_remove)
                .unwrap_or(true)
        },
    );
}

/// Swap-remove every flagged entry, recording the index it held.
fn compact(
    entities: &mut Vec<Entity>,
    removed: &mut Vec<usize>,
    commands: &mut Commands,
    flagged: impl Fn(Entity) -> bool,
) {
    let mut i = 0;
    while i < entities.len() {
        let entity = entities[i];
        if flagged(entity) {
            entities.swap_remove(i);
            removed.push(i);
            if let Some(mut entity_commands) = commands.get_entity(entity) {
                entity_commands.despawn();
            }
        } else {
            i += 1;
        }
    }
}
