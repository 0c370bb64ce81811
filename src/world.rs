//! Snapshot types - a serializable view of the simulation state.
//!
//! Snapshots list agents and projectiles in registry order, so the indices
//! reported by the lifecycle compactor line up with the presentation
//! layer's mirrored arrays.

use crate::components::*;
use crate::systems::lifecycle::{AgentRegistry, ProjectileRegistry};
use crate::systems::structures::{MatchState, ShieldState};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single agent's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u32,
    pub x: f32,
    pub z: f32,
    pub heading: f32,
    pub health: f32,
    pub health_max: f32,
    pub class: String,
    pub is_attacking: bool,
    pub is_at_shield: bool,
}

/// Snapshot of a single projectile's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub turret: u32,
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub lifetime: f32,
}

/// Snapshot of a placed structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub id: u32,
    pub cell_x: i32,
    pub cell_z: i32,
    pub health: f32,
    pub health_max: f32,
    pub is_core: bool,
}

/// Complete simulation state snapshot for the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    /// Agents, in registry order.
    pub agents: Vec<AgentSnapshot>,
    /// Projectiles, in registry order.
    pub projectiles: Vec<ProjectileSnapshot>,
    /// All placed structures.
    pub structures: Vec<StructureSnapshot>,
    pub shield_active: bool,
    pub shield_health: f32,
    /// Whether the core was destroyed.
    pub match_over: bool,
    /// Registry indices compacted out this tick, in removal order.
    pub removed_agents: Vec<usize>,
    pub removed_projectiles: Vec<usize>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut agents = Vec::new();
        let agent_entities = world.resource::<AgentRegistry>().entities.clone();
        for entity in agent_entities {
            let (Some(id), Some(pos), Some(heading), Some(health), Some(class), Some(attack)) = (
                world.get::<AgentId>(entity),
                world.get::<Position>(entity),
                world.get::<Heading>(entity),
                world.get::<Health>(entity),
                world.get::<EnemyClass>(entity),
                world.get::<AttackState>(entity),
            ) else {
                continue;
            };
            agents.push(AgentSnapshot {
                id: id.0,
                x: pos.x,
                z: pos.z,
                heading: heading.0,
                health: health.current,
                health_max: health.max,
                class: format!("{:?}", class),
                is_attacking: attack.is_attacking,
                is_at_shield: attack.is_at_shield,
            });
        }

        let mut projectiles = Vec::new();
        let projectile_entities = world.resource::<ProjectileRegistry>().entities.clone();
        for entity in projectile_entities {
            let (Some(turret), Some(kind), Some(pos), Some(state)) = (
                world.get::<TurretId>(entity),
                world.get::<ProjectileKind>(entity),
                world.get::<Position>(entity),
                world.get::<ProjectileState>(entity),
            ) else {
                continue;
            };
            projectiles.push(ProjectileSnapshot {
                turret: turret.0,
                kind: kind.name().to_string(),
                x: pos.x,
                y: pos.y,
                z: pos.z,
                lifetime: state.lifetime,
            });
        }

        let mut structures = Vec::new();
        let mut structure_query =
            world.query::<(&StructureId, &GridAnchor, &StructureHealth, &StructureKind)>();
        for (id, anchor, health, kind) in structure_query.iter(world) {
            structures.push(StructureSnapshot {
                id: id.0,
                cell_x: anchor.x,
                cell_z: anchor.z,
                health: health.current,
                health_max: health.max,
                is_core: *kind == StructureKind::Core,
            });
        }

        let shield = world.resource::<ShieldState>();
        let match_state = world.resource::<MatchState>();

        Self {
            tick,
            time,
            agents,
            projectiles,
            structures,
            shield_active: shield.active,
            shield_health: shield.health,
            match_over: match_state.is_over(),
            removed_agents: Vec::new(),
            removed_projectiles: Vec::new(),
        }
    }

    /// Serialize snapshot to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to a pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a snapshot from a JSON string.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = Snapshot {
            tick: 42,
            time: 2.1,
            agents: vec![AgentSnapshot {
                id: 1,
                x: 10.0,
                z: 20.0,
                heading: 0.5,
                health: 40.0,
                health_max: 40.0,
                class: "Husk".to_string(),
                is_attacking: false,
                is_at_shield: false,
            }],
            projectiles: vec![ProjectileSnapshot {
                turret: 3,
                kind: "Explosive".to_string(),
                x: 1.0,
                y: 0.5,
                z: 2.0,
                lifetime: 0.4,
            }],
            structures: vec![],
            shield_active: true,
            shield_health: 120.0,
            match_over: false,
            removed_agents: vec![2, 0],
            removed_projectiles: vec![],
        };

        let json = snapshot.to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap();
        assert_eq!(restored.tick, 42);
        assert_eq!(restored.agents.len(), 1);
        assert_eq!(restored.agents[0].id, 1);
        assert_eq!(restored.removed_agents, vec![2, 0]);
        assert!(restored.shield_active);
    }
}
