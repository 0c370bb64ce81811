//! Bastion - Simulation Core
//!
//! The real-time simulation core of a base-defense game: a flow-field
//! pathfinding solver routing many agents toward a shared target through a
//! dynamically obstructed grid, plus the per-tick movement, projectile,
//! collision, and lifecycle pipeline that consumes the field.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod events;
pub mod grid;
pub mod profiler;
pub mod spatial;
pub mod systems;
pub mod world;

pub use api::{BuildingTag, SimWorld};
pub use components::*;
pub use config::{EnemyWeight, SimConfig, SimTick};
pub use events::{
    BuildingDamageEvent, CollisionEvent, FrameEvents, SlowRequest, SpawnRequest, TurretXpEvent,
    VfxEvent, VfxVariant,
};
pub use grid::{FlowGrid, GridCell, SolveError, SolveScope, NEIGHBOR_OFFSETS};
pub use profiler::Profiler;
pub use spatial::{SpatialEntry, SpatialGrid};
pub use systems::*;
pub use world::Snapshot;
