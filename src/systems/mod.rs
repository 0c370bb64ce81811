//! ECS systems for the Bastion simulation.
//!
//! Systems contain the game logic that operates on components. The driver
//! chains them into the per-tick pipeline:
//!
//! **Spatial** - `spatial_grid_update_system` rebuilds the agent grid.
//!
//! **Spawning** - `spawn_system` feeds agents in from the configured lanes.
//!
//! **Movement** - `movement_system` follows the flow field and detects
//! attack state; `slow_decay_system` ticks down speed debuffs.
//!
//! **Projectiles** - `projectile_update_system` integrates flight.
//!
//! **Collision** - `collision_gather_system` scans projectiles against
//! agents and terrain (parallel under `--features parallel`), then
//! `collision_apply_system` drains the results sequentially.
//!
//! **Structures** - `structure_damage_system` aggregates melee damage into
//! the shield and per-cell building damage.
//!
//! **Lifecycle** - `lifecycle_system` compacts the dense registries and
//! reports removed indices.

pub mod collision;
pub mod lifecycle;
pub mod movement;
pub mod projectile;
pub mod spawning;
pub mod structures;

pub use collision::*;
pub use lifecycle::*;
pub use movement::*;
pub use projectile::*;
pub use spawning::*;
pub use structures::*;
