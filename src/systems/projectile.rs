//! Projectile system - advances projectile positions and lifetimes.

use crate::components::*;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;

/// Projectiles older than this are removed regardless of flight state.
pub const PROJECTILE_LIFETIME_CAP: f32 = 3.0;

/// System that integrates projectile flight.
///
/// ## Data Access
/// - Reads: DeltaTime, Velocity
/// - Writes: Position, ProjectileState
pub fn projectile_update_system(
    dt: Res<DeltaTime>,
    mut query: Query<(&mut Position, &Velocity, &mut ProjectileState)>,
) {
    let delta = dt.0;
    for (mut pos, vel, mut state) in query.iter_mut() {
        if state.to_remove {
            continue;
        }
        pos.x += vel.x * delta;
        pos.y += vel.y * delta;
        pos.z += vel.z * delta;
        state.lifetime += delta;
        if state.lifetime > PROJECTILE_LIFETIME_CAP {
            state.to_remove = true;
        }
    }
}
