//! Movement system - advances agents along the solved flow field.
//!
//! Each agent caches a waypoint looked up from the direction field one or
//! two hops ahead of its current cell, then integrates toward it with
//! explicit Euler. Contact checks run before any movement: the shield
//! boundary intercepts first, then adjacent building cells. An attacking
//! agent is stationary and deals melee damage through the aggregator.

use crate::components::*;
use crate::grid::{FlowGrid, NEIGHBOR_OFFSETS};
use crate::spatial::SpatialGrid;
use crate::systems::structures::ShieldState;
use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Distance at which a cached waypoint counts as reached.
pub const WAYPOINT_EPSILON: f32 = 0.05;
/// Extra reach beyond the shield radius that counts as contact.
const SHIELD_CONTACT_MARGIN: f32 = 0.5;
/// Contact distance to a building cell center, in cell-size units.
const BUILDING_CONTACT_FACTOR: f32 = 1.2;
/// Local avoidance radius and blend weight.
const SEPARATION_RADIUS: f32 = 1.2;
const SEPARATION_WEIGHT: f32 = 0.35;

/// System that moves agents along the flow field and detects attack state.
///
/// ## Data Access
/// - Reads: DeltaTime, FlowGrid, ShieldState, SpatialGrid
/// - Writes: Position, Velocity, Heading, Waypoint, AttackState
pub fn movement_system(
    dt: Res<DeltaTime>,
    grid: Res<FlowGrid>,
    shield: Res<ShieldState>,
    spatial: Res<SpatialGrid>,
    mut query: Query<(
        Entity,
        &mut Position,
        &mut Velocity,
        &mut Heading,
        &mut Waypoint,
        &mut AttackState,
        &AgentStats,
        &SlowEffect,
        &Dead,
    )>,
) {
    let delta = dt.0;
    let contact_radius = BUILDING_CONTACT_FACTOR * grid.cell_size();

    for (entity, mut pos, mut vel, mut heading, mut waypoint, mut attack, stats, slow, dead) in
        query.iter_mut()
    {
        if dead.0 {
            continue;
        }
        attack.clear();

        // Shield boundary intercepts before any building contact.
        if shield.active {
            let dx = pos.x - shield.center.0;
            let dz = pos.z - shield.center.1;
            if (dx * dx + dz * dz).sqrt() <= shield.radius + SHIELD_CONTACT_MARGIN {
                attack.is_attacking = true;
                attack.is_at_shield = true;
                *vel = Velocity::default();
                continue;
            }
        }

        // Building contact against the own cell and its 8 neighbors.
        let (cx, cz) = grid.world_to_cell(pos.x, pos.z);
        let mut contact: Option<((i32, i32), f32)> = None;
        for (dx, dz) in std::iter::once((0, 0)).chain(NEIGHBOR_OFFSETS) {
            let (nx, nz) = (cx + dx, cz + dz);
            let Some(cell) = grid.cell(nx, nz) else {
                continue;
            };
            if !cell.is_building_area {
                continue;
            }
            let (wx, wz) = grid.cell_center(nx, nz);
            let dist = ((wx - pos.x).powi(2) + (wz - pos.z).powi(2)).sqrt();
            if dist <= contact_radius && contact.map(|(_, d)| dist < d).unwrap_or(true) {
                contact = Some(((nx, nz), dist));
            }
        }
        if let Some((cell, _)) = contact {
            attack.is_attacking = true;
            attack.attack_cell = Some(cell);
            *vel = Velocity::default();
            continue;
        }

        // Waypoint refresh: follow the direction field one or two hops
        // ahead to smooth motion across cell boundaries.
        let reached = match waypoint.0 {
            None => true,
            Some((wx, wz)) => {
                ((wx - pos.x).powi(2) + (wz - pos.z).powi(2)).sqrt() <= WAYPOINT_EPSILON
            }
        };
        if reached {
            waypoint.0 = next_waypoint(&grid, cx, cz);
        }

        let Some((wx, wz)) = waypoint.0 else {
            // No path from here: do not advance this tick.
            *vel = Velocity::default();
            continue;
        };

        let dx = wx - pos.x;
        let dz = wz - pos.z;
        let dist = (dx * dx + dz * dz).sqrt();
        if dist < 1e-4 {
            *vel = Velocity::default();
            continue;
        }

        let mut mx = dx / dist;
        let mut mz = dz / dist;

        // Local avoidance: a small push away from crowding neighbors.
        let (sx, sz) = separation_push(&spatial, entity, pos.x, pos.z);
        mx += sx * SEPARATION_WEIGHT;
        mz += sz * SEPARATION_WEIGHT;
        let mag = (mx * mx + mz * mz).sqrt();
        if mag > 1e-4 {
            mx /= mag;
            mz /= mag;
        }

        let speed = stats.speed * slow.current_factor();
        let step = (speed * delta).min(dist);
        pos.x += mx * step;
        pos.z += mz * step;
        heading.0 = mx.atan2(mz);
        *vel = Velocity::new(mx * speed, 0.0, mz * speed);
    }
}

/// Resolve the next waypoint from a cell by following the direction field.
fn next_waypoint(grid: &FlowGrid, cx: i32, cz: i32) -> Option<(f32, f32)> {
    let dir = grid.cell(cx, cz).map(|c| c.direction).unwrap_or(-1);
    let (h1x, h1z) = grid.neighbor_of(cx, cz, dir)?;

    let mut hop = (h1x, h1z);
    let hop_dir = grid.cell(h1x, h1z).map(|c| c.direction).unwrap_or(-1);
    if let Some(second) = grid.neighbor_of(h1x, h1z, hop_dir) {
        hop = second;
    }
    Some(grid.cell_center(hop.0, hop.1))
}

fn separation_push(spatial: &SpatialGrid, entity: Entity, x: f32, z: f32) -> (f32, f32) {
    let mut sx = 0.0;
    let mut sz = 0.0;
    for neighbor in spatial.query_radius(x, z, SEPARATION_RADIUS) {
        if neighbor.entity == entity {
            continue;
        }
        let dx = x - neighbor.x;
        let dz = z - neighbor.z;
        let dist = (dx * dx + dz * dz).sqrt().max(0.05);
        sx += dx / (dist * dist);
        sz += dz / (dist * dist);
    }
    (sx, sz)
}

/// System that ticks down slow effects.
pub fn slow_decay_system(dt: Res<DeltaTime>, mut query: Query<&mut SlowEffect>) {
    for mut slow in query.iter_mut() {
        slow.tick(dt.0);
    }
}
