//! Collision resolver - projectile/agent and projectile/terrain contact.
//!
//! ## Gather / Apply Split
//!
//! The gather phase snapshots the projectile array, scans it against the
//! agent spatial grid, and produces per-projectile outcomes plus merged
//! event queues, without mutating either entity array. The apply phase is
//! sequential: it writes flight outcomes back, drains collision events into
//! agent health, resolves deferred child spawns, and credits turret XP.
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, the gather phase fans the
//! projectile snapshot out with rayon; each worker fills its own
//! [`ImpactResults`] which are merged by the single consumer.

use crate::components::*;
use crate::events::*;
use crate::grid::FlowGrid;
use crate::spatial::SpatialGrid;
use crate::systems::lifecycle::ProjectileRegistry;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Broad-phase hit radius and the aim-point offset above the ground.
const HIT_RADIUS: f32 = 1.0;
const HIT_VERTICAL_OFFSET: f32 = 0.5;
/// Explosive splash.
const EXPLOSION_RADIUS: f32 = 3.0;
const EXPLOSION_VFX_DURATION: f32 = 0.4;
/// Chain lightning hop search radius, hop budget, and per-hop falloff.
const CHAIN_RADIUS: f32 = 6.0;
const CHAIN_MAX_HOPS: usize = 4;
const CHAIN_FALLOFF: f32 = 0.7;
const CHAIN_ARC_DURATION: f32 = 0.15;
/// Child projectiles from spread kinds.
const SPREAD_FAN_ANGLE: f32 = 0.35;
const SPREAD_CHILD_DAMAGE_FACTOR: f32 = 0.5;
/// Slow debuff numbers.
const SLOW_FACTOR: f32 = 0.5;
const SLOW_DURATION: f32 = 2.0;
/// Payload kinds trigger once altitude drops below this.
const GROUND_THRESHOLD: f32 = 0.5;
const ORBITAL_RADIUS: f32 = 5.0;
const ORBITAL_DAMAGE_FACTOR: f32 = 3.0;
const FIRESTORM_RADIUS: f32 = 4.0;
const TIMEWARP_RADIUS: f32 = 5.0;
const TIMEWARP_REFRESH: f32 = 0.5;
const METEOR_CHILD_COUNT: usize = 6;
const METEOR_SCATTER_RADIUS: f32 = 3.0;
const METEOR_DROP_HEIGHT: f32 = 8.0;
/// Terrain contact against building obstruction points.
const TERRAIN_HIT_RADIUS: f32 = 0.8;
const OBSTRUCTION_HEIGHT: f32 = 2.0;
/// XP credited to the owning turret per kill.
const XP_PER_KILL: f32 = 5.0;

/// Ground-plane centers of building cells, for terrain contact tests.
/// Rebuilt by the driver whenever the building layout changes.
#[derive(Resource, Debug, Default)]
pub struct ObstructionPoints(pub Vec<(f32, f32)>);

impl ObstructionPoints {
    pub fn rebuild_from_grid(&mut self, grid: &FlowGrid) {
        self.0 = grid
            .building_cells()
            .into_iter()
            .map(|(x, z)| grid.cell_center(x, z))
            .collect();
    }
}

/// Flight outcome for one projectile, written back in the apply phase.
#[derive(Debug, Clone)]
pub struct ProjectileWriteback {
    pub entity: Entity,
    pub new_hits: Vec<u32>,
    pub remove: bool,
    pub reverse_velocity: bool,
    pub payload_triggered: bool,
    /// Persisting area payloads stop moving once triggered.
    pub halt: bool,
}

impl ProjectileWriteback {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            new_hits: Vec::new(),
            remove: false,
            reverse_velocity: false,
            payload_triggered: false,
            halt: false,
        }
    }
}

/// Collected collision results for one tick.
///
/// Workers fill independent instances during the gather phase; the single
/// consumer merges them and the apply phase drains the merged result.
#[derive(Debug, Default)]
pub struct ImpactResults {
    pub writebacks: Vec<ProjectileWriteback>,
    pub collisions: Vec<CollisionEvent>,
    pub vfx: Vec<VfxEvent>,
    pub spawns: Vec<SpawnRequest>,
    pub slows: Vec<SlowRequest>,
}

impl ImpactResults {
    pub fn merge(&mut self, other: ImpactResults) {
        self.writebacks.extend(other.writebacks);
        self.collisions.extend(other.collisions);
        self.vfx.extend(other.vfx);
        self.spawns.extend(other.spawns);
        self.slows.extend(other.slows);
    }
}

/// Resource holding results between the gather and apply phases.
#[derive(Resource, Default)]
pub struct PendingImpacts(pub ImpactResults);

/// Projectile data extracted for the gather phase, so the scan is
/// read-only on entities.
#[derive(Clone)]
struct ProjectileSnap {
    entity: Entity,
    turret: u32,
    kind: ProjectileKind,
    x: f32,
    y: f32,
    z: f32,
    vx: f32,
    vz: f32,
    damage: f32,
    speed: f32,
    pass_through: u8,
    hits: HitSet,
    payload_triggered: bool,
}

/// Collision gather system - computes impacts without applying them.
///
/// ## Data Access (read-only on entities)
/// - Reads: SpatialGrid, ObstructionPoints, projectile components
/// - Writes: PendingImpacts (resource only)
pub fn collision_gather_system(
    spatial: Res<SpatialGrid>,
    obstructions: Res<ObstructionPoints>,
    mut pending: ResMut<PendingImpacts>,
    projectiles: Query<(
        Entity,
        &TurretId,
        &ProjectileKind,
        &Position,
        &Velocity,
        &ProjectileState,
        &HitSet,
    )>,
) {
    pending.0 = ImpactResults::default();

    let snaps: Vec<ProjectileSnap> = projectiles
        .iter()
        .filter(|(_, _, _, _, _, state, _)| !state.to_remove)
        .map(|(entity, turret, kind, pos, vel, state, hits)| ProjectileSnap {
            entity,
            turret: turret.0,
            kind: *kind,
            x: pos.x,
            y: pos.y,
            z: pos.z,
            vx: vel.x,
            vz: vel.z,
            damage: state.damage,
            speed: state.speed,
            pass_through: state.pass_through,
            hits: *hits,
            payload_triggered: state.payload_triggered,
        })
        .collect();

    #[cfg(feature = "parallel")]
    {
        let partial: Vec<ImpactResults> = snaps
            .par_iter()
            .map(|snap| compute_projectile_impacts(snap, &spatial, &obstructions.0))
            .collect();
        for result in partial {
            pending.0.merge(result);
        }
    }

    #[cfg(not(feature = "parallel"))]
    for snap in &snaps {
        let result = compute_projectile_impacts(snap, &spatial, &obstructions.0);
        pending.0.merge(result);
    }
}

/// Compute all impacts for a single projectile. Pure over the read-only
/// spatial grid, safe to call from parallel workers.
fn compute_projectile_impacts(
    p: &ProjectileSnap,
    spatial: &SpatialGrid,
    obstructions: &[(f32, f32)],
) -> ImpactResults {
    let mut out = ImpactResults::default();
    let mut wb = ProjectileWriteback::new(p.entity);

    if p.kind.is_payload() {
        resolve_payload(p, spatial, &mut out, &mut wb);
        out.writebacks.push(wb);
        return out;
    }

    // Agent scan, closest candidates first.
    let mut hit_count = p.hits.len();
    for candidate in spatial.query_radius(p.x, p.z, HIT_RADIUS) {
        if p.hits.contains(candidate.agent_id) || wb.new_hits.contains(&candidate.agent_id) {
            continue;
        }
        let dx = candidate.x - p.x;
        let dz = candidate.z - p.z;
        let dy = p.y - HIT_VERTICAL_OFFSET;
        if (dx * dx + dz * dz + dy * dy).sqrt() > HIT_RADIUS {
            continue;
        }

        wb.new_hits.push(candidate.agent_id);
        hit_count += 1;
        out.collisions.push(CollisionEvent {
            agent: candidate.entity,
            agent_id: candidate.agent_id,
            damage: p.damage,
            turret: p.turret,
            kind: p.kind,
        });

        match p.kind {
            ProjectileKind::Standard | ProjectileKind::Ricochet => {}
            ProjectileKind::Explosive => {
                resolve_splash(p, spatial, candidate.agent_id, (candidate.x, candidate.z), &mut out);
                wb.remove = true;
            }
            ProjectileKind::ChainLightning | ProjectileKind::ArcLightning => {
                resolve_chain(p, spatial, &candidate, &mut out);
                wb.remove = true;
            }
            ProjectileKind::Spread | ProjectileKind::SpreadCircles | ProjectileKind::Circler => {
                resolve_child_fan(p, &mut out);
                wb.remove = true;
            }
            ProjectileKind::Slow => {
                out.slows.push(SlowRequest {
                    agent: candidate.entity,
                    factor: SLOW_FACTOR,
                    duration: SLOW_DURATION,
                });
                out.vfx.push(VfxEvent {
                    start: (candidate.x, 0.0, candidate.z),
                    end: (candidate.x, 0.0, candidate.z),
                    duration: SLOW_DURATION,
                    variant: VfxVariant::SlowBurst,
                });
            }
            // Payload kinds never reach the agent scan.
            ProjectileKind::OrbitalStrike
            | ProjectileKind::Firestorm
            | ProjectileKind::Timewarp
            | ProjectileKind::MeteorShower => {}
        }
        if wb.remove {
            break;
        }

        // Literal pass-through rule: removal once the distinct-hit count
        // exceeds the budget.
        if hit_count > p.pass_through as usize {
            wb.remove = true;
            break;
        }
    }

    // Terrain contact, only for projectiles still in flight.
    if !wb.remove && p.y <= OBSTRUCTION_HEIGHT {
        for &(ox, oz) in obstructions {
            let d_sq = (ox - p.x).powi(2) + (oz - p.z).powi(2);
            if d_sq <= TERRAIN_HIT_RADIUS * TERRAIN_HIT_RADIUS {
                if p.kind == ProjectileKind::Ricochet {
                    wb.reverse_velocity = true;
                } else {
                    wb.remove = true;
                }
                break;
            }
        }
    }

    out.writebacks.push(wb);
    out
}

/// Explosive splash: re-scan every agent within the blast radius of the
/// impact point and damage all except the primary hit.
fn resolve_splash(
    p: &ProjectileSnap,
    spatial: &SpatialGrid,
    primary: u32,
    impact: (f32, f32),
    out: &mut ImpactResults,
) {
    for victim in spatial.query_radius(impact.0, impact.1, EXPLOSION_RADIUS) {
        if victim.agent_id == primary {
            continue;
        }
        out.collisions.push(CollisionEvent {
            agent: victim.entity,
            agent_id: victim.agent_id,
            damage: p.damage,
            turret: p.turret,
            kind: p.kind,
        });
    }
    out.vfx.push(VfxEvent {
        start: (impact.0, 0.0, impact.1),
        end: (impact.0, 0.0, impact.1),
        duration: EXPLOSION_VFX_DURATION,
        variant: VfxVariant::Explosion,
    });
}

/// Greedy nearest-unvisited chain walk with per-hop damage falloff and a
/// VFX arc per segment.
fn resolve_chain(
    p: &ProjectileSnap,
    spatial: &SpatialGrid,
    first: &crate::spatial::SpatialEntry,
    out: &mut ImpactResults,
) {
    let mut visited: Vec<u32> = p.hits.as_slice().to_vec();
    visited.push(first.agent_id);

    let mut current = (first.x, first.z);
    let mut damage = p.damage;
    for _ in 0..CHAIN_MAX_HOPS {
        damage *= CHAIN_FALLOFF;
        let Some(next) = spatial.nearest_excluding(current.0, current.1, CHAIN_RADIUS, &visited)
        else {
            break;
        };
        out.collisions.push(CollisionEvent {
            agent: next.entity,
            agent_id: next.agent_id,
            damage,
            turret: p.turret,
            kind: p.kind,
        });
        out.vfx.push(VfxEvent {
            start: (current.0, HIT_VERTICAL_OFFSET, current.1),
            end: (next.x, HIT_VERTICAL_OFFSET, next.z),
            duration: CHAIN_ARC_DURATION,
            variant: VfxVariant::ChainArc,
        });
        visited.push(next.agent_id);
        current = (next.x, next.z);
    }
}

/// Fan of child projectiles, deferred through spawn requests so the
/// projectile store is never mutated mid-scan.
fn resolve_child_fan(p: &ProjectileSnap, out: &mut ImpactResults) {
    let count = p.kind.child_fan().unwrap_or(0);
    if count == 0 {
        return;
    }
    let base = p.vz.atan2(p.vx);
    for i in 0..count {
        let angle = if p.kind == ProjectileKind::Circler {
            base + std::f32::consts::TAU * i as f32 / count as f32
        } else {
            base + SPREAD_FAN_ANGLE * (i as f32 - (count - 1) as f32 / 2.0)
        };
        out.spawns.push(SpawnRequest {
            turret: p.turret,
            origin: (p.x, p.y, p.z),
            dir: (angle.cos(), 0.0, angle.sin()),
            speed: p.speed,
            damage: p.damage * SPREAD_CHILD_DAMAGE_FACTOR,
            kind: ProjectileKind::Standard,
        });
    }
}

/// Payload kinds: trigger once below the ground threshold, then either
/// persist as an area effect or self-remove.
fn resolve_payload(
    p: &ProjectileSnap,
    spatial: &SpatialGrid,
    out: &mut ImpactResults,
    wb: &mut ProjectileWriteback,
) {
    if p.payload_triggered {
        match p.kind {
            ProjectileKind::Firestorm => {
                for victim in spatial.query_radius(p.x, p.z, FIRESTORM_RADIUS) {
                    out.collisions.push(CollisionEvent {
                        agent: victim.entity,
                        agent_id: victim.agent_id,
                        damage: p.damage,
                        turret: p.turret,
                        kind: p.kind,
                    });
                }
            }
            ProjectileKind::Timewarp => {
                for victim in spatial.query_radius(p.x, p.z, TIMEWARP_RADIUS) {
                    out.slows.push(SlowRequest {
                        agent: victim.entity,
                        factor: SLOW_FACTOR,
                        duration: TIMEWARP_REFRESH,
                    });
                }
            }
            _ => {}
        }
        return;
    }

    if p.y > GROUND_THRESHOLD {
        return;
    }
    wb.payload_triggered = true;

    match p.kind {
        ProjectileKind::OrbitalStrike => {
            for victim in spatial.query_radius(p.x, p.z, ORBITAL_RADIUS) {
                out.collisions.push(CollisionEvent {
                    agent: victim.entity,
                    agent_id: victim.agent_id,
                    damage: p.damage * ORBITAL_DAMAGE_FACTOR,
                    turret: p.turret,
                    kind: p.kind,
                });
            }
            out.vfx.push(VfxEvent {
                start: (p.x, METEOR_DROP_HEIGHT, p.z),
                end: (p.x, 0.0, p.z),
                duration: EXPLOSION_VFX_DURATION,
                variant: VfxVariant::GroundStrike,
            });
            wb.remove = true;
        }
        ProjectileKind::MeteorShower => {
            for i in 0..METEOR_CHILD_COUNT {
                // Golden-angle scatter keeps the pattern deterministic.
                let angle = i as f32 * 2.399_963;
                let dist = METEOR_SCATTER_RADIUS * (i as f32 + 1.0) / METEOR_CHILD_COUNT as f32;
                out.spawns.push(SpawnRequest {
                    turret: p.turret,
                    origin: (
                        p.x + dist * angle.cos(),
                        METEOR_DROP_HEIGHT,
                        p.z + dist * angle.sin(),
                    ),
                    dir: (0.0, -1.0, 0.0),
                    speed: p.speed,
                    damage: p.damage,
                    kind: ProjectileKind::Explosive,
                });
            }
            out.vfx.push(VfxEvent {
                start: (p.x, METEOR_DROP_HEIGHT, p.z),
                end: (p.x, 0.0, p.z),
                duration: EXPLOSION_VFX_DURATION,
                variant: VfxVariant::GroundStrike,
            });
            wb.remove = true;
        }
        ProjectileKind::Firestorm => {
            out.vfx.push(VfxEvent {
                start: (p.x, 0.0, p.z),
                end: (p.x, 0.0, p.z),
                duration: PROJECTILE_PERSIST_VFX,
                variant: VfxVariant::GroundStrike,
            });
            wb.halt = true;
        }
        ProjectileKind::Timewarp => {
            out.vfx.push(VfxEvent {
                start: (p.x, 0.0, p.z),
                end: (p.x, 0.0, p.z),
                duration: PROJECTILE_PERSIST_VFX,
                variant: VfxVariant::SlowBurst,
            });
            wb.halt = true;
        }
        _ => {}
    }
}

/// Duration hint for persisting ground effects.
const PROJECTILE_PERSIST_VFX: f32 = 1.0;

/// Collision apply system - the sequential drain.
///
/// ## Data Access
/// - Reads: DeltaTime, PendingImpacts
/// - Writes: Velocity, ProjectileState, HitSet, Health, Dead, SlowEffect,
///   FrameEvents, ProjectileRegistry (deferred spawns)
pub fn collision_apply_system(
    dt: Res<DeltaTime>,
    mut commands: Commands,
    mut pending: ResMut<PendingImpacts>,
    mut events: ResMut<FrameEvents>,
    mut registry: ResMut<ProjectileRegistry>,
    mut projectiles: Query<(&mut Velocity, &mut ProjectileState, &mut HitSet)>,
    mut agents: Query<(&mut Health, &Armor, &mut Dead, &mut SlowEffect)>,
) {
    let results = std::mem::take(&mut pending.0);

    // Write flight outcomes back to projectiles.
    for wb in &results.writebacks {
        if let Ok((mut vel, mut state, mut hits)) = projectiles.get_mut(wb.entity) {
            for &id in &wb.new_hits {
                hits.insert(id);
            }
            if wb.remove {
                state.to_remove = true;
            }
            if wb.payload_triggered {
                state.payload_triggered = true;
            }
            if wb.reverse_velocity {
                vel.x = -vel.x;
                vel.y = -vel.y;
                vel.z = -vel.z;
            }
            if wb.halt {
                *vel = Velocity::default();
            }
        }
    }

    // Drain collision events into agent health. Only this single-threaded
    // drain ever mutates health.
    for ev in &results.collisions {
        if let Ok((mut health, armor, mut dead, _)) = agents.get_mut(ev.agent) {
            if dead.0 {
                continue;
            }
            let mut damage = armor.reduce(ev.damage);
            if ev.kind.is_damage_over_time() {
                damage *= dt.0;
            }
            health.damage(damage);
            if !health.is_alive() {
                dead.0 = true;
                events.turret_xp.push(TurretXpEvent {
                    turret: ev.turret,
                    xp: XP_PER_KILL,
                });
            }
        }
    }

    // Speed debuffs.
    for req in &results.slows {
        if let Ok((_, _, dead, mut slow)) = agents.get_mut(req.agent) {
            if !dead.0 {
                slow.apply(req.factor, req.duration);
            }
        }
    }

    // Deferred child projectiles, resolved after the parallel scan.
    for req in &results.spawns {
        let entity = commands
            .spawn(ProjectileBundle {
                turret: TurretId(req.turret),
                kind: req.kind,
                position: Position::new(req.origin.0, req.origin.1, req.origin.2),
                velocity: Velocity::new(
                    req.dir.0 * req.speed,
                    req.dir.1 * req.speed,
                    req.dir.2 * req.speed,
                ),
                state: ProjectileState {
                    damage: req.damage,
                    speed: req.speed,
                    ..Default::default()
                },
                hits: HitSet::default(),
            })
            .id();
        registry.entities.push(entity);
    }

    events.vfx.extend(results.vfx);
}
