//! Public API for the simulation.
//!
//! This module provides the main interface for the game layer (or any other
//! client) to drive the simulation core.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed, so behavior only depends on the fixed rate.
//!
//! ## Tick Pipeline
//!
//! Every fixed update runs the chained phases: spatial rebuild, spawning,
//! movement, projectile flight, collision gather, collision apply,
//! structure/shield aggregation, lifecycle compaction. After the schedule
//! the driver drains destroyed-structure cells (clearing the grid and
//! re-solving in bounded scope) and accumulates congestion weight under
//! the live agents.

use crate::components::*;
use crate::config::{SimConfig, SimTick};
use crate::events::FrameEvents;
use crate::grid::{FlowGrid, SolveError, SolveScope};
use crate::spatial::{spatial_grid_update_system, SpatialGrid};
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use std::io::{self, Write};
use std::path::Path;

/// What a placement notification refers to: an obstructing structure or
/// the shared shield dome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildingTag {
    Structure(StructureKind),
    Shield,
}

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Initializing the simulation and solving the flow field
/// - Stepping the simulation forward
/// - Receiving building placement/removal and turret fire requests
/// - Extracting snapshots and draining per-tick events
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for the fixed timestep.
    time_accumulator: f32,
    next_structure_id: u32,
    /// Removal indices accumulated since the last snapshot.
    removed_agents: Vec<usize>,
    removed_projectiles: Vec<usize>,
    #[cfg(feature = "profile")]
    profiler: crate::profiler::Profiler,
}

impl SimWorld {
    /// Create a new simulation world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new simulation world with a custom configuration.
    pub fn with_config(config: SimConfig) -> Self {
        let mut world = World::new();

        let mut grid = FlowGrid::new(
            config.grid_width,
            config.grid_length,
            config.cell_size,
            config.grid_origin,
        );
        if let Some((min_x, min_z, max_x, max_z)) = config.pathfinding_region {
            grid.set_pathfinding_region(min_x, min_z, max_x, max_z);
        }
        let target = grid.clamp_cell(config.target.0, config.target.1);
        // A fresh grid with a clamped target always solves.
        grid.solve(target, SolveScope::FullGrid).ok();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(SpatialGrid::new(config.spatial_cell_size));
        world.insert_resource(grid);
        world.insert_resource(ShieldState::default());
        world.insert_resource(MatchState::default());
        world.insert_resource(PendingGridChanges::default());
        world.insert_resource(PendingImpacts::default());
        world.insert_resource(FrameEvents::default());
        world.insert_resource(RemovalBuffer::default());
        world.insert_resource(AgentRegistry::default());
        world.insert_resource(ProjectileRegistry::default());
        world.insert_resource(ObstructionPoints::default());
        world.insert_resource(SpawnerState::new(config.spawn_lanes.len(), config.rng_seed));
        world.insert_resource(config);

        // One chained pipeline: every phase is a join barrier for the next.
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                spatial_grid_update_system,
                spawn_system,
                movement_system,
                slow_decay_system,
                projectile_update_system,
                collision_gather_system,
                collision_apply_system,
                structure_damage_system,
                lifecycle_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            next_structure_id: 0,
            removed_agents: Vec::new(),
            removed_projectiles: Vec::new(),
            #[cfg(feature = "profile")]
            profiler: crate::profiler::Profiler::new(),
        }
    }

    /// Create a small demonstration level: a walled core, four spawn lanes,
    /// and an active shield.
    pub fn new_default_level() -> Self {
        let config = SimConfig {
            grid_width: 32,
            grid_length: 32,
            target: (16, 16),
            spawn_interval: 1.5,
            spawn_lanes: vec![(1.5, 1.5), (30.5, 1.5), (1.5, 30.5), (30.5, 30.5)],
            ..Default::default()
        };
        let mut sim = Self::with_config(config);

        // The core sits next to the convergence cell so agents that arrive
        // make contact and start attacking it.
        sim.building_added(16, 15, BuildingTag::Structure(StructureKind::Core))
            .ok();
        sim.building_added(12, 12, BuildingTag::Structure(StructureKind::Standard))
            .ok();
        sim.building_added(20, 20, BuildingTag::Structure(StructureKind::Standard))
            .ok();
        sim.building_added(16, 16, BuildingTag::Shield).ok();
        sim
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Accumulates time and runs fixed updates as needed.
    pub fn step(&mut self, dt: f32) {
        let fixed_dt = self
            .world
            .get_resource::<SimConfig>()
            .map(|c| c.fixed_timestep)
            .unwrap_or(1.0 / 30.0);

        self.time_accumulator += dt;
        if self.time_accumulator >= fixed_dt {
            // The previous step's undrained events go stale now.
            self.world.resource_mut::<FrameEvents>().clear();
        }
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        if let Some(mut tick_res) = self.world.get_resource_mut::<SimTick>() {
            tick_res.increment();
        }

        #[cfg(feature = "profile")]
        let start = std::time::Instant::now();

        self.schedule.run(&mut self.world);

        #[cfg(feature = "profile")]
        {
            self.profiler.record("fixed_update", start.elapsed());
            self.profiler.tick();
        }

        self.collect_removals();
        self.apply_grid_changes();
        self.accumulate_congestion();

        self.tick += 1;
        self.time += dt;
    }

    /// Fold this tick's compaction indices into the buffers handed out
    /// with the next snapshot.
    fn collect_removals(&mut self) {
        if let Some(mut removals) = self.world.get_resource_mut::<RemovalBuffer>() {
            self.removed_agents.extend(removals.agents.drain(..));
            self.removed_projectiles.extend(removals.projectiles.drain(..));
        }
    }

    /// Drain destroyed-structure cells: clear the grid and re-solve in
    /// bounded scope.
    fn apply_grid_changes(&mut self) {
        let cells: Vec<(i32, i32)> = {
            let mut changes = self.world.resource_mut::<PendingGridChanges>();
            changes.destroyed_cells.drain(..).collect()
        };
        if cells.is_empty() {
            return;
        }

        #[cfg(feature = "profile")]
        let start = std::time::Instant::now();

        {
            let mut grid = self.world.resource_mut::<FlowGrid>();
            for (x, z) in &cells {
                grid.clear_building(*x, *z);
            }
            if let Some(target) = grid.target() {
                // Clearing cells never invalidates a previously valid target.
                grid.solve(target, SolveScope::Bounded).ok();
            }
        }
        self.rebuild_obstructions();

        #[cfg(feature = "profile")]
        self.profiler.record("solve", start.elapsed());
    }

    fn rebuild_obstructions(&mut self) {
        let points: Vec<(f32, f32)> = {
            let grid = self.world.resource::<FlowGrid>();
            grid.building_cells()
                .into_iter()
                .map(|(x, z)| grid.cell_center(x, z))
                .collect()
        };
        self.world.resource_mut::<ObstructionPoints>().0 = points;
    }

    /// Bump congestion weight on every cell occupied by a live agent.
    /// The weight feeds the next solve's movement costs.
    fn accumulate_congestion(&mut self) {
        let mut query = self.world.query::<(&AgentId, &Position, &Dead)>();
        let positions: Vec<(f32, f32)> = query
            .iter(&self.world)
            .filter(|(_, _, dead)| !dead.0)
            .map(|(_, pos, _)| (pos.x, pos.z))
            .collect();

        let mut grid = self.world.resource_mut::<FlowGrid>();
        for (x, z) in positions {
            let (cx, cz) = grid.world_to_cell(x, z);
            grid.add_congestion(cx, cz, 1);
        }
    }

    // ------------------------------------------------------------------
    // Level setup and placement notifications
    // ------------------------------------------------------------------

    /// Re-target the flow field (level setup or core relocation).
    pub fn solve_flow_field(&mut self, target: (i32, i32)) -> Result<(), SolveError> {
        let mut grid = self.world.resource_mut::<FlowGrid>();
        grid.solve(target, SolveScope::FullGrid)
    }

    /// Notification that a building was placed at a grid cell.
    ///
    /// Structures obstruct the grid and trigger a bounded re-solve; the
    /// shield tag activates the shared dome without touching the grid.
    pub fn building_added(&mut self, x: i32, z: i32, tag: BuildingTag) -> Result<(), SolveError> {
        match tag {
            BuildingTag::Shield => {
                let (center, radius, health) = {
                    let grid = self.world.resource::<FlowGrid>();
                    let config = self.world.resource::<SimConfig>();
                    (
                        grid.cell_center(x, z),
                        config.shield_radius,
                        config.shield_health,
                    )
                };
                self.world
                    .resource_mut::<ShieldState>()
                    .activate(center, radius, health);
                Ok(())
            }
            BuildingTag::Structure(kind) => {
                let id = self.next_structure_id;
                self.next_structure_id += 1;
                let health = match kind {
                    StructureKind::Core => 1000.0,
                    StructureKind::Standard => 150.0,
                };
                self.world.spawn(StructureBundle {
                    id: StructureId(id),
                    anchor: GridAnchor::new(x, z),
                    health: StructureHealth::new(health),
                    kind,
                });

                let result = {
                    let mut grid = self.world.resource_mut::<FlowGrid>();
                    grid.set_building(x, z);
                    match grid.target() {
                        Some(target) => grid.solve(target, SolveScope::Bounded),
                        None => Ok(()),
                    }
                };
                self.rebuild_obstructions();
                result
            }
        }
    }

    /// Notification that a building was removed from a grid cell.
    pub fn building_removed(&mut self, x: i32, z: i32, tag: BuildingTag) -> Result<(), SolveError> {
        match tag {
            BuildingTag::Shield => {
                self.world.resource_mut::<ShieldState>().deactivate();
                Ok(())
            }
            BuildingTag::Structure(_) => {
                let mut query = self.world.query::<(Entity, &GridAnchor)>();
                let entity = query
                    .iter(&self.world)
                    .find(|(_, anchor)| anchor.x == x && anchor.z == z)
                    .map(|(entity, _)| entity);
                if let Some(entity) = entity {
                    self.world.despawn(entity);
                }

                let result = {
                    let mut grid = self.world.resource_mut::<FlowGrid>();
                    grid.clear_building(x, z);
                    match grid.target() {
                        Some(target) => grid.solve(target, SolveScope::Bounded),
                        None => Ok(()),
                    }
                };
                self.rebuild_obstructions();
                result
            }
        }
    }

    // ------------------------------------------------------------------
    // Entity feeds
    // ------------------------------------------------------------------

    /// Turret fire request. The pass-through budget is clamped so the
    /// projectile's inline hit-set can never overflow.
    pub fn fire_projectile(
        &mut self,
        turret: u32,
        origin: (f32, f32, f32),
        dir: (f32, f32, f32),
        speed: f32,
        damage: f32,
        pass_through: u8,
        kind: ProjectileKind,
    ) -> Entity {
        let mag = (dir.0 * dir.0 + dir.1 * dir.1 + dir.2 * dir.2).sqrt();
        let dir = if mag < 1e-4 {
            (0.0, 0.0, 1.0)
        } else {
            (dir.0 / mag, dir.1 / mag, dir.2 / mag)
        };
        let pass_through = pass_through.min(HIT_SET_CAPACITY as u8 - 1);

        let entity = self
            .world
            .spawn(ProjectileBundle {
                turret: TurretId(turret),
                kind,
                position: Position::new(origin.0, origin.1, origin.2),
                velocity: Velocity::new(dir.0 * speed, dir.1 * speed, dir.2 * speed),
                state: ProjectileState {
                    damage,
                    speed,
                    pass_through,
                    ..Default::default()
                },
                hits: HitSet::default(),
            })
            .id();
        self.world
            .resource_mut::<ProjectileRegistry>()
            .entities
            .push(entity);
        entity
    }

    /// Spawn a single agent outside the lane spawner (tests, scripted
    /// waves).
    pub fn spawn_agent(&mut self, id: u32, class: EnemyClass, x: f32, z: f32) -> Entity {
        let entity = self.world.spawn(AgentBundle::new(id, class, x, z)).id();
        self.world
            .resource_mut::<AgentRegistry>()
            .entities
            .push(entity);
        entity
    }

    /// Pause or resume the lane spawner.
    pub fn set_spawning_paused(&mut self, paused: bool) {
        self.world.resource_mut::<SpawnerState>().paused = paused;
    }

    // ------------------------------------------------------------------
    // State extraction
    // ------------------------------------------------------------------

    /// Get a snapshot of the current simulation state, including the
    /// removal indices accumulated since the previous snapshot.
    pub fn snapshot(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::from_world(&mut self.world, self.tick, self.time);
        snapshot.removed_agents = std::mem::take(&mut self.removed_agents);
        snapshot.removed_projectiles = std::mem::take(&mut self.removed_projectiles);
        snapshot
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Drain this tick's outward event queues (VFX, building damage,
    /// turret XP, shield damage scalar).
    pub fn drain_events(&mut self) -> FrameEvents {
        self.world.resource_mut::<FrameEvents>().take()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f32 {
        self.time
    }

    pub fn agent_count(&self) -> usize {
        self.world.resource::<AgentRegistry>().entities.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.world.resource::<ProjectileRegistry>().entities.len()
    }

    pub fn match_over(&self) -> bool {
        self.world.resource::<MatchState>().is_over()
    }

    pub fn shield_health(&self) -> f32 {
        self.world.resource::<ShieldState>().health
    }

    /// Write the solved direction field as CSV for offline inspection.
    pub fn dump_flow_field<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.world.resource::<FlowGrid>().dump_direction_field(out)
    }

    /// Dump the direction field CSV to a file path.
    pub fn dump_flow_field_to_path<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.dump_flow_field(&mut file)
    }

    /// Get the spatial grid reference (for debugging/visualization).
    pub fn spatial_grid(&self) -> Option<&SpatialGrid> {
        self.world.get_resource::<SpatialGrid>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[cfg(feature = "profile")]
    pub fn profiler(&self) -> &crate::profiler::Profiler {
        &self.profiler
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 open grid with the target at cell (10, 10), cell centers on
    /// integer world coordinates, one fixed update per 0.05s step.
    fn scenario_config() -> SimConfig {
        SimConfig {
            fixed_timestep: 0.05,
            grid_width: 20,
            grid_length: 20,
            cell_size: 1.0,
            grid_origin: (-0.5, -0.5),
            target: (10, 10),
            spawn_lanes: Vec::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_world() {
        let sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert_eq!(sim.agent_count(), 0);
    }

    #[test]
    fn test_step_advances_tick() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 2);
        assert!((sim.current_time() - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_agent_converges_on_target() {
        let mut sim = SimWorld::with_config(scenario_config());
        let agent = sim.spawn_agent(1, EnemyClass::Husk, 0.0, 0.0);
        sim.world_mut().get_mut::<AgentStats>(agent).unwrap().speed = 10.0;

        for _ in 0..200 {
            sim.step(0.05);
        }

        let pos = *sim.world().get::<Position>(agent).unwrap();
        let dist = ((pos.x - 10.0).powi(2) + (pos.z - 10.0).powi(2)).sqrt();
        assert!(
            dist <= 0.1,
            "agent must converge within 0.1 of (10, 10), ended at ({}, {})",
            pos.x,
            pos.z
        );

        // Converged agents stop requesting waypoints and stop moving.
        assert!(sim.world().get::<Waypoint>(agent).unwrap().0.is_none());
        sim.step(0.05);
        let after = *sim.world().get::<Position>(agent).unwrap();
        assert_eq!((after.x, after.z), (pos.x, pos.z));
    }

    #[test]
    fn test_standard_and_explosive_overlap_scenario() {
        let mut sim = SimWorld::with_config(scenario_config());
        let victim = sim.spawn_agent(1, EnemyClass::Husk, 5.0, 5.0);
        sim.world_mut().get_mut::<Health>(victim).unwrap().current = 8.0;
        let bystander = sim.spawn_agent(2, EnemyClass::Husk, 7.0, 5.0);

        // Both projectiles overlap the victim in the same tick. Speed zero
        // keeps them on the aim point through the update.
        sim.fire_projectile(
            1,
            (5.0, 0.5, 5.0),
            (0.0, 0.0, 1.0),
            0.0,
            5.0,
            0,
            ProjectileKind::Standard,
        );
        sim.fire_projectile(
            2,
            (5.0, 0.5, 5.0),
            (0.0, 0.0, 1.0),
            0.0,
            5.0,
            0,
            ProjectileKind::Explosive,
        );

        sim.step(0.05);

        // 8 - 5 - 5 kills the victim; compaction removed it this tick.
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.removed_agents.len(), 1);
        assert_eq!(sim.agent_count(), 1);

        // The explosive splashed the bystander 2 units from the impact.
        let health = sim.world().get::<Health>(bystander).unwrap();
        assert!(
            health.current < health.max,
            "bystander within radius 3 must take splash damage"
        );

        // One kill, one XP event.
        let events = sim.drain_events();
        assert_eq!(events.turret_xp.len(), 1);
    }

    #[test]
    fn test_compaction_counts_are_exact() {
        let mut sim = SimWorld::with_config(scenario_config());
        for i in 0..6 {
            sim.spawn_agent(i, EnemyClass::Husk, i as f32, 0.0);
        }
        // Kill two by direct flagging.
        let registry = sim.world().resource::<AgentRegistry>().entities.clone();
        sim.world_mut().get_mut::<Dead>(registry[1]).unwrap().0 = true;
        sim.world_mut().get_mut::<Dead>(registry[4]).unwrap().0 = true;

        sim.step(0.05);

        assert_eq!(sim.agent_count(), 4, "6 - 2 removed");
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.removed_agents.len(), 2);
        assert_eq!(snapshot.agents.len(), 4);
    }

    #[test]
    fn test_building_added_reroutes_field() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.building_added(10, 5, BuildingTag::Structure(StructureKind::Standard))
            .unwrap();

        let grid = sim.world().resource::<FlowGrid>();
        let cell = grid.cell(10, 5).unwrap();
        assert!(cell.is_building_area);
        assert!(!cell.walkable);

        let obstructions = sim.world().resource::<ObstructionPoints>();
        assert_eq!(obstructions.0, vec![(10.0, 5.0)]);

        // Placement on the target cell is the one invalid request.
        let err = sim.building_added(10, 10, BuildingTag::Structure(StructureKind::Standard));
        assert!(matches!(err, Err(SolveError::TargetUnwalkable { .. })));
    }

    #[test]
    fn test_building_removed_restores_field() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.building_added(10, 5, BuildingTag::Structure(StructureKind::Standard))
            .unwrap();
        sim.building_removed(10, 5, BuildingTag::Structure(StructureKind::Standard))
            .unwrap();

        let grid = sim.world().resource::<FlowGrid>();
        assert!(grid.cell(10, 5).unwrap().walkable);
        assert!(sim.world().resource::<ObstructionPoints>().0.is_empty());

        let mut query = sim.world_mut().query::<&StructureId>();
        assert_eq!(query.iter(sim.world()).count(), 0);
    }

    #[test]
    fn test_shield_intercepts_and_reports_damage() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.building_added(10, 10, BuildingTag::Shield).unwrap();
        assert!(sim.shield_health() > 0.0);

        // An agent standing inside the dome attacks it and nothing else.
        sim.spawn_agent(1, EnemyClass::Husk, 10.0, 6.0);
        sim.step(0.05);

        let events = sim.drain_events();
        assert!(events.shield_damage > 0.0);
        assert!(sim.shield_health() < 500.0);
        assert!(events.building_damage.is_empty());
    }

    #[test]
    fn test_core_destruction_ends_match_and_reopens_cell() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.building_added(3, 3, BuildingTag::Structure(StructureKind::Core))
            .unwrap();
        {
            let world = sim.world_mut();
            let mut query = world.query::<&mut StructureHealth>();
            query.single_mut(world).current = 0.4;
        }
        // Adjacent agent melees the core down (10 dps * 0.05 = 0.5/tick).
        sim.spawn_agent(1, EnemyClass::Husk, 2.0, 3.0);

        sim.step(0.05);

        assert!(sim.match_over());
        assert!(sim.world().resource::<FlowGrid>().cell(3, 3).unwrap().walkable);
        assert!(sim.world().resource::<ObstructionPoints>().0.is_empty());
    }

    #[test]
    fn test_lane_spawner_feeds_registry() {
        let mut config = scenario_config();
        config.spawn_interval = 0.05;
        config.spawn_lanes = vec![(0.0, 0.0), (19.0, 0.0)];
        let mut sim = SimWorld::with_config(config);

        for _ in 0..5 {
            sim.step(0.05);
        }

        assert!(sim.agent_count() >= 2, "both lanes must have produced agents");
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.agents.len(), sim.agent_count());
    }

    #[test]
    fn test_pass_through_budget_is_clamped() {
        let mut sim = SimWorld::with_config(scenario_config());
        let projectile = sim.fire_projectile(
            1,
            (0.0, 0.5, 0.0),
            (0.0, 0.0, 1.0),
            20.0,
            5.0,
            200,
            ProjectileKind::Standard,
        );
        let state = sim.world().get::<ProjectileState>(projectile).unwrap();
        assert_eq!(state.pass_through as usize, HIT_SET_CAPACITY - 1);
    }

    #[test]
    fn test_projectile_lifetime_removal_reported() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.fire_projectile(
            1,
            (0.0, 0.5, 0.0),
            (0.0, 0.0, 1.0),
            1.0,
            5.0,
            0,
            ProjectileKind::Standard,
        );

        for _ in 0..70 {
            sim.step(0.05);
        }

        assert_eq!(sim.projectile_count(), 0, "3s lifetime cap must remove it");
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.removed_projectiles.len(), 1);
    }

    #[test]
    fn test_flow_field_csv_dump() {
        let sim = SimWorld::with_config(scenario_config());
        let mut buf = Vec::new();
        sim.dump_flow_field(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("index,direction_target,integration_cost,x,z"));
        assert_eq!(text.lines().count(), 401); // header + 400 cells
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut sim = SimWorld::new_default_level();
        sim.step(0.05);
        let json = sim.snapshot_json();
        assert!(json.contains("agents"));
        assert!(json.contains("structures"));
        assert!(json.contains("shield_active"));
    }

    #[test]
    fn test_default_level_runs() {
        let mut sim = SimWorld::new_default_level();
        for _ in 0..100 {
            sim.step(1.0 / 30.0);
        }
        assert!(sim.current_tick() >= 99);
        assert!(!sim.match_over());
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.structures.len(), 3);
        assert!(snapshot.shield_active);
    }

    #[test]
    fn test_congestion_accumulates_under_agents() {
        let mut sim = SimWorld::with_config(scenario_config());
        sim.spawn_agent(1, EnemyClass::Husk, 0.0, 0.0);
        sim.step(0.05);

        let grid = sim.world().resource::<FlowGrid>();
        let (cx, cz) = grid.world_to_cell(0.0, 0.0);
        // The agent moved within its starting neighborhood; at least one
        // nearby cell carries congestion weight.
        let mut total = 0;
        for dz in -1..=1 {
            for dx in -1..=1 {
                if let Some(cell) = grid.cell(cx + dx, cz + dz) {
                    total += cell.congestion;
                }
            }
        }
        assert!(total >= 1);
    }
}
