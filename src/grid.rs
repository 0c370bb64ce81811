//! Flow-field grid - per-cell cost and direction data plus the solver.
//!
//! The grid stores walkability, building flags, and the solved flow field
//! that every agent follows toward the shared target. A solve runs four
//! passes: cost reset, breadth-first integration, obstacle ring weighting,
//! and direction derivation. The reset and direction passes are
//! embarrassingly parallel; the integration pass is queue-driven and
//! intrinsically sequential.
//!
//! ## Parallel Feature
//!
//! When compiled with `--features parallel`, the reset and direction passes
//! use rayon for internal parallel iteration.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, Write};
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Neighbor offsets in scan order. `GridCell::direction` indexes this table.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Number of concentric square rings weighted around each building cell.
pub const OBSTACLE_RING_COUNT: i32 = 10;
/// Ring penalty is `RING_PENALTY_BASE - ring * RING_PENALTY_STEP`.
pub const RING_PENALTY_BASE: i32 = 50_000;
pub const RING_PENALTY_STEP: i32 = 100;
/// Marker written into a building cell's integration cost. Building cells
/// are unwalkable, so the direction pass never selects them.
pub const BUILDING_COST_SENTINEL: i32 = -1_000_000;
/// Congestion weight is capped so repeated traffic cannot swamp the field.
pub const CONGESTION_CAP: i32 = 200;

/// A single cell of the flow grid.
///
/// The zero-valued default is what degenerate out-of-bounds lookups return:
/// unwalkable, costless, and pointing nowhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridCell {
    pub walkable: bool,
    pub is_building_area: bool,
    /// Cells inside the bounded-recompute region.
    pub is_pathfinding_area: bool,
    /// Octile base cost plus accumulated congestion, refreshed each solve.
    pub movement_cost: i32,
    /// Congestion weight accumulated between solves.
    pub congestion: i32,
    /// Cost-to-target. `i32::MAX` = unreached.
    pub integration_cost: i32,
    /// Index into [`NEIGHBOR_OFFSETS`], `-1` = no movement.
    pub direction: i32,
}

impl Default for GridCell {
    fn default() -> Self {
        Self {
            walkable: false,
            is_building_area: false,
            is_pathfinding_area: false,
            movement_cost: 0,
            congestion: 0,
            integration_cost: 0,
            direction: -1,
        }
    }
}

impl GridCell {
    /// A fresh walkable cell, before any solve.
    fn open() -> Self {
        Self {
            walkable: true,
            is_pathfinding_area: true,
            integration_cost: i32::MAX,
            ..Default::default()
        }
    }
}

/// Scope of a solve: the initial global pass or a bounded incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveScope {
    FullGrid,
    Bounded,
}

/// Hard failures of the solver. Everything else degrades to defaults.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("target cell ({x}, {z}) is outside the grid")]
    TargetOutOfBounds { x: i32, z: i32 },
    #[error("target cell ({x}, {z}) is not walkable")]
    TargetUnwalkable { x: i32, z: i32 },
}

/// The flow-field grid resource.
///
/// Owned by the simulation world, mutated only during a solve or by the
/// driver between phases, and read by every movement query.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct FlowGrid {
    width: i32,
    length: i32,
    cell_size: f32,
    origin_x: f32,
    origin_z: f32,
    cells: Vec<GridCell>,
    target: Option<(i32, i32)>,
}

impl FlowGrid {
    pub fn new(width: i32, length: i32, cell_size: f32, origin: (f32, f32)) -> Self {
        let count = (width.max(0) as usize) * (length.max(0) as usize);
        Self {
            width,
            length,
            cell_size,
            origin_x: origin.0,
            origin_z: origin.1,
            cells: vec![GridCell::open(); count],
            target: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn target(&self) -> Option<(i32, i32)> {
        self.target
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width && z >= 0 && z < self.length
    }

    #[inline]
    fn index(&self, x: i32, z: i32) -> usize {
        (z * self.width + x) as usize
    }

    pub fn cell(&self, x: i32, z: i32) -> Option<&GridCell> {
        if self.in_bounds(x, z) {
            Some(&self.cells[self.index(x, z)])
        } else {
            None
        }
    }

    fn cell_mut(&mut self, x: i32, z: i32) -> Option<&mut GridCell> {
        if self.in_bounds(x, z) {
            let idx = self.index(x, z);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Cell lookup by world position. Out-of-bounds positions yield the
    /// zero-valued default cell; callers must bounds-check before trusting
    /// the result.
    pub fn cell_at_world(&self, wx: f32, wz: f32) -> GridCell {
        let (x, z) = self.world_to_cell(wx, wz);
        self.cell(x, z).copied().unwrap_or_default()
    }

    pub fn world_to_cell(&self, wx: f32, wz: f32) -> (i32, i32) {
        (
            ((wx - self.origin_x) / self.cell_size).floor() as i32,
            ((wz - self.origin_z) / self.cell_size).floor() as i32,
        )
    }

    /// World position of a cell's center.
    pub fn cell_center(&self, x: i32, z: i32) -> (f32, f32) {
        (
            self.origin_x + (x as f32 + 0.5) * self.cell_size,
            self.origin_z + (z as f32 + 0.5) * self.cell_size,
        )
    }

    /// Clamp a cell coordinate into the grid.
    pub fn clamp_cell(&self, x: i32, z: i32) -> (i32, i32) {
        (
            x.clamp(0, (self.width - 1).max(0)),
            z.clamp(0, (self.length - 1).max(0)),
        )
    }

    /// The neighbor a stored direction points at.
    pub fn neighbor_of(&self, x: i32, z: i32, direction: i32) -> Option<(i32, i32)> {
        if !(0..8).contains(&direction) {
            return None;
        }
        let (dx, dz) = NEIGHBOR_OFFSETS[direction as usize];
        let (nx, nz) = (x + dx, z + dz);
        if self.in_bounds(nx, nz) {
            Some((nx, nz))
        } else {
            None
        }
    }

    /// Whether an agent standing in this cell can make progress.
    pub fn has_path_from(&self, x: i32, z: i32) -> bool {
        if self.target == Some((x, z)) {
            return true;
        }
        self.cell(x, z).map(|c| c.direction >= 0).unwrap_or(false)
    }

    /// Restrict the bounded-recompute region to an interior rectangle
    /// (inclusive bounds).
    pub fn set_pathfinding_region(&mut self, min_x: i32, min_z: i32, max_x: i32, max_z: i32) {
        for z in 0..self.length {
            for x in 0..self.width {
                let idx = self.index(x, z);
                self.cells[idx].is_pathfinding_area =
                    x >= min_x && x <= max_x && z >= min_z && z <= max_z;
            }
        }
    }

    /// Mark a cell as occupied by a building. Takes effect on the next solve.
    pub fn set_building(&mut self, x: i32, z: i32) {
        if let Some(cell) = self.cell_mut(x, z) {
            cell.walkable = false;
            cell.is_building_area = true;
        }
    }

    /// Clear a building cell back to open ground.
    pub fn clear_building(&mut self, x: i32, z: i32) {
        if let Some(cell) = self.cell_mut(x, z) {
            cell.walkable = true;
            cell.is_building_area = false;
        }
    }

    /// Mark impassable terrain that is not a building (no attack target).
    pub fn set_unwalkable(&mut self, x: i32, z: i32) {
        if let Some(cell) = self.cell_mut(x, z) {
            cell.walkable = false;
            cell.is_building_area = false;
        }
    }

    /// Accumulate congestion weight on a cell, folded into its movement
    /// cost at the next solve.
    pub fn add_congestion(&mut self, x: i32, z: i32, weight: i32) {
        if let Some(cell) = self.cell_mut(x, z) {
            cell.congestion = (cell.congestion + weight).min(CONGESTION_CAP);
        }
    }

    /// Coordinates of every building cell, for terrain-contact tests.
    pub fn building_cells(&self) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for z in 0..self.length {
            for x in 0..self.width {
                if self.cells[self.index(x, z)].is_building_area {
                    out.push((x, z));
                }
            }
        }
        out
    }

    /// Solve the flow field toward `target`.
    ///
    /// A bounded solve whose target lies outside the pathfinding region is
    /// retried as a full-grid solve; partial state from an invalid request
    /// is never written.
    pub fn solve(&mut self, target: (i32, i32), scope: SolveScope) -> Result<(), SolveError> {
        let (tx, tz) = target;
        if !self.in_bounds(tx, tz) {
            return Err(SolveError::TargetOutOfBounds { x: tx, z: tz });
        }
        let t_idx = self.index(tx, tz);
        if !self.cells[t_idx].walkable {
            return Err(SolveError::TargetUnwalkable { x: tx, z: tz });
        }
        let scope = if scope == SolveScope::Bounded && !self.cells[t_idx].is_pathfinding_area {
            SolveScope::FullGrid
        } else {
            scope
        };

        self.target = Some(target);
        self.reset_pass(target, scope);
        self.integration_pass(target, scope);
        self.ring_weight_pass(target, scope);
        self.direction_pass(target, scope);

        debug_assert_eq!(self.cells[t_idx].integration_cost, 0);
        Ok(())
    }

    fn reset_pass(&mut self, target: (i32, i32), scope: SolveScope) {
        let width = self.width;

        let reset = |idx: usize, cell: &mut GridCell| {
            if scope == SolveScope::Bounded && !cell.is_pathfinding_area {
                return;
            }
            let x = idx as i32 % width;
            let z = idx as i32 / width;
            cell.integration_cost = i32::MAX;
            cell.movement_cost = octile_cost(x - target.0, z - target.1) + cell.congestion;
            cell.direction = -1;
        };

        #[cfg(feature = "parallel")]
        self.cells
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, cell)| reset(idx, cell));

        #[cfg(not(feature = "parallel"))]
        self.cells
            .iter_mut()
            .enumerate()
            .for_each(|(idx, cell)| reset(idx, cell));
    }

    /// Breadth-first cost propagation from the target. Queue-driven and
    /// data-dependent, so it runs on a single worker.
    fn integration_pass(&mut self, target: (i32, i32), scope: SolveScope) {
        let t_idx = self.index(target.0, target.1);
        self.cells[t_idx].integration_cost = 0;

        let mut queue: VecDeque<(i32, i32)> = VecDeque::new();
        queue.push_back(target);

        while let Some((cx, cz)) = queue.pop_front() {
            let current = self.cells[self.index(cx, cz)].integration_cost;
            for (dx, dz) in NEIGHBOR_OFFSETS {
                let (nx, nz) = (cx + dx, cz + dz);
                if !self.in_bounds(nx, nz) {
                    continue;
                }
                let n_idx = self.index(nx, nz);
                let neighbor = &self.cells[n_idx];
                if !neighbor.walkable {
                    continue;
                }
                if scope == SolveScope::Bounded && !neighbor.is_pathfinding_area {
                    continue;
                }
                let candidate = current + neighbor.movement_cost;
                if candidate < neighbor.integration_cost {
                    self.cells[n_idx].integration_cost = candidate;
                    queue.push_back((nx, nz));
                }
            }
        }
    }

    /// Weight concentric square rings around every building cell so the
    /// direction field steers wide of obstructions. The building cell
    /// itself is stamped with the sentinel marker.
    fn ring_weight_pass(&mut self, target: (i32, i32), scope: SolveScope) {
        let buildings = self.building_cells();
        for (bx, bz) in buildings {
            let idx = self.index(bx, bz);
            self.cells[idx].integration_cost = BUILDING_COST_SENTINEL;

            for ring in 1..=OBSTACLE_RING_COUNT {
                let penalty = RING_PENALTY_BASE - ring * RING_PENALTY_STEP;
                for d in -ring..=ring {
                    self.apply_ring_penalty(bx + d, bz - ring, target, scope, penalty);
                    self.apply_ring_penalty(bx + d, bz + ring, target, scope, penalty);
                }
                for d in (-ring + 1)..=(ring - 1) {
                    self.apply_ring_penalty(bx - ring, bz + d, target, scope, penalty);
                    self.apply_ring_penalty(bx + ring, bz + d, target, scope, penalty);
                }
            }
        }
    }

    fn apply_ring_penalty(
        &mut self,
        x: i32,
        z: i32,
        target: (i32, i32),
        scope: SolveScope,
        penalty: i32,
    ) {
        if (x, z) == target || !self.in_bounds(x, z) {
            return;
        }
        let idx = self.index(x, z);
        let cell = &mut self.cells[idx];
        if !cell.walkable
            || cell.is_building_area
            || cell.integration_cost == i32::MAX
            || (scope == SolveScope::Bounded && !cell.is_pathfinding_area)
        {
            return;
        }
        cell.integration_cost += penalty;
    }

    fn direction_pass(&mut self, target: (i32, i32), scope: SolveScope) {
        let width = self.width;
        let length = self.length;

        #[cfg(feature = "parallel")]
        let directions: Vec<i32> = (0..self.cells.len())
            .into_par_iter()
            .map(|idx| derive_direction(&self.cells, width, length, idx, target, scope))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let directions: Vec<i32> = (0..self.cells.len())
            .map(|idx| derive_direction(&self.cells, width, length, idx, target, scope))
            .collect();

        for (cell, dir) in self.cells.iter_mut().zip(directions) {
            cell.direction = dir;
        }
    }

    /// Write the solved direction field as CSV for offline inspection.
    /// Diagnostic surface, not a stable contract.
    pub fn dump_direction_field<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "index,direction_target,integration_cost,x,z")?;
        for (idx, cell) in self.cells.iter().enumerate() {
            let x = idx as i32 % self.width;
            let z = idx as i32 / self.width;
            let direction_target = match self.neighbor_of(x, z, cell.direction) {
                Some((nx, nz)) => self.index(nx, nz) as i64,
                None => -1,
            };
            writeln!(
                out,
                "{},{},{},{},{}",
                idx, direction_target, cell.integration_cost, x, z
            )?;
        }
        Ok(())
    }
}

/// Octile distance cost: `14 * min(dx, dz) + 10 * |dx - dz|`.
fn octile_cost(dx: i32, dz: i32) -> i32 {
    let dx = dx.abs();
    let dz = dz.abs();
    14 * dx.min(dz) + 10 * (dx - dz).abs()
}

/// Select the walkable neighbor with the strictly lowest integration cost.
/// First match wins on ties, so the scan order of [`NEIGHBOR_OFFSETS`] is
/// the tie break.
fn derive_direction(
    cells: &[GridCell],
    width: i32,
    length: i32,
    idx: usize,
    target: (i32, i32),
    scope: SolveScope,
) -> i32 {
    let x = idx as i32 % width;
    let z = idx as i32 / width;
    let cell = &cells[idx];

    if scope == SolveScope::Bounded && !cell.is_pathfinding_area {
        return cell.direction;
    }
    if !cell.walkable || cell.integration_cost == i32::MAX || (x, z) == target {
        return -1;
    }

    let mut best_cost = cell.integration_cost;
    let mut best_dir = -1;
    for (i, (dx, dz)) in NEIGHBOR_OFFSETS.iter().enumerate() {
        let (nx, nz) = (x + dx, z + dz);
        if nx < 0 || nx >= width || nz < 0 || nz >= length {
            continue;
        }
        let neighbor = &cells[(nz * width + nx) as usize];
        if !neighbor.walkable || neighbor.integration_cost == i32::MAX {
            continue;
        }
        if neighbor.integration_cost < best_cost {
            best_cost = neighbor.integration_cost;
            best_dir = i as i32;
        }
    }
    best_dir
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved_grid(width: i32, length: i32, target: (i32, i32)) -> FlowGrid {
        let mut grid = FlowGrid::new(width, length, 1.0, (-0.5, -0.5));
        grid.solve(target, SolveScope::FullGrid).unwrap();
        grid
    }

    #[test]
    fn test_target_cost_is_zero() {
        let grid = solved_grid(20, 20, (10, 10));
        assert_eq!(grid.cell(10, 10).unwrap().integration_cost, 0);
        assert_eq!(grid.cell(10, 10).unwrap().direction, -1);
    }

    #[test]
    fn test_target_zero_survives_nearby_building() {
        let mut grid = FlowGrid::new(20, 20, 1.0, (-0.5, -0.5));
        grid.set_building(11, 10);
        grid.solve((10, 10), SolveScope::FullGrid).unwrap();
        assert_eq!(grid.cell(10, 10).unwrap().integration_cost, 0);
    }

    #[test]
    fn test_monotonic_descent_reaches_target() {
        let grid = solved_grid(20, 20, (10, 10));

        let (mut x, mut z) = (0, 0);
        let mut last_cost = grid.cell(x, z).unwrap().integration_cost;
        let mut steps = 0;
        while (x, z) != (10, 10) {
            let dir = grid.cell(x, z).unwrap().direction;
            assert!(dir >= 0, "reachable cell ({x},{z}) must store a direction");
            let (nx, nz) = grid.neighbor_of(x, z, dir).unwrap();
            let cost = grid.cell(nx, nz).unwrap().integration_cost;
            assert!(cost < last_cost, "cost must strictly decrease along the field");
            last_cost = cost;
            x = nx;
            z = nz;
            steps += 1;
            assert!(steps <= 400, "path must terminate within width*length steps");
        }
    }

    #[test]
    fn test_descent_never_cycles_around_building() {
        let mut grid = FlowGrid::new(20, 20, 1.0, (-0.5, -0.5));
        grid.set_building(5, 10);
        grid.solve((10, 10), SolveScope::FullGrid).unwrap();

        // Strictly decreasing costs bound the walk even where ring
        // weighting distorts the field.
        let (mut x, mut z) = (0, 0);
        let mut last_cost = grid.cell(x, z).unwrap().integration_cost;
        for _ in 0..400 {
            let dir = grid.cell(x, z).unwrap().direction;
            if dir < 0 || (x, z) == (10, 10) {
                break;
            }
            let (nx, nz) = grid.neighbor_of(x, z, dir).unwrap();
            let cost = grid.cell(nx, nz).unwrap().integration_cost;
            assert!(cost < last_cost);
            last_cost = cost;
            x = nx;
            z = nz;
        }
    }

    #[test]
    fn test_ring_weighting_penalizes_building_neighbors() {
        let mut grid = FlowGrid::new(20, 20, 1.0, (-0.5, -0.5));
        grid.set_building(5, 10);
        grid.solve((10, 10), SolveScope::FullGrid).unwrap();

        // (6, 10) is adjacent to the building; (14, 10) is the mirrored
        // free cell at the same graph distance from the target.
        let near_building = grid.cell(6, 10).unwrap().integration_cost;
        let free = grid.cell(14, 10).unwrap().integration_cost;
        assert!(
            near_building > free,
            "cell next to a building must cost more ({near_building} <= {free})"
        );

        let sentinel = grid.cell(5, 10).unwrap().integration_cost;
        assert_eq!(sentinel, BUILDING_COST_SENTINEL);
    }

    #[test]
    fn test_walled_off_cells_are_unreached() {
        let mut grid = FlowGrid::new(10, 10, 1.0, (0.0, 0.0));
        // Wall across the full width at z = 5.
        for x in 0..10 {
            grid.set_unwalkable(x, 5);
        }
        grid.solve((2, 2), SolveScope::FullGrid).unwrap();

        let cut_off = grid.cell(2, 8).unwrap();
        assert_eq!(cut_off.integration_cost, i32::MAX);
        assert_eq!(cut_off.direction, -1);
        assert!(!grid.has_path_from(2, 8));
        assert!(grid.has_path_from(2, 3));
    }

    #[test]
    fn test_bounded_solve_clips_to_region() {
        let mut grid = FlowGrid::new(20, 20, 1.0, (0.0, 0.0));
        grid.set_pathfinding_region(5, 5, 14, 14);
        grid.solve((10, 10), SolveScope::Bounded).unwrap();

        assert_eq!(grid.cell(10, 10).unwrap().integration_cost, 0);
        assert!(grid.cell(6, 6).unwrap().integration_cost < i32::MAX);
        // Outside the region nothing was touched.
        assert_eq!(grid.cell(2, 2).unwrap().integration_cost, i32::MAX);
        assert_eq!(grid.cell(2, 2).unwrap().direction, -1);
    }

    #[test]
    fn test_bounded_solve_with_outside_target_goes_full() {
        let mut grid = FlowGrid::new(20, 20, 1.0, (0.0, 0.0));
        grid.set_pathfinding_region(5, 5, 14, 14);
        grid.solve((2, 2), SolveScope::Bounded).unwrap();

        // Fallback to full grid: the far corner is reached.
        assert!(grid.cell(18, 18).unwrap().integration_cost < i32::MAX);
    }

    #[test]
    fn test_solve_rejects_bad_targets() {
        let mut grid = FlowGrid::new(10, 10, 1.0, (0.0, 0.0));
        assert!(matches!(
            grid.solve((50, 0), SolveScope::FullGrid),
            Err(SolveError::TargetOutOfBounds { .. })
        ));

        grid.set_building(3, 3);
        assert!(matches!(
            grid.solve((3, 3), SolveScope::FullGrid),
            Err(SolveError::TargetUnwalkable { .. })
        ));
        // Failed solves leave no target behind.
        assert_eq!(grid.target(), None);
    }

    #[test]
    fn test_degenerate_lookup_returns_default() {
        let grid = solved_grid(10, 10, (5, 5));
        let cell = grid.cell_at_world(-500.0, -500.0);
        assert!(!cell.walkable);
        assert_eq!(cell.direction, -1);
        assert_eq!(cell.integration_cost, 0);
    }

    #[test]
    fn test_world_cell_round_trip() {
        let grid = FlowGrid::new(20, 20, 1.0, (-0.5, -0.5));
        // Centers land on integer coordinates with this origin.
        assert_eq!(grid.cell_center(10, 10), (10.0, 10.0));
        assert_eq!(grid.world_to_cell(10.0, 10.0), (10, 10));
        assert_eq!(grid.world_to_cell(0.0, 0.0), (0, 0));
    }

    #[test]
    fn test_congestion_folds_into_movement_cost() {
        let mut grid = FlowGrid::new(10, 10, 1.0, (0.0, 0.0));
        grid.add_congestion(4, 4, 50);
        grid.add_congestion(4, 4, CONGESTION_CAP);
        grid.solve((5, 5), SolveScope::FullGrid).unwrap();

        let congested = grid.cell(4, 4).unwrap();
        assert_eq!(congested.congestion, CONGESTION_CAP);
        assert_eq!(congested.movement_cost, octile_cost(1, 1) + CONGESTION_CAP);
    }

    #[test]
    fn test_csv_dump_shape() {
        let grid = solved_grid(4, 4, (2, 2));
        let mut buf = Vec::new();
        grid.dump_direction_field(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 17); // header + 16 cells
        assert_eq!(lines[0], "index,direction_target,integration_cost,x,z");
        // Every data row has five comma-separated fields.
        assert!(lines[1..].iter().all(|l| l.split(',').count() == 5));
    }

    #[test]
    fn test_octile_cost() {
        assert_eq!(octile_cost(0, 0), 0);
        assert_eq!(octile_cost(3, 0), 30);
        assert_eq!(octile_cost(3, 3), 42);
        assert_eq!(octile_cost(-2, 5), 58);
    }
}
