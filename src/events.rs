//! Per-tick event queues connecting the pipeline phases to each other and
//! to outside consumers.
//!
//! The collision resolver and the damage aggregator never mutate foreign
//! state directly; they push events into these queues. Internal queues are
//! drained by the sequential apply phase in the same tick, outward-facing
//! queues are drained once by the embedding layer after `step`.

use crate::components::ProjectileKind;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// A projectile-agent hit awaiting damage application.
#[derive(Debug, Clone, Copy)]
pub struct CollisionEvent {
    pub agent: Entity,
    pub agent_id: u32,
    pub damage: f32,
    pub turret: u32,
    pub kind: ProjectileKind,
}

/// Visual effect category, interpreted by the effect spawners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VfxVariant {
    ChainArc,
    Explosion,
    GroundStrike,
    SlowBurst,
}

/// A transient visual effect between two points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VfxEvent {
    pub start: (f32, f32, f32),
    pub end: (f32, f32, f32),
    pub duration: f32,
    pub variant: VfxVariant,
}

/// Damage dealt to the structure occupying a grid cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildingDamageEvent {
    pub cell: (i32, i32),
    pub amount: f32,
}

/// Experience credited to a turret for a kill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TurretXpEvent {
    pub turret: u32,
    pub xp: f32,
}

/// A child projectile to spawn after the parallel scan completes.
///
/// Spawning mid-scan would mutate the projectile store while it is being
/// iterated, so split/spread children are deferred through this request.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest {
    pub turret: u32,
    pub origin: (f32, f32, f32),
    pub dir: (f32, f32, f32),
    pub speed: f32,
    pub damage: f32,
    pub kind: ProjectileKind,
}

/// A pending speed debuff for an agent.
#[derive(Debug, Clone, Copy)]
pub struct SlowRequest {
    pub agent: Entity,
    pub factor: f32,
    pub duration: f32,
}

/// Outward-facing event buffers for one step.
///
/// Filled during the fixed updates of a step, drained once by the
/// embedding layer via [`crate::SimWorld::drain_events`]. Anything not
/// drained is cleared when the next step runs.
#[derive(Resource, Debug, Default)]
pub struct FrameEvents {
    pub vfx: Vec<VfxEvent>,
    pub building_damage: Vec<BuildingDamageEvent>,
    pub turret_xp: Vec<TurretXpEvent>,
    /// Total damage absorbed by the shield this tick.
    pub shield_damage: f32,
}

impl FrameEvents {
    pub fn clear(&mut self) {
        self.vfx.clear();
        self.building_damage.clear();
        self.turret_xp.clear();
        self.shield_damage = 0.0;
    }

    /// Take this tick's events, leaving empty buffers behind.
    pub fn take(&mut self) -> FrameEvents {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_events_take_resets() {
        let mut events = FrameEvents::default();
        events.shield_damage = 12.5;
        events.turret_xp.push(TurretXpEvent { turret: 3, xp: 5.0 });

        let drained = events.take();
        assert_eq!(drained.turret_xp.len(), 1);
        assert_eq!(drained.shield_damage, 12.5);
        assert!(events.turret_xp.is_empty());
        assert_eq!(events.shield_damage, 0.0);
    }
}
