//! ECS components for the Bastion simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// World position. The ground plane is x/z; y points up.
/// Agents stay at y = 0, projectiles may fly above it.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Position on the ground plane.
    pub fn ground(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    /// Distance on the ground plane, ignoring altitude.
    pub fn ground_distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// 3D velocity vector.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Velocity {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalized(&self) -> Self {
        let mag = self.magnitude();
        if mag < 0.0001 {
            Self::default()
        } else {
            Self {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
            }
        }
    }
}

/// Yaw around the up axis, in radians. Zero faces +z.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Heading(pub f32);

// ============================================================================
// AGENT COMPONENTS
// ============================================================================

/// Unique identifier for an agent. Stable for the agent's lifetime.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl Default for AgentId {
    fn default() -> Self {
        Self(0)
    }
}

/// Enemy archetype, drawn from the weighted spawn table.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyClass {
    /// Baseline walker.
    Husk,
    /// Fast, fragile.
    Sprinter,
    /// Slow, armored, heavy melee.
    Juggernaut,
}

impl Default for EnemyClass {
    fn default() -> Self {
        Self::Husk
    }
}

impl EnemyClass {
    pub fn stats(&self) -> AgentStats {
        match self {
            EnemyClass::Husk => AgentStats {
                speed: 6.0,
                melee_damage: 10.0,
            },
            EnemyClass::Sprinter => AgentStats {
                speed: 11.0,
                melee_damage: 6.0,
            },
            EnemyClass::Juggernaut => AgentStats {
                speed: 3.5,
                melee_damage: 25.0,
            },
        }
    }

    pub fn base_health(&self) -> f32 {
        match self {
            EnemyClass::Husk => 40.0,
            EnemyClass::Sprinter => 22.0,
            EnemyClass::Juggernaut => 140.0,
        }
    }

    pub fn base_armor(&self) -> f32 {
        match self {
            EnemyClass::Husk => 0.0,
            EnemyClass::Sprinter => 0.0,
            EnemyClass::Juggernaut => 0.4,
        }
    }
}

/// Health of an agent. Allowed to go negative so same-tick overkill from
/// multiple projectiles is observable.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current -= amount;
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(40.0)
    }
}

/// Fractional damage reduction, 0.0 = none, capped below 1.0.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Armor(pub f32);

impl Armor {
    /// Damage that gets through the armor.
    pub fn reduce(&self, damage: f32) -> f32 {
        damage * (1.0 - self.0.clamp(0.0, 0.95))
    }
}

/// Per-class movement and melee numbers.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentStats {
    /// Base movement speed (units per second).
    pub speed: f32,
    /// Melee damage per second against structures and the shield.
    pub melee_damage: f32,
}

impl Default for AgentStats {
    fn default() -> Self {
        EnemyClass::Husk.stats()
    }
}

/// Cached waypoint on the ground plane. `None` = refresh from the flow field.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Waypoint(pub Option<(f32, f32)>);

/// Attack state, recomputed every movement tick.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AttackState {
    pub is_attacking: bool,
    pub is_at_shield: bool,
    /// Grid cell of the obstruction being damaged, when attacking a building.
    pub attack_cell: Option<(i32, i32)>,
}

impl AttackState {
    pub fn clear(&mut self) {
        self.is_attacking = false;
        self.is_at_shield = false;
        self.attack_cell = None;
    }
}

/// Temporary movement debuff from slow projectiles and timewarp fields.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlowEffect {
    /// Speed multiplier while active (1.0 = unaffected).
    pub factor: f32,
    /// Seconds remaining.
    pub remaining: f32,
}

impl Default for SlowEffect {
    fn default() -> Self {
        Self {
            factor: 1.0,
            remaining: 0.0,
        }
    }
}

impl SlowEffect {
    /// Apply a slow, keeping the strongest factor and the longest duration.
    pub fn apply(&mut self, factor: f32, duration: f32) {
        if self.remaining <= 0.0 {
            self.factor = factor;
        } else {
            self.factor = self.factor.min(factor);
        }
        self.remaining = self.remaining.max(duration);
    }

    pub fn current_factor(&self) -> f32 {
        if self.remaining > 0.0 {
            self.factor
        } else {
            1.0
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.remaining > 0.0 {
            self.remaining -= dt;
            if self.remaining <= 0.0 {
                self.remaining = 0.0;
                self.factor = 1.0;
            }
        }
    }
}

/// Removal flag consumed by the lifecycle compactor.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Dead(pub bool);

// ============================================================================
// PROJECTILE COMPONENTS
// ============================================================================

/// Id of the turret that fired a projectile. XP from kills is credited here.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TurretId(pub u32);

/// Closed set of projectile behaviors, matched exhaustively in the
/// collision resolver.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    Standard,
    Explosive,
    ChainLightning,
    ArcLightning,
    Spread,
    SpreadCircles,
    Circler,
    Slow,
    Ricochet,
    OrbitalStrike,
    Firestorm,
    Timewarp,
    MeteorShower,
}

impl Default for ProjectileKind {
    fn default() -> Self {
        Self::Standard
    }
}

impl ProjectileKind {
    /// Payload kinds arm in flight and trigger an area effect when their
    /// altitude crosses the ground threshold.
    pub fn is_payload(&self) -> bool {
        matches!(
            self,
            ProjectileKind::OrbitalStrike
                | ProjectileKind::Firestorm
                | ProjectileKind::Timewarp
                | ProjectileKind::MeteorShower
        )
    }

    /// Kinds whose damage events are scaled by delta-time when drained.
    pub fn is_damage_over_time(&self) -> bool {
        matches!(self, ProjectileKind::Firestorm)
    }

    /// Kinds that split into child projectiles on impact.
    pub fn child_fan(&self) -> Option<usize> {
        match self {
            ProjectileKind::Spread => Some(5),
            ProjectileKind::SpreadCircles => Some(6),
            ProjectileKind::Circler => Some(8),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProjectileKind::Standard => "Standard",
            ProjectileKind::Explosive => "Explosive",
            ProjectileKind::ChainLightning => "ChainLightning",
            ProjectileKind::ArcLightning => "ArcLightning",
            ProjectileKind::Spread => "Spread",
            ProjectileKind::SpreadCircles => "SpreadCircles",
            ProjectileKind::Circler => "Circler",
            ProjectileKind::Slow => "Slow",
            ProjectileKind::Ricochet => "Ricochet",
            ProjectileKind::OrbitalStrike => "OrbitalStrike",
            ProjectileKind::Firestorm => "Firestorm",
            ProjectileKind::Timewarp => "Timewarp",
            ProjectileKind::MeteorShower => "MeteorShower",
        }
    }
}

/// Capacity of the inline hit-set. Pass-through budgets are clamped below
/// this on fire, so the set can never overflow mid-flight.
pub const HIT_SET_CAPACITY: usize = 8;

/// Fixed-capacity set of agent ids a projectile has already hit.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HitSet {
    ids: [u32; HIT_SET_CAPACITY],
    len: u8,
}

impl HitSet {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids[..self.len as usize].contains(&id)
    }

    /// Insert an id. Returns false if already present or the set is full.
    pub fn insert(&mut self, id: u32) -> bool {
        if self.contains(id) || (self.len as usize) >= HIT_SET_CAPACITY {
            return false;
        }
        self.ids[self.len as usize] = id;
        self.len += 1;
        true
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ids[..self.len as usize]
    }
}

/// Mutable flight state of a projectile.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectileState {
    pub damage: f32,
    pub speed: f32,
    /// Seconds in flight. Capped by the lifecycle rules.
    pub lifetime: f32,
    /// Additional agents the projectile may hit after its first hit.
    pub pass_through: u8,
    pub to_remove: bool,
    /// Set once a payload kind has crossed the ground threshold.
    pub payload_triggered: bool,
}

impl Default for ProjectileState {
    fn default() -> Self {
        Self {
            damage: 5.0,
            speed: 20.0,
            lifetime: 0.0,
            pass_through: 0,
            to_remove: false,
            payload_triggered: false,
        }
    }
}

// ============================================================================
// STRUCTURE COMPONENTS
// ============================================================================

/// Unique identifier for a placed structure.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StructureId(pub u32);

/// Grid cell a structure occupies. Building damage events are keyed by this.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridAnchor {
    pub x: i32,
    pub z: i32,
}

impl GridAnchor {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Health pool of a placed structure.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StructureHealth {
    pub current: f32,
    pub max: f32,
}

impl StructureHealth {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_destroyed(&self) -> bool {
        self.current <= 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for StructureHealth {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Structure role. Losing the core ends the match.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    Standard,
    Core,
}

impl Default for StructureKind {
    fn default() -> Self {
        Self::Standard
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a complete agent entity.
#[derive(Bundle, Default)]
pub struct AgentBundle {
    pub id: AgentId,
    pub class: EnemyClass,
    pub position: Position,
    pub velocity: Velocity,
    pub heading: Heading,
    pub waypoint: Waypoint,
    pub health: Health,
    pub armor: Armor,
    pub stats: AgentStats,
    pub attack: AttackState,
    pub slow: SlowEffect,
    pub dead: Dead,
}

impl AgentBundle {
    pub fn new(id: u32, class: EnemyClass, x: f32, z: f32) -> Self {
        Self {
            id: AgentId(id),
            class,
            position: Position::ground(x, z),
            health: Health::new(class.base_health()),
            armor: Armor(class.base_armor()),
            stats: class.stats(),
            ..Default::default()
        }
    }
}

/// Bundle for spawning a projectile entity.
#[derive(Bundle, Default)]
pub struct ProjectileBundle {
    pub turret: TurretId,
    pub kind: ProjectileKind,
    pub position: Position,
    pub velocity: Velocity,
    pub state: ProjectileState,
    pub hits: HitSet,
}

/// Bundle for spawning a placed structure entity.
#[derive(Bundle, Default)]
pub struct StructureBundle {
    pub id: StructureId,
    pub anchor: GridAnchor,
    pub health: StructureHealth,
    pub kind: StructureKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_set_dedup_and_capacity() {
        let mut hits = HitSet::default();
        assert!(hits.insert(7));
        assert!(!hits.insert(7), "duplicate ids must be rejected");
        assert!(hits.contains(7));
        assert_eq!(hits.len(), 1);

        for id in 0..(HIT_SET_CAPACITY as u32 + 4) {
            hits.insert(100 + id);
        }
        assert_eq!(hits.len(), HIT_SET_CAPACITY);
        assert!(!hits.insert(999), "full set must reject inserts");
    }

    #[test]
    fn test_armor_reduction() {
        let armor = Armor(0.4);
        assert!((armor.reduce(10.0) - 6.0).abs() < 0.001);
        assert_eq!(Armor::default().reduce(10.0), 10.0);
    }

    #[test]
    fn test_slow_effect_stacks_strongest() {
        let mut slow = SlowEffect::default();
        slow.apply(0.5, 2.0);
        slow.apply(0.8, 4.0);
        assert_eq!(slow.factor, 0.5);
        assert_eq!(slow.remaining, 4.0);

        slow.tick(4.0);
        assert_eq!(slow.current_factor(), 1.0);
    }

    #[test]
    fn test_health_allows_overkill() {
        let mut health = Health::new(8.0);
        health.damage(5.0);
        health.damage(5.0);
        assert!(!health.is_alive());
        assert!(health.current < 0.0);
    }
}
