//! Whole-tick benchmark: many agents and projectiles through the full
//! pipeline.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};

use bastion_sim::{EnemyClass, ProjectileKind, SimConfig, SimWorld};

fn populated_world(agents: u32) -> SimWorld {
    let config = SimConfig {
        grid_width: 64,
        grid_length: 64,
        target: (32, 32),
        spawn_lanes: Vec::new(),
        ..Default::default()
    };
    let mut sim = SimWorld::with_config(config);

    for i in 0..agents {
        let angle = i as f32 * 0.39;
        let radius = 20.0 + (i % 10) as f32;
        sim.spawn_agent(
            i,
            EnemyClass::Husk,
            32.0 + radius * angle.cos(),
            32.0 + radius * angle.sin(),
        );
    }
    for i in 0..32 {
        let angle = i as f32 * 0.2;
        sim.fire_projectile(
            i,
            (32.0, 0.5, 32.0),
            (angle.cos(), 0.0, angle.sin()),
            15.0,
            2.0,
            2,
            ProjectileKind::Standard,
        );
    }
    sim
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("tick_400_agents", |b| {
        let mut sim = populated_world(400);
        b.iter(|| sim.step(1.0 / 30.0));
    });

    c.bench_function("full_solve_64x64", |b| {
        let mut sim = populated_world(0);
        b.iter(|| sim.solve_flow_field((32, 32)).unwrap());
    });
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
