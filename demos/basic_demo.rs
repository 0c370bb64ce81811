//! Basic demonstration of the Bastion simulation core.
//!
//! Run with: cargo run --example basic_demo

use bastion_sim::{ProjectileKind, SimWorld};

fn main() {
    println!("=== Bastion - Simulation Demo ===\n");

    let mut sim = SimWorld::new_default_level();

    println!("Initial state:");
    print_snapshot(&mut sim);

    // Run for 10 seconds of game time, firing a turret volley every second.
    println!("\nRunning simulation for 300 ticks (10 seconds at 30 ticks/sec)...\n");
    for tick in 0..300 {
        sim.step(1.0 / 30.0);

        if (tick + 1) % 30 == 0 {
            // A turret at the core fires at the nearest spawn lane.
            sim.fire_projectile(
                1,
                (16.5, 0.5, 16.5),
                (-1.0, 0.0, -1.0),
                20.0,
                5.0,
                1,
                ProjectileKind::Standard,
            );
            sim.fire_projectile(
                2,
                (16.5, 0.5, 16.5),
                (1.0, 0.0, 1.0),
                18.0,
                8.0,
                0,
                ProjectileKind::Explosive,
            );

            println!(
                "--- Tick {} (t={:.1}s) ---",
                sim.current_tick(),
                sim.current_time()
            );
            print_snapshot(&mut sim);

            let events = sim.drain_events();
            if !events.turret_xp.is_empty() {
                println!("  turret XP events: {:?}", events.turret_xp);
            }
            if events.shield_damage > 0.0 {
                println!("  shield absorbed: {:.2}", events.shield_damage);
            }
        }
    }

    // Dump the solved direction field for offline inspection.
    let mut csv = Vec::new();
    sim.dump_flow_field(&mut csv).expect("csv dump");
    println!(
        "\nDirection field CSV: {} lines",
        String::from_utf8_lossy(&csv).lines().count()
    );

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty().expect("snapshot json"));
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();
    println!(
        "  agents: {}  projectiles: {}  shield: {:.0} hp",
        snapshot.agents.len(),
        snapshot.projectiles.len(),
        snapshot.shield_health
    );
    for agent in snapshot.agents.iter().take(4) {
        println!(
            "    agent {} [{}]: pos=({:.1}, {:.1}) hp={:.0}{}",
            agent.id,
            agent.class,
            agent.x,
            agent.z,
            agent.health,
            if agent.is_attacking { " ATTACKING" } else { "" }
        );
    }
}
