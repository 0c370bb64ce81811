//! Lightweight phase timing for the simulation driver.
//!
//! Enabled with the `profile` feature; [`crate::SimWorld`] then records
//! the duration of every fixed update and flow-field solve.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated timing statistics for one named phase.
#[derive(Default, Clone)]
pub struct PhaseStats {
    pub total_time: Duration,
    pub call_count: u64,
    pub max_time: Duration,
}

impl PhaseStats {
    pub fn avg_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.call_count as u32
        }
    }
}

/// Collects per-phase timings across ticks.
#[derive(Default)]
pub struct Profiler {
    phases: HashMap<&'static str, PhaseStats>,
    tick_count: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time a phase using a closure.
    pub fn time_phase<F, R>(&mut self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        let stats = self.phases.entry(name).or_default();
        stats.total_time += elapsed;
        stats.call_count += 1;
        stats.max_time = stats.max_time.max(elapsed);
    }

    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseStats> {
        self.phases.get(name)
    }

    /// Print a summary of all recorded phases, slowest first.
    pub fn print_summary(&self) {
        println!("=== Profiler Summary ({} ticks) ===", self.tick_count);
        let mut phases: Vec<_> = self.phases.iter().collect();
        phases.sort_by(|a, b| b.1.total_time.cmp(&a.1.total_time));

        println!(
            "{:<20} {:>12} {:>12} {:>12} {:>8}",
            "Phase", "Total", "Avg", "Max", "Calls"
        );
        for (name, stats) in phases {
            println!(
                "{:<20} {:>12.2?} {:>12.2?} {:>12.2?} {:>8}",
                name,
                stats.total_time,
                stats.avg_time(),
                stats.max_time,
                stats.call_count
            );
        }
    }

    pub fn reset(&mut self) {
        self.phases.clear();
        self.tick_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_profiler_records_phases() {
        let mut profiler = Profiler::new();

        profiler.time_phase("update", || sleep(Duration::from_millis(5)));
        profiler.time_phase("update", || sleep(Duration::from_millis(5)));
        profiler.tick();

        let stats = profiler.phase("update").unwrap();
        assert_eq!(stats.call_count, 2);
        assert!(stats.total_time >= Duration::from_millis(10));
        assert!(stats.avg_time() >= Duration::from_millis(5));
        assert_eq!(profiler.tick_count(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut profiler = Profiler::new();
        profiler.time_phase("solve", || {});
        profiler.tick();
        profiler.reset();

        assert!(profiler.phase("solve").is_none());
        assert_eq!(profiler.tick_count(), 0);
    }
}
