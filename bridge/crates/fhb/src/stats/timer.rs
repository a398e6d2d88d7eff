//! Stats Timer - Timing Utilities
//!
//! Times triggered collections and deferred drains.

use std::time::{Duration, Instant};

/// StatsTimer - wall-clock timer for bridge operations
pub struct StatsTimer {
    start: Instant,
}

impl StatsTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for StatsTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_monotonic() {
        let timer = StatsTimer::start();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed_us() >= 1_000);
        assert!(timer.elapsed_ms() >= 1.0);
    }
}
