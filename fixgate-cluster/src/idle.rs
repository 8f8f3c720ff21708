//! Pluggable idle strategy for the single-threaded polling loop (spec §5):
//! spin, then yield, then back off, so an idle node doesn't busy-loop a
//! whole core.

use std::thread;
use std::time::Duration;

pub trait IdleStrategy {
    /// Called once per poll iteration with whether any work was done.
    /// Implementations should reset their back-off state on `true`.
    fn idle(&mut self, work_done: bool);
}

/// Spin for `spin_iterations`, then `thread::yield_now()` for
/// `yield_iterations`, then sleep with linearly increasing back-off up to
/// `max_backoff`.
pub struct SpinYieldBackoffIdleStrategy {
    spin_iterations: u32,
    yield_iterations: u32,
    max_backoff: Duration,
    idle_count: u32,
}

impl SpinYieldBackoffIdleStrategy {
    pub fn new(spin_iterations: u32, yield_iterations: u32, max_backoff: Duration) -> Self {
        SpinYieldBackoffIdleStrategy {
            spin_iterations,
            yield_iterations,
            max_backoff,
            idle_count: 0,
        }
    }
}

impl Default for SpinYieldBackoffIdleStrategy {
    fn default() -> Self {
        Self::new(100, 100, Duration::from_millis(10))
    }
}

impl IdleStrategy for SpinYieldBackoffIdleStrategy {
    fn idle(&mut self, work_done: bool) {
        if work_done {
            self.idle_count = 0;
            return;
        }
        self.idle_count = self.idle_count.saturating_add(1);
        if self.idle_count <= self.spin_iterations {
            std::hint::spin_loop();
        } else if self.idle_count <= self.spin_iterations + self.yield_iterations {
            thread::yield_now();
        } else {
            let steps = self.idle_count - self.spin_iterations - self.yield_iterations;
            let backoff = Duration::from_micros(100).saturating_mul(steps).min(self.max_backoff);
            thread::sleep(backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_on_work() {
        let mut idle = SpinYieldBackoffIdleStrategy::new(2, 2, Duration::from_millis(1));
        idle.idle(false);
        idle.idle(false);
        idle.idle(true);
        assert_eq!(idle.idle_count, 0);
    }
}
