use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::timer::{LatencyLog, LatencyStats, Timer};

/// Virtual clock that only moves when told to.
///
/// Clones share the same clock, so a test can keep one handle to advance time
/// while a controller owns another. `sleep` advances the clock instead of
/// blocking, which makes whole runs complete instantly.
#[derive(Debug, Clone)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    latencies: LatencyLog,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(0)),
            latencies: LatencyLog::new(1000),
        }
    }

    /// Moves the clock forward by `d`, stopping at `u64::MAX` nanoseconds.
    pub fn advance(&self, d: Duration) {
        let step = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .now_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(step))
            });
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ManualTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_latency(&mut self, d: Duration) {
        self.latencies.push(d);
    }
    fn latency_stats(&self) -> LatencyStats {
        self.latencies.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_clock() {
        let timer = ManualTimer::new();
        let other = timer.clone();
        let start = other.now();
        timer.advance_ms(150);
        assert_eq!(other.elapsed(start), Duration::from_millis(150));
    }

    #[test]
    fn sleep_moves_time_forward() {
        let timer = ManualTimer::new();
        timer.sleep(Duration::from_millis(20));
        assert_eq!(timer.now(), 20_000_000);
    }

    #[test]
    fn huge_advance_saturates() {
        let timer = ManualTimer::new();
        timer.advance_ms(1);
        timer.advance(Duration::MAX);
        assert_eq!(timer.now(), u64::MAX);
        timer.advance_ms(1);
        assert_eq!(timer.now(), u64::MAX);
    }
}
