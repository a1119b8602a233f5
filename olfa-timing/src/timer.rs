use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Clock and sleeper driving pulse schedules.
///
/// Implementations also keep a bounded history of how late each scheduled
/// step actually fired, so timing quality can be reported after a run.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_latency(&mut self, d: Duration);
    fn latency_stats(&self) -> LatencyStats;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    pub samples: usize,
    pub average_ns: f64,
    pub jitter_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
}

impl LatencyStats {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = samples
            .into_iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return Self::default();
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            samples: times.len(),
            average_ns: avg,
            jitter_ns: var.sqrt(),
            min_ns: min,
            max_ns: max,
        }
    }
}

/// Bounded history of lateness samples shared by the timer implementations.
#[derive(Debug, Clone)]
pub(crate) struct LatencyLog {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl LatencyLog {
    pub(crate) fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub(crate) fn push(&mut self, d: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    pub(crate) fn stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.samples)
    }
}

/// Wall-clock timer with the most precise sleep the platform offers.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    latencies: LatencyLog,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_latency(&mut self, d: Duration) {
        self.latencies.push(d);
    }
    fn latency_stats(&self) -> LatencyStats {
        self.latencies.stats()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            latencies: LatencyLog::new(1000),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // clock_nanosleep returns the error code directly; resume after signals.
        loop {
            let ret = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if ret != EINTR {
                break;
            }
            req = rem;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_nothing_are_zero() {
        let stats = LatencyStats::from_samples(std::iter::empty::<&Duration>());
        assert_eq!(stats, LatencyStats::default());
    }

    #[test]
    fn stats_summarise_samples() {
        let samples = [
            Duration::from_micros(100),
            Duration::from_micros(300),
        ];
        let stats = LatencyStats::from_samples(&samples);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.average_ns, 200_000.0);
        assert_eq!(stats.jitter_ns, 100_000.0);
        assert_eq!(stats.min_ns, 100_000.0);
        assert_eq!(stats.max_ns, 300_000.0);
    }

    #[test]
    fn latency_log_keeps_most_recent() {
        let mut log = LatencyLog::new(2);
        log.push(Duration::from_nanos(1));
        log.push(Duration::from_nanos(2));
        log.push(Duration::from_nanos(3));
        let stats = log.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.min_ns, 2.0);
    }

    #[test]
    fn sleep_waits_at_least_requested() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(2));
        assert!(timer.elapsed(before) >= Duration::from_millis(2));
    }
}
