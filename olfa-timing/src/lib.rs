mod manual;
mod timer;

pub use manual::ManualTimer;
pub use timer::{HighPrecisionTimer, LatencyStats, Timer};
