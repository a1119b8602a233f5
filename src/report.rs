use std::fmt::Write as _;

use olfa_core::{ChannelPulse, TrialRecord};
use olfa_pulses::{PulseStateChanged, Timeline};
use olfa_timing::LatencyStats;
use serde::Serialize;

fn channel_list(channels: &[ChannelPulse]) -> String {
    if channels.is_empty() {
        return "-".to_string();
    }
    channels
        .iter()
        .map(|ch| format!("{}@{}", ch.id, ch.flow))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn notification_line(trial_id: usize, n: &PulseStateChanged) -> String {
    format!(
        "trial {:>3} | node {} | {:>6} ms | starting {:<12} | ongoing {:<12}{}",
        trial_id,
        n.index,
        n.offset_ms,
        channel_list(&n.starting),
        channel_list(&n.ongoing),
        if n.is_last { " | done" } else { "" },
    )
}

pub fn timeline_table(timeline: &Timeline) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:>8}  {:>9}  {:<12}  {:<12}  {:<12}",
        "node", "offset", "interval", "starting", "ending", "ongoing"
    );
    for n in timeline.notifications() {
        let node = &timeline.nodes()[n.index];
        let _ = writeln!(
            out,
            "{:>4}  {:>5} ms  {:>7.3} s  {:<12}  {:<12}  {:<12}",
            n.index,
            node.offset,
            node.interval,
            channel_list(&node.starting),
            channel_list(&node.ending),
            channel_list(&n.ongoing),
        );
    }
    out
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub trials: usize,
    pub completed: usize,
    pub latency_avg_us: f64,
    pub latency_jitter_us: f64,
    pub latency_max_us: f64,
}

impl SessionSummary {
    pub fn new(records: &[TrialRecord], latency: &LatencyStats) -> Self {
        Self {
            trials: records.len(),
            completed: records.iter().filter(|r| r.completed).count(),
            latency_avg_us: latency.average_ns / 1_000.0,
            latency_jitter_us: latency.jitter_ns / 1_000.0,
            latency_max_us: latency.max_ns / 1_000.0,
        }
    }
}
