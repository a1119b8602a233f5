use serde::{Deserialize, Serialize};

use crate::pulse::Pulse;

/// Recorded outcome of delivering one pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub pulse: Pulse,
    pub fired_nodes: usize,
    pub total_nodes: usize,
    pub completed: bool,
    pub timestamp_ns: u64,
}

impl TrialRecord {
    /// True when the run stopped before its last timeline node fired.
    pub fn was_cut_short(&self) -> bool {
        !self.completed || self.fired_nodes < self.total_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_pulse_as_text() {
        let record = TrialRecord {
            trial_id: 3,
            pulse: "1=4x200".parse().unwrap(),
            fired_nodes: 1,
            total_nodes: 2,
            completed: false,
            timestamp_ns: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["pulse"], "1=4x200");
        assert_eq!(json["trial_id"], 3);
        assert!(record.was_cut_short());
    }
}
