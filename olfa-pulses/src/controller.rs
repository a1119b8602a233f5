use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use olfa_core::{Pulse, TrialRecord};
use olfa_timing::{LatencyStats, Timer};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::ControllerConfig;
use super::timeline::{PulseStateChanged, Timeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Terminated,
    Completed,
    Disposed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Completed => "completed",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    #[error("cannot {action} a controller that is {actual}")]
    InvalidState {
        action: &'static str,
        actual: ControllerState,
    },

    #[error("controller has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Summary of a finished or interrupted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub fired: usize,
    pub total: usize,
    pub completed: bool,
}

/// Requests termination of a running controller from another thread. The
/// request is honoured before the controller fires its next node.
#[derive(Debug, Clone)]
pub struct TerminateHandle(Arc<AtomicBool>);

impl TerminateHandle {
    pub fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Delivers one pulse: fires each timeline node once its offset, measured
/// from the first node, has elapsed since [`run`](Self::run), reporting which
/// channels start and which keep flowing.
///
/// The controller never blocks on its own. The owner either calls
/// [`update`](Self::update) from its loop, or hands control over with
/// [`run_blocking`](Self::run_blocking), which sleeps through the timer
/// between nodes. All notifications are produced on the owning thread.
pub struct PulsesController<T: Timer> {
    pulse: Pulse,
    default_duration_ms: u64,
    timer: T,
    state: ControllerState,
    timeline: Option<Timeline>,
    total_nodes: usize,
    next_node: usize,
    /// Offset of the first node; `run` fires it and later nodes are due
    /// relative to it.
    base_offset: u64,
    started_at: Option<T::Timestamp>,
    cancel: Arc<AtomicBool>,
}

impl<T> PulsesController<T>
where
    T: Timer<Timestamp = u64>,
{
    pub fn new(pulse: Pulse, config: &ControllerConfig, timer: T) -> Result<Self, ControllerError> {
        config
            .validate()
            .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?;
        Ok(Self::with_default_duration(pulse, config.default_duration_ms, timer))
    }

    /// Controller using `default_duration_ms` for channels without an explicit
    /// duration. A zero default makes such channels close the instant they open.
    pub fn with_default_duration(pulse: Pulse, default_duration_ms: u64, timer: T) -> Self {
        Self {
            pulse,
            default_duration_ms,
            timer,
            state: ControllerState::Idle,
            timeline: None,
            total_nodes: 0,
            next_node: 0,
            base_offset: 0,
            started_at: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the pulse and returns the notifications due immediately. The
    /// first node always fires here, even when every channel is delayed.
    pub fn run(&mut self) -> Result<Vec<PulseStateChanged>, ControllerError> {
        match self.state {
            ControllerState::Idle => {}
            ControllerState::Disposed => return Err(ControllerError::Disposed),
            actual => {
                warn!(state = %actual, "run requested on a controller that is not idle");
                return Err(ControllerError::InvalidState {
                    action: "run",
                    actual,
                });
            }
        }

        let timeline = Timeline::build(&self.pulse, self.default_duration_ms);
        self.total_nodes = timeline.len();
        self.next_node = 0;
        self.base_offset = timeline.get(0).map_or(0, |n| n.offset);
        self.timeline = Some(timeline);
        self.cancel.store(false, Ordering::SeqCst);
        self.started_at = Some(self.timer.now());
        self.state = ControllerState::Running;
        info!(
            pulse = %self.pulse,
            nodes = self.total_nodes,
            default_duration_ms = self.default_duration_ms,
            "pulse started"
        );

        Ok(self.update())
    }

    /// Fires, in order, every node whose offset has elapsed. Returns nothing
    /// unless the controller is running.
    pub fn update(&mut self) -> Vec<PulseStateChanged> {
        let mut fired = Vec::new();
        if self.state != ControllerState::Running {
            return fired;
        }
        if self.cancel.load(Ordering::SeqCst) {
            self.terminate();
            return fired;
        }
        let Some(started) = self.started_at else {
            return fired;
        };

        let elapsed = self.timer.elapsed(started);
        loop {
            let Some(timeline) = self.timeline.as_ref() else {
                break;
            };
            let Some(node) = timeline.get(self.next_node) else {
                break;
            };
            let due = node.since(self.base_offset);
            if elapsed < due {
                break;
            }
            let Some(notification) = timeline.notification(self.next_node) else {
                break;
            };

            let lateness = elapsed - due;
            self.timer.record_latency(lateness);
            debug!(
                index = notification.index,
                offset_ms = notification.offset_ms,
                lateness_us = lateness.as_micros() as u64,
                starting = notification.starting.len(),
                ongoing = notification.ongoing.len(),
                "pulse node fired"
            );

            self.next_node += 1;
            let is_last = notification.is_last;
            fired.push(notification);
            if is_last {
                self.complete();
                break;
            }
        }
        fired
    }

    /// Time left until the next pending node is due, `None` when nothing is
    /// pending.
    pub fn time_until_next(&self) -> Option<Duration> {
        if self.state != ControllerState::Running {
            return None;
        }
        let started = self.started_at?;
        let node = self.timeline.as_ref()?.get(self.next_node)?;
        let due = node.since(self.base_offset);
        Some(due.saturating_sub(self.timer.elapsed(started)))
    }

    /// Runs the whole pulse on the calling thread, passing every notification
    /// to `on_change` in timeline order.
    pub fn run_blocking<F>(&mut self, mut on_change: F) -> Result<RunOutcome, ControllerError>
    where
        F: FnMut(&PulseStateChanged),
    {
        for notification in self.run()? {
            on_change(&notification);
        }
        while let Some(wait) = self.time_until_next() {
            if self.cancel.load(Ordering::SeqCst) {
                self.terminate();
                break;
            }
            self.timer.sleep(wait);
            for notification in self.update() {
                on_change(&notification);
            }
        }
        Ok(self.outcome())
    }

    /// Cancels every node not fired yet. Does nothing unless running.
    pub fn terminate(&mut self) {
        if self.state != ControllerState::Running {
            debug!(state = %self.state, "terminate ignored");
            return;
        }
        self.timeline = None;
        self.state = ControllerState::Terminated;
        info!(
            fired = self.next_node,
            total = self.total_nodes,
            "pulse terminated"
        );
    }

    pub fn terminate_handle(&self) -> TerminateHandle {
        TerminateHandle(Arc::clone(&self.cancel))
    }

    /// Stops any running pulse and releases the schedule. The controller
    /// cannot be run afterwards.
    pub fn dispose(&mut self) {
        if self.state == ControllerState::Disposed {
            warn!("controller disposed twice");
            return;
        }
        self.terminate();
        self.timeline = None;
        self.state = ControllerState::Disposed;
    }

    fn complete(&mut self) {
        self.timeline = None;
        self.state = ControllerState::Completed;
        info!(fired = self.next_node, "pulse completed");
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn pulse(&self) -> &Pulse {
        &self.pulse
    }

    /// The schedule of the current run; released once the run ends.
    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    pub fn fired_count(&self) -> usize {
        self.next_node
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Gives the timer back, e.g. to reuse its clock and latency history for
    /// the next trial.
    pub fn into_timer(self) -> T {
        self.timer
    }

    pub fn latency_stats(&self) -> LatencyStats {
        self.timer.latency_stats()
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome {
            fired: self.next_node,
            total: self.total_nodes,
            completed: self.state == ControllerState::Completed,
        }
    }

    pub fn record(&self, trial_id: usize) -> TrialRecord {
        TrialRecord {
            trial_id,
            pulse: self.pulse.clone(),
            fired_nodes: self.next_node,
            total_nodes: self.total_nodes,
            completed: self.state == ControllerState::Completed,
            timestamp_ns: self.started_at.unwrap_or_default(),
        }
    }
}
