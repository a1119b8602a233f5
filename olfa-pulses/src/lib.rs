pub mod config;
pub mod controller;
pub mod timeline;
pub mod trial;
pub use config::{ConfigError, ControllerConfig};
pub use controller::{
    ControllerError, ControllerState, PulsesController, RunOutcome, TerminateHandle,
};
pub use timeline::{ChannelEvent, EventKind, PulseStateChanged, Timeline, TimelineNode};
pub use trial::TrialList;
