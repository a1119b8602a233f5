pub mod channel;
pub mod error;
pub mod parser;
pub mod pulse;
pub mod trial;

pub use channel::{ChannelId, ChannelPulse};
pub use error::{ParseError, PulseError};
pub use parser::{parse, parse_batch};
pub use pulse::Pulse;
pub use trial::TrialRecord;
