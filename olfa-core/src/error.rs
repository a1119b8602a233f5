use thiserror::Error;

use crate::channel::ChannelId;

/// Violations of the pulse invariants, reported when a pulse or one of its
/// channels is constructed directly.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PulseError {
    #[error("a pulse needs at least one channel")]
    NoChannels,

    #[error("channel {found} cannot occupy the slot of channel {slot}")]
    ChannelMismatch { slot: ChannelId, found: ChannelId },

    #[error("only one channel may start with a delay")]
    MultipleDelayedChannels,

    #[error("flow must be a finite, non-negative number, got {0}")]
    InvalidFlow(f64),

    #[error("delay {delay} ms plus duration {duration} ms exceeds the millisecond range")]
    OffsetOverflow { delay: u64, duration: u64 },
}

/// Errors produced while reading a pulse expression. Each variant carries the
/// offending part of the input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected 1 or 2 channels, found {count} in '{input}'")]
    ChannelCount { input: String, count: usize },

    #[error("invalid channel id in '{0}' (expected 1 or 2)")]
    InvalidChannelId(String),

    #[error("channel is listed twice in '{0}'")]
    DuplicateChannel(String),

    #[error("malformed channel expression '{0}'")]
    MalformedChannel(String),

    #[error("invalid pulse '{input}': {source}")]
    InvalidPulse {
        input: String,
        #[source]
        source: PulseError,
    },
}

impl ParseError {
    /// The part of the input that could not be accepted.
    pub fn fragment(&self) -> &str {
        match self {
            ParseError::ChannelCount { input, .. } | ParseError::InvalidPulse { input, .. } => {
                input
            }
            ParseError::InvalidChannelId(s)
            | ParseError::DuplicateChannel(s)
            | ParseError::MalformedChannel(s) => s,
        }
    }
}
