use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelId, ChannelPulse};
use crate::error::{ParseError, PulseError};
use crate::parser;

/// A single trial's gas stimulus: up to two channel pulses, at most one of
/// which starts late.
///
/// A `Pulse` can only be obtained through [`Pulse::new`] or the parser, so the
/// invariants below always hold:
/// - at least one channel is present,
/// - each channel sits in its own slot,
/// - no more than one channel has a positive delay.
///
/// On the wire a pulse is its expression text, e.g. `1=4x200,2=[100]4x100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pulse {
    channel1: Option<ChannelPulse>,
    channel2: Option<ChannelPulse>,
}

impl Pulse {
    pub fn new(
        channel1: Option<ChannelPulse>,
        channel2: Option<ChannelPulse>,
    ) -> Result<Self, PulseError> {
        if channel1.is_none() && channel2.is_none() {
            return Err(PulseError::NoChannels);
        }
        for (slot, channel) in [(ChannelId::One, &channel1), (ChannelId::Two, &channel2)] {
            if let Some(ch) = channel {
                if ch.id != slot {
                    return Err(PulseError::ChannelMismatch { slot, found: ch.id });
                }
            }
        }
        let delayed = [channel1, channel2]
            .iter()
            .flatten()
            .filter(|ch| ch.is_delayed())
            .count();
        if delayed > 1 {
            return Err(PulseError::MultipleDelayedChannels);
        }
        Ok(Self { channel1, channel2 })
    }

    /// Single-channel pulse; the channel is placed in the slot matching its id.
    pub fn single(channel: ChannelPulse) -> Self {
        match channel.id {
            ChannelId::One => Self {
                channel1: Some(channel),
                channel2: None,
            },
            ChannelId::Two => Self {
                channel1: None,
                channel2: Some(channel),
            },
        }
    }

    pub fn channel1(&self) -> Option<&ChannelPulse> {
        self.channel1.as_ref()
    }

    pub fn channel2(&self) -> Option<&ChannelPulse> {
        self.channel2.as_ref()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelPulse> {
        match id {
            ChannelId::One => self.channel1(),
            ChannelId::Two => self.channel2(),
        }
    }

    /// Present channels in id order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelPulse> {
        self.channel1.iter().chain(self.channel2.iter())
    }

    pub fn channel_count(&self) -> usize {
        self.channels().count()
    }

    /// The channel that starts after pulse onset, if any.
    pub fn delayed_channel(&self) -> Option<&ChannelPulse> {
        self.channels().find(|ch| ch.is_delayed())
    }

    /// Offset at which the last channel closes.
    pub fn total_duration(&self, default_ms: u64) -> u64 {
        self.channels()
            .map(|ch| ch.finish_offset(default_ms))
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ch) in self.channels().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

impl FromStr for Pulse {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}

impl TryFrom<String> for Pulse {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parser::parse(&s)
    }
}

impl From<Pulse> for String {
    fn from(p: Pulse) -> String {
        p.to_string()
    }
}
