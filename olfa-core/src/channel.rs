use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, PulseError};

/// One of the two independently controlled gas lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChannelId {
    One,
    Two,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::One, ChannelId::Two];

    pub fn number(self) -> u8 {
        match self {
            ChannelId::One => 1,
            ChannelId::Two => 2,
        }
    }
}

impl From<ChannelId> for u8 {
    fn from(id: ChannelId) -> u8 {
        id.number()
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = ParseError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(ChannelId::One),
            2 => Ok(ChannelId::Two),
            other => Err(ParseError::InvalidChannelId(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A single channel's part of a pulse: how much gas flows, when the valve
/// opens relative to pulse onset, and for how long.
///
/// A `duration` of zero means "use the default duration supplied when the
/// pulse is scheduled".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelPulse {
    pub id: ChannelId,
    pub flow: f64,
    pub delay: u64,
    pub duration: u64,
}

impl ChannelPulse {
    pub fn new(id: ChannelId, flow: f64, delay: u64, duration: u64) -> Result<Self, PulseError> {
        if !flow.is_finite() || flow < 0.0 {
            return Err(PulseError::InvalidFlow(flow));
        }
        if delay.checked_add(duration).is_none() {
            return Err(PulseError::OffsetOverflow { delay, duration });
        }
        Ok(Self {
            id,
            flow,
            delay,
            duration,
        })
    }

    /// Channel opening at pulse onset and staying open for the default duration.
    pub fn with_flow(id: ChannelId, flow: f64) -> Result<Self, PulseError> {
        Self::new(id, flow, 0, 0)
    }

    pub fn is_delayed(&self) -> bool {
        self.delay > 0
    }

    /// Milliseconds the channel stays open once `default_ms` is applied.
    pub fn effective_duration(&self, default_ms: u64) -> u64 {
        if self.duration > 0 {
            self.duration
        } else {
            default_ms
        }
    }

    /// Offset from pulse onset at which this channel closes. Saturates when a
    /// large default duration is applied to a large delay.
    pub fn finish_offset(&self, default_ms: u64) -> u64 {
        self.delay.saturating_add(self.effective_duration(default_ms))
    }
}

impl fmt::Display for ChannelPulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.id)?;
        if self.delay > 0 {
            write!(f, "[{}]", self.delay)?;
        }
        write!(f, "{}", self.flow)?;
        if self.duration > 0 {
            write!(f, "x{}", self.duration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_offset_falls_back_to_default() {
        let ch = ChannelPulse::new(ChannelId::Two, 4.0, 100, 0).unwrap();
        assert_eq!(ch.finish_offset(500), 600);

        let ch = ChannelPulse::new(ChannelId::Two, 4.0, 100, 250).unwrap();
        assert_eq!(ch.finish_offset(500), 350);
    }

    #[test]
    fn rejects_offsets_past_u64() {
        assert_eq!(
            ChannelPulse::new(ChannelId::One, 4.0, u64::MAX, 1),
            Err(PulseError::OffsetOverflow {
                delay: u64::MAX,
                duration: 1
            })
        );
        assert!(ChannelPulse::new(ChannelId::One, 4.0, u64::MAX - 1, 1).is_ok());
    }

    #[test]
    fn default_duration_saturates_finish_offset() {
        let ch = ChannelPulse::new(ChannelId::Two, 4.0, u64::MAX, 0).unwrap();
        assert_eq!(ch.finish_offset(500), u64::MAX);
    }

    #[test]
    fn rejects_negative_and_nan_flow() {
        assert_eq!(
            ChannelPulse::with_flow(ChannelId::One, -1.0),
            Err(PulseError::InvalidFlow(-1.0))
        );
        assert!(ChannelPulse::with_flow(ChannelId::One, f64::NAN).is_err());
        assert!(ChannelPulse::with_flow(ChannelId::One, f64::INFINITY).is_err());
        assert!(ChannelPulse::with_flow(ChannelId::One, 0.0).is_ok());
    }

    #[test]
    fn renders_expression_segments() {
        let plain = ChannelPulse::with_flow(ChannelId::One, 4.0).unwrap();
        assert_eq!(plain.to_string(), "1=4");

        let full = ChannelPulse::new(ChannelId::Two, 2.5, 150, 300).unwrap();
        assert_eq!(full.to_string(), "2=[150]2.5x300");

        let delayed = ChannelPulse::new(ChannelId::Two, 1.0, 40, 0).unwrap();
        assert_eq!(delayed.to_string(), "2=[40]1");
    }

    #[test]
    fn channel_id_from_number() {
        assert_eq!(ChannelId::try_from(1), Ok(ChannelId::One));
        assert_eq!(ChannelId::try_from(2), Ok(ChannelId::Two));
        assert!(ChannelId::try_from(3).is_err());
    }
}
