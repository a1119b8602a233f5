//! Reader for the pulse expression language.
//!
//! ```text
//! pulse        := channel_expr ("," channel_expr)?
//! channel_expr := channel_id "=" channel_body
//! channel_id   := "1" | "2"
//! channel_body := ("[" delay_ms "]")? flow ("x" duration_ms)?
//! ```
//!
//! `1=4` opens channel 1 at flow 4 for the default duration,
//! `2=[100]4x250` opens channel 2 at flow 4, 100 ms after onset, for 250 ms.

use crate::channel::{ChannelId, ChannelPulse};
use crate::error::ParseError;
use crate::pulse::Pulse;

/// Parses a single pulse expression. Either the whole expression is accepted
/// or an error naming the offending fragment is returned.
pub fn parse(text: &str) -> Result<Pulse, ParseError> {
    let input = text.trim();
    let parts: Vec<&str> = if input.is_empty() {
        Vec::new()
    } else {
        input.split(',').map(str::trim).collect()
    };
    if parts.is_empty() || parts.len() > 2 {
        return Err(ParseError::ChannelCount {
            input: input.to_string(),
            count: parts.len(),
        });
    }

    let mut slots: [Option<ChannelPulse>; 2] = [None, None];
    for part in parts {
        let channel = parse_channel(part)?;
        let slot = &mut slots[usize::from(channel.id.number() - 1)];
        if slot.is_some() {
            return Err(ParseError::DuplicateChannel(part.to_string()));
        }
        *slot = Some(channel);
    }

    let [channel1, channel2] = slots;
    Pulse::new(channel1, channel2).map_err(|source| ParseError::InvalidPulse {
        input: input.to_string(),
        source,
    })
}

/// Parses a whitespace separated list of pulse expressions. The first bad
/// expression fails the whole batch.
pub fn parse_batch(text: &str) -> Result<Vec<Pulse>, ParseError> {
    text.split_whitespace().map(parse).collect()
}

fn parse_channel(expr: &str) -> Result<ChannelPulse, ParseError> {
    let (id, body) = expr
        .split_once('=')
        .ok_or_else(|| ParseError::MalformedChannel(expr.to_string()))?;
    let id = match id {
        "1" => ChannelId::One,
        "2" => ChannelId::Two,
        _ => return Err(ParseError::InvalidChannelId(expr.to_string())),
    };
    let (flow, delay, duration) =
        parse_body(body).ok_or_else(|| ParseError::MalformedChannel(expr.to_string()))?;
    ChannelPulse::new(id, flow, delay, duration).map_err(|source| ParseError::InvalidPulse {
        input: expr.to_string(),
        source,
    })
}

fn parse_body(body: &str) -> Option<(f64, u64, u64)> {
    let (delay, rest) = match body.strip_prefix('[') {
        Some(inner) => {
            let (delay, rest) = inner.split_once(']')?;
            (parse_millis(delay)?, rest)
        }
        None => (0, body),
    };
    let (flow, duration) = match rest.split_once('x') {
        Some((flow, duration)) => (flow, parse_millis(duration)?),
        None => (rest, 0),
    };
    Some((parse_flow(flow)?, delay, duration))
}

fn parse_millis(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// f64::from_str also takes signs, exponents and "inf"; only plain decimals are valid here.
fn parse_flow(s: &str) -> Option<f64> {
    let digits = s.bytes().filter(u8::is_ascii_digit).count();
    let dots = s.bytes().filter(|&b| b == b'.').count();
    if digits == 0 || dots > 1 || digits + dots != s.len() {
        return None;
    }
    s.parse().ok()
}
