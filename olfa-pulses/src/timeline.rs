//! Conversion of a [`Pulse`] into the ordered list of instants at which valve
//! states change.
//!
//! Every channel contributes a start and an end event. Events that share an
//! offset are merged into one [`TimelineNode`], so node offsets are strictly
//! increasing. The set of channels still flowing at a node is not stored; it
//! is recomputed by replaying the chain up to that node, see
//! [`Timeline::ongoing_at`].

use std::time::Duration;

use olfa_core::{ChannelId, ChannelPulse, Pulse};
use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Start,
    End,
}

/// A single channel opening or closing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelEvent {
    pub offset: u64,
    pub channel: ChannelPulse,
    pub kind: EventKind,
}

/// All channel events happening at one offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineNode {
    pub offset: u64,
    pub starting: Vec<ChannelPulse>,
    pub ending: Vec<ChannelPulse>,
    /// Seconds since the previous node, 0 for the first one.
    pub interval: f64,
}

impl TimelineNode {
    fn new(offset: u64, previous_offset: u64) -> Self {
        Self {
            offset,
            starting: Vec::new(),
            ending: Vec::new(),
            interval: (offset - previous_offset) as f64 / 1000.0,
        }
    }

    /// Time between `origin` and this node. Offsets before `origin` count as zero.
    pub fn since(&self, origin: u64) -> Duration {
        Duration::from_millis(self.offset.saturating_sub(origin))
    }
}

/// State change reported when a timeline node fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PulseStateChanged {
    /// Position of the node in the timeline.
    pub index: usize,
    pub offset_ms: u64,
    /// Channels opening at this node.
    pub starting: Vec<ChannelPulse>,
    /// Channels opened at an earlier node that keep flowing past this one.
    pub ongoing: Vec<ChannelPulse>,
    pub is_last: bool,
}

impl PulseStateChanged {
    /// Channels whose valves must be open from this node on.
    pub fn active_channels(&self) -> impl Iterator<Item = &ChannelPulse> {
        self.ongoing.iter().chain(self.starting.iter())
    }

    pub fn is_active(&self, id: ChannelId) -> bool {
        self.active_channels().any(|ch| ch.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    nodes: Vec<TimelineNode>,
}

impl Timeline {
    /// Start and end events of every channel, ordered by offset. Events at the
    /// same offset keep their emission order: channel 1 before channel 2,
    /// start before end.
    pub fn events(pulse: &Pulse, default_duration_ms: u64) -> Vec<ChannelEvent> {
        let mut events: Vec<ChannelEvent> = pulse
            .channels()
            .flat_map(|ch| {
                [
                    ChannelEvent {
                        offset: ch.delay,
                        channel: *ch,
                        kind: EventKind::Start,
                    },
                    ChannelEvent {
                        offset: ch.finish_offset(default_duration_ms),
                        channel: *ch,
                        kind: EventKind::End,
                    },
                ]
            })
            .collect();
        events.sort_by_key(|ev| ev.offset);
        events
    }

    pub fn build(pulse: &Pulse, default_duration_ms: u64) -> Self {
        let mut nodes: Vec<TimelineNode> = Vec::with_capacity(4);
        for ev in Self::events(pulse, default_duration_ms) {
            let previous = nodes.last().map(|n| n.offset);
            if previous != Some(ev.offset) {
                nodes.push(TimelineNode::new(ev.offset, previous.unwrap_or(ev.offset)));
            }
            if let Some(node) = nodes.last_mut() {
                match ev.kind {
                    EventKind::Start => node.starting.push(ev.channel),
                    EventKind::End => node.ending.push(ev.channel),
                }
            }
        }
        trace!(pulse = %pulse, nodes = nodes.len(), "built timeline");
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TimelineNode] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&TimelineNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Offset of the final node, i.e. when every valve is closed again.
    pub fn end_offset(&self) -> u64 {
        self.nodes.last().map_or(0, |n| n.offset)
    }

    /// Channels that keep flowing through node `index`: every start before
    /// it, minus every end up to and including it. Channels starting at the
    /// node itself are not counted.
    pub fn ongoing_at(&self, index: usize) -> Vec<ChannelPulse> {
        let mut active: Vec<ChannelPulse> = Vec::with_capacity(2);
        for node in self.nodes.iter().take(index) {
            for ch in &node.starting {
                if !active.iter().any(|a| a.id == ch.id) {
                    active.push(*ch);
                }
            }
            for ch in &node.ending {
                active.retain(|a| a.id != ch.id);
            }
        }
        if let Some(node) = self.nodes.get(index) {
            for ch in &node.ending {
                active.retain(|a| a.id != ch.id);
            }
        }
        active.sort_by_key(|ch| ch.id);
        active
    }

    pub fn notification(&self, index: usize) -> Option<PulseStateChanged> {
        let node = self.nodes.get(index)?;
        Some(PulseStateChanged {
            index,
            offset_ms: node.offset,
            starting: node.starting.clone(),
            ongoing: self.ongoing_at(index),
            is_last: index + 1 == self.nodes.len(),
        })
    }

    pub fn notifications(&self) -> impl Iterator<Item = PulseStateChanged> + '_ {
        (0..self.nodes.len()).filter_map(|i| self.notification(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(channels: &[ChannelPulse]) -> Vec<u8> {
        channels.iter().map(|ch| ch.id.number()).collect()
    }

    fn timeline(text: &str, default_ms: u64) -> Timeline {
        Timeline::build(&text.parse().unwrap(), default_ms)
    }

    #[test]
    fn single_channel_has_two_nodes() {
        let t = timeline("1=4", 500);
        assert_eq!(t.len(), 2);
        assert_eq!(t.nodes()[0].offset, 0);
        assert_eq!(t.nodes()[1].offset, 500);
        assert_eq!(t.nodes()[1].interval, 0.5);
    }

    #[test]
    fn disjoint_offsets_give_four_nodes() {
        let t = timeline("1=4x300,2=[100]4x300", 1000);
        let offsets: Vec<u64> = t.nodes().iter().map(|n| n.offset).collect();
        assert_eq!(offsets, vec![0, 100, 300, 400]);
    }

    #[test]
    fn simultaneous_events_merge() {
        let t = timeline("1=4x200,2=[100]4x100", 1000);
        assert_eq!(t.len(), 3);

        let nodes = t.nodes();
        assert_eq!(nodes[0].offset, 0);
        assert_eq!(ids(&nodes[0].starting), vec![1]);
        assert_eq!(nodes[1].offset, 100);
        assert_eq!(ids(&nodes[1].starting), vec![2]);
        assert_eq!(nodes[2].offset, 200);
        assert_eq!(ids(&nodes[2].ending), vec![1, 2]);
        assert!(nodes[2].starting.is_empty());
    }

    #[test]
    fn both_undelayed_channels_share_start_node() {
        let t = timeline("1=4,2=2x300", 300);
        assert_eq!(t.len(), 2);
        assert_eq!(ids(&t.nodes()[0].starting), vec![1, 2]);
        assert_eq!(ids(&t.nodes()[1].ending), vec![1, 2]);
    }

    #[test]
    fn ongoing_set_is_replayed() {
        let t = timeline("1=4x200,2=[100]4x100", 1000);
        let n: Vec<PulseStateChanged> = t.notifications().collect();

        assert!(n[0].ongoing.is_empty());
        assert_eq!(ids(&n[0].starting), vec![1]);
        assert!(!n[0].is_last);

        assert_eq!(ids(&n[1].ongoing), vec![1]);
        assert_eq!(ids(&n[1].starting), vec![2]);

        assert!(n[2].ongoing.is_empty());
        assert!(n[2].starting.is_empty());
        assert!(n[2].is_last);
    }

    #[test]
    fn single_channel_is_not_ongoing_at_its_end() {
        let t = timeline("1=4", 500);
        let end = t.notification(1).unwrap();
        assert!(end.ongoing.is_empty());
        assert!(end.starting.is_empty());
        assert_eq!(end.active_channels().count(), 0);
        assert!(end.is_last);
    }

    #[test]
    fn staggered_channels_close_one_after_the_other() {
        let t = timeline("1=4x300,2=[100]4x300", 1000);

        let first_end = t.notification(2).unwrap();
        assert_eq!(first_end.offset_ms, 300);
        assert_eq!(ids(&first_end.ongoing), vec![2]);
        assert!(!first_end.is_active(ChannelId::One));

        let second_end = t.notification(3).unwrap();
        assert_eq!(second_end.offset_ms, 400);
        assert!(second_end.ongoing.is_empty());
        assert!(second_end.is_last);
    }

    #[test]
    fn channel_ending_before_other_starts_is_not_ongoing() {
        let t = timeline("1=4x100,2=[300]4x100", 1000);
        let n = t.notification(2).unwrap();
        assert_eq!(n.offset_ms, 300);
        assert!(n.ongoing.is_empty());
        assert_eq!(ids(&n.starting), vec![2]);
        assert!(n.is_active(ChannelId::Two));
        assert!(!n.is_active(ChannelId::One));
    }

    #[test]
    fn intervals_are_seconds_between_nodes() {
        let t = timeline("1=4x200,2=[100]4x100", 1000);
        let intervals: Vec<f64> = t.nodes().iter().map(|n| n.interval).collect();
        assert_eq!(intervals, vec![0.0, 0.1, 0.1]);
    }

    #[test]
    fn offsets_strictly_increase() {
        for text in ["1=4", "2=[50]1", "1=4x10,2=[5]1x5", "1=1x100,2=[100]1x100", "1=2,2=3"] {
            let t = timeline(text, 100);
            assert!(
                t.nodes().windows(2).all(|w| w[0].offset < w[1].offset),
                "{text}"
            );
        }
    }

    #[test]
    fn default_duration_only_applies_without_explicit_one() {
        let t = timeline("1=4,2=[100]4x50", 1000);
        assert_eq!(t.end_offset(), 1000);
        let offsets: Vec<u64> = t.nodes().iter().map(|n| n.offset).collect();
        assert_eq!(offsets, vec![0, 100, 150, 1000]);
    }

    #[test]
    fn out_of_range_notification_is_none() {
        assert!(timeline("1=4", 100).notification(2).is_none());
    }
}
