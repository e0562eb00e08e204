use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::config::FlowKeyGranularity;
use crate::decode::DecodedPacket;

/// Directional flow identity used for duplicate detection. Unlike a
/// connection table key, `src` and `dst` are not normalized: the two halves
/// of a conversation are separate flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowKey {
    HostPair {
        src: IpAddr,
        dst: IpAddr,
    },
    Connection {
        src: IpAddr,
        dst: IpAddr,
        src_port: u16,
        dst_port: u16,
    },
}

impl FlowKey {
    /// Key for a TCP packet, or `None` when the packet did not decode to
    /// TCP.
    pub fn for_packet(packet: &DecodedPacket, granularity: FlowKeyGranularity) -> Option<Self> {
        let seg = packet.tcp?;
        let (src, dst) = (packet.src_addr?, packet.dst_addr?);
        Some(match granularity {
            FlowKeyGranularity::HostPair => FlowKey::HostPair { src, dst },
            FlowKeyGranularity::Connection => FlowKey::Connection {
                src,
                dst,
                src_port: seg.src_port,
                dst_port: seg.dst_port,
            },
        })
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKey::HostPair { src, dst } => write!(f, "{} -> {}", src, dst),
            FlowKey::Connection {
                src,
                dst,
                src_port,
                dst_port,
            } => write!(f, "{}:{} -> {}:{}", src, src_port, dst, dst_port),
        }
    }
}

/// Outcome of classifying one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentClass {
    /// First time this sequence number was seen on the flow.
    Original,
    /// The sequence number was already seen on the flow.
    Duplicate,
}

/// Per-flow sets of observed sequence numbers.
///
/// Grows with the number of distinct (flow, sequence number) pairs and is
/// dropped with the aggregator at the end of a file.
#[derive(Debug, Default, Clone)]
pub struct RetransmissionTracker {
    seen: AHashMap<FlowKey, AHashSet<u32>>,
    total: u64,
    duplicates: u64,
}

impl RetransmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, key: FlowKey, sequence_number: u32) -> SegmentClass {
        self.total += 1;
        if self.seen.entry(key).or_default().insert(sequence_number) {
            SegmentClass::Original
        } else {
            self.duplicates += 1;
            SegmentClass::Duplicate
        }
    }

    /// Segments classified so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Distinct (flow, sequence number) pairs.
    pub fn unique(&self) -> u64 {
        self.total - self.duplicates
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn flows(&self) -> usize {
        self.seen.len()
    }

    /// `(total - unique) / total`, zero for an empty tracker.
    pub fn loss_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.total as f64
        }
    }
}
