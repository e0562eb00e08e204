//! Connection lifecycle tracking.
//!
//! A connection opens on its first SYN and closes on the first RST, or on
//! the first ACK seen strictly after its first FIN+ACK. Connections are keyed
//! by the directional 4-tuple, so the SYN-ACK of a handshake opens a second
//! record for the reverse direction.
//!
//! The ACK-after-FIN+ACK rule cannot tell a late ACK on a reused 4-tuple
//! from the final ACK of the original connection; such an ACK closes it.

use ahash::AHashMap;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::config::AttackWindow;
use crate::decode::{DecodedPacket, TcpFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ConnectionId {
    pub fn for_packet(packet: &DecodedPacket) -> Option<Self> {
        let seg = packet.tcp?;
        Some(ConnectionId {
            src: packet.src_addr?,
            dst: packet.dst_addr?,
            src_port: seg.src_port,
            dst_port: seg.dst_port,
        })
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

/// Why a connection's end time was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Reset,
    FinAck,
}

/// Lifecycle of one connection. Times are offsets from the first frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub start_time: f64,
    pub fin_ack_time: Option<f64>,
    pub end_time: Option<f64>,
    pub close_reason: Option<CloseReason>,
}

impl ConnectionRecord {
    fn observe(&mut self, flags: TcpFlags, offset: f64) {
        if self.end_time.is_some() {
            return;
        }
        if flags.fin() && flags.ack() && self.fin_ack_time.is_none() {
            self.fin_ack_time = Some(offset);
        }
        if flags.rst() {
            self.close(offset, CloseReason::Reset);
            return;
        }
        if flags.ack() {
            if let Some(fin_ack) = self.fin_ack_time {
                if offset > fin_ack {
                    self.close(offset, CloseReason::FinAck);
                }
            }
        }
    }

    fn close(&mut self, offset: f64, reason: CloseReason) {
        self.end_time = Some(offset);
        self.close_reason = Some(reason);
    }
}

/// A finished record with its resolved duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedConnection {
    pub id: ConnectionId,
    pub start_time: f64,
    pub duration: f64,
    /// `None` when the connection was never seen closing and `duration` is
    /// the configured default.
    pub close_reason: Option<CloseReason>,
}

/// Insertion-ordered table of connections seen in one capture.
#[derive(Debug, Default, Clone)]
pub struct ConnectionTable {
    index: AHashMap<ConnectionId, usize>,
    records: Vec<ConnectionRecord>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Apply one TCP packet. Packets for connections without a SYN yet are
    /// ignored.
    pub fn observe(&mut self, id: ConnectionId, flags: TcpFlags, offset: f64) {
        let slot = match self.index.get(&id) {
            Some(&slot) => slot,
            None if flags.syn() => {
                let slot = self.records.len();
                self.records.push(ConnectionRecord {
                    id,
                    start_time: offset,
                    fin_ack_time: None,
                    end_time: None,
                    close_reason: None,
                });
                self.index.insert(id, slot);
                tracing::trace!(connection = %id, offset, "connection opened");
                slot
            }
            None => return,
        };
        self.records[slot].observe(flags, offset);
    }

    /// Resolve durations in the order connections were opened.
    pub fn close_connections(&self, default_duration: f64) -> Vec<ClosedConnection> {
        self.records
            .iter()
            .map(|record| ClosedConnection {
                id: record.id,
                start_time: record.start_time,
                duration: record
                    .end_time
                    .map_or(default_duration, |end| end - record.start_time),
                close_reason: record.close_reason,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub connections: u64,
    pub closed: u64,
    pub reset: u64,
    pub unclosed: u64,
    pub mean_duration: f64,
}

impl ConnectionStats {
    fn tally<'a>(connections: impl Iterator<Item = &'a ClosedConnection>) -> Self {
        let mut stats = ConnectionStats::default();
        let mut duration_sum = 0.0;
        for conn in connections {
            stats.connections += 1;
            duration_sum += conn.duration;
            match conn.close_reason {
                Some(CloseReason::FinAck) => stats.closed += 1,
                Some(CloseReason::Reset) => stats.reset += 1,
                None => stats.unclosed += 1,
            }
        }
        if stats.connections > 0 {
            stats.mean_duration = duration_sum / stats.connections as f64;
        }
        stats
    }
}

/// Counts over all connections, split around the attack window when one is
/// configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub all: ConnectionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_window: Option<AttackWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub during_attack: Option<ConnectionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_attack: Option<ConnectionStats>,
}

impl ConnectionSummary {
    pub fn new(connections: &[ClosedConnection], window: Option<AttackWindow>) -> Self {
        let all = ConnectionStats::tally(connections.iter());
        match window {
            Some(w) => ConnectionSummary {
                all,
                attack_window: Some(w),
                during_attack: Some(ConnectionStats::tally(
                    connections.iter().filter(|c| w.contains(c.start_time)),
                )),
                outside_attack: Some(ConnectionStats::tally(
                    connections.iter().filter(|c| !w.contains(c.start_time)),
                )),
            },
            None => ConnectionSummary {
                all,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn id(port: u16) -> ConnectionId {
        ConnectionId {
            src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: port,
            dst_port: 80,
        }
    }

    const SYN: TcpFlags = TcpFlags::SYN;
    const ACK: TcpFlags = TcpFlags::ACK;

    fn fin_ack() -> TcpFlags {
        TcpFlags::FIN | TcpFlags::ACK
    }

    #[test]
    fn ack_after_fin_ack_closes() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 0.0);
        table.observe(id(1), fin_ack(), 10.0);
        table.observe(id(1), ACK, 10.5);
        let closed = table.close_connections(100.0);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration, 10.5);
        assert_eq!(closed[0].close_reason, Some(CloseReason::FinAck));
    }

    #[test]
    fn unclosed_gets_default_duration() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 0.0);
        table.observe(id(1), ACK, 3.0);
        let closed = table.close_connections(100.0);
        assert_eq!(closed[0].duration, 100.0);
        assert_eq!(closed[0].close_reason, None);
    }

    #[test]
    fn ack_before_fin_ack_is_ignored() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 1.0);
        table.observe(id(1), ACK, 2.0);
        table.observe(id(1), fin_ack(), 4.0);
        let record = table.get(&id(1)).unwrap();
        assert_eq!(record.end_time, None);
        assert_eq!(record.fin_ack_time, Some(4.0));
    }

    #[test]
    fn fin_ack_alone_does_not_close() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 0.0);
        table.observe(id(1), fin_ack(), 5.0);
        // Same instant: not strictly after.
        table.observe(id(1), ACK, 5.0);
        assert_eq!(table.get(&id(1)).unwrap().end_time, None);
    }

    #[test]
    fn reset_closes_and_first_close_wins() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 2.0);
        table.observe(id(1), TcpFlags::RST, 3.5);
        table.observe(id(1), TcpFlags::RST, 9.0);
        let closed = table.close_connections(100.0);
        assert_eq!(closed[0].duration, 1.5);
        assert_eq!(closed[0].close_reason, Some(CloseReason::Reset));
    }

    #[test]
    fn packets_before_syn_are_ignored() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), fin_ack(), 1.0);
        table.observe(id(1), ACK, 2.0);
        assert!(table.get(&id(1)).is_none());
        table.observe(id(1), SYN, 3.0);
        table.observe(id(1), ACK, 4.0);
        assert_eq!(table.close_connections(100.0)[0].duration, 100.0);
    }

    #[test]
    fn repeated_syn_keeps_first_start() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 1.0);
        table.observe(id(1), SYN, 4.0);
        assert_eq!(table.get(&id(1)).unwrap().start_time, 1.0);
    }

    #[test]
    fn results_follow_open_order() {
        let mut table = ConnectionTable::new();
        table.observe(id(3), SYN, 0.0);
        table.observe(id(1), SYN, 1.0);
        table.observe(id(2), SYN, 2.0);
        let ports: Vec<u16> = table
            .close_connections(100.0)
            .iter()
            .map(|c| c.id.src_port)
            .collect();
        assert_eq!(ports, vec![3, 1, 2]);
    }

    #[test]
    fn summary_splits_on_attack_window() {
        let mut table = ConnectionTable::new();
        table.observe(id(1), SYN, 5.0);
        table.observe(id(1), TcpFlags::RST, 6.0);
        table.observe(id(2), SYN, 30.0);
        table.observe(id(3), SYN, 40.0);
        table.observe(id(3), fin_ack(), 41.0);
        table.observe(id(3), ACK, 42.0);
        let closed = table.close_connections(100.0);
        let summary = ConnectionSummary::new(
            &closed,
            Some(AttackWindow {
                start: 20.0,
                end: 120.0,
            }),
        );
        assert_eq!(summary.all.connections, 3);
        assert_eq!(summary.all.reset, 1);
        assert_eq!(summary.all.closed, 1);
        assert_eq!(summary.all.unclosed, 1);
        assert_eq!(summary.all.mean_duration, (1.0 + 100.0 + 2.0) / 3.0);
        let during = summary.during_attack.unwrap();
        assert_eq!(during.connections, 2);
        assert_eq!(during.unclosed, 1);
        assert_eq!(summary.outside_attack.unwrap().connections, 1);
    }

    #[test]
    fn summary_without_window() {
        let summary = ConnectionSummary::new(&[], None);
        assert_eq!(summary.all.connections, 0);
        assert_eq!(summary.all.mean_duration, 0.0);
        assert!(summary.during_attack.is_none());
    }
}
