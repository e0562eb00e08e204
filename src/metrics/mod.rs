//! Metrics aggregator.
//!
//! One [`Aggregator`] consumes the decoded packets of a single capture in
//! one linear pass and owns every piece of per-file state: retransmission
//! sets, running sums, the raw series and (in lifecycle mode) the
//! connection table. Nothing outlives [`Aggregator::into_analysis`].

pub mod series;

use serde::Serialize;

use crate::capture::RawFrame;
use crate::config::{AnalysisConfig, GoodputNormalization, LifecycleConfig, RateUnit};
use crate::decode::{self, DecodedPacket};
use crate::flow::{FlowKey, RetransmissionTracker, SegmentClass};
use crate::lifecycle::{ClosedConnection, ConnectionId, ConnectionSummary, ConnectionTable};
use crate::protocol::LinkType;

pub use series::{bin, SeriesPoint, TimeBin, TrafficSeries, TrafficSlot};

/// Final numbers for one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    /// Every frame handed to the aggregator, filtered or not.
    pub total_frames: u64,
    /// TCP segments classified for retransmission.
    pub total_packets: u64,
    pub unique_packets: u64,
    pub retransmissions: u64,
    pub total_frame_bits: u64,
    /// Payload bits of first occurrences only.
    pub total_payload_bits: u64,
    /// Seconds between the earliest and latest counted frame.
    pub observed_duration: f64,
    /// Seconds between the earliest and latest frame of the file, filtered
    /// frames included.
    pub capture_duration: f64,
    pub throughput: f64,
    pub goodput: f64,
    pub rate_unit: RateUnit,
    pub goodput_normalization: GoodputNormalization,
    pub loss_ratio: f64,
    pub peak_window: u16,
    pub max_payload: u64,
    pub max_frame: u64,
    /// Frames rejected by the port or payload filter.
    pub filtered_frames: u64,
    /// Frames whose wire length exceeds the captured bytes.
    pub snaplen_truncated: u64,
    /// Distinct flows seen by the retransmission tracker.
    pub flows: u64,
}

impl Metrics {
    pub fn loss_percent(&self) -> f64 {
        self.loss_ratio * 100.0
    }

    pub fn goodput_label(&self) -> &'static str {
        match self.goodput_normalization {
            GoodputNormalization::Rate => self.rate_unit.label(),
            GoodputNormalization::Megabits => "Mb",
        }
    }

    pub fn counted_frames(&self) -> u64 {
        self.total_frames - self.filtered_frames
    }
}

/// Time series handed to the plotting side.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub bin_duration: f64,
    /// Binned frame rate at bin midpoints.
    pub throughput: Vec<SeriesPoint>,
    /// Binned first-occurrence payload rate at bin midpoints.
    pub goodput: Vec<SeriesPoint>,
    /// Advertised window of every counted TCP segment.
    pub window: Vec<SeriesPoint>,
    pub traffic_interval: f64,
    pub traffic: Vec<TrafficSlot>,
}

/// Everything produced for one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub metrics: Metrics,
    pub series: Series,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<ClosedConnection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_summary: Option<ConnectionSummary>,
}

pub struct Aggregator {
    analysis: AnalysisConfig,
    lifecycle: LifecycleConfig,
    first_seen_time: Option<f64>,
    retransmissions: RetransmissionTracker,
    connections: Option<ConnectionTable>,

    total_frames: u64,
    filtered_frames: u64,
    snaplen_truncated: u64,
    capture_span: Option<(f64, f64)>,
    total_frame_bits: u64,
    total_payload_bits: u64,
    span: Option<(f64, f64)>,
    peak_window: u16,
    max_payload: usize,
    max_frame: usize,

    throughput_points: Vec<SeriesPoint>,
    goodput_points: Vec<SeriesPoint>,
    window_points: Vec<SeriesPoint>,
    traffic: TrafficSeries,
}

impl Aggregator {
    pub fn new(analysis: AnalysisConfig, lifecycle: LifecycleConfig) -> Self {
        let connections = lifecycle.enabled.then(ConnectionTable::new);
        let traffic = TrafficSeries::new(analysis.traffic_interval);
        Aggregator {
            analysis,
            lifecycle,
            first_seen_time: None,
            retransmissions: RetransmissionTracker::new(),
            connections,
            total_frames: 0,
            filtered_frames: 0,
            snaplen_truncated: 0,
            capture_span: None,
            total_frame_bits: 0,
            total_payload_bits: 0,
            span: None,
            peak_window: 0,
            max_payload: 0,
            max_frame: 0,
            throughput_points: Vec::new(),
            goodput_points: Vec::new(),
            window_points: Vec::new(),
            traffic,
        }
    }

    /// Capture time of the first frame, once one has been seen.
    pub fn first_seen_time(&self) -> Option<f64> {
        self.first_seen_time
    }

    /// Decode `frame` relative to the first frame of the pass and ingest it.
    pub fn ingest_frame(&mut self, frame: &RawFrame, link: LinkType) {
        let first = *self.first_seen_time.get_or_insert(frame.capture_time);
        if frame.wire_length as usize > frame.bytes.len() {
            self.snaplen_truncated += 1;
        }
        let packet = decode::decode(frame, link, first);
        self.ingest(&packet);
    }

    fn passes_filters(&self, packet: &DecodedPacket) -> bool {
        if !self.analysis.filters_frames() {
            return true;
        }
        let Some(seg) = packet.tcp else {
            return false;
        };
        if let Some(port) = self.analysis.destination_port {
            if seg.dst_port != port {
                return false;
            }
        }
        !self.analysis.require_nonzero_payload || packet.payload_length() > 0
    }

    pub fn ingest(&mut self, packet: &DecodedPacket) {
        let t = packet.offset_seconds;
        self.total_frames += 1;
        widen(&mut self.capture_span, t);
        if !self.passes_filters(packet) {
            self.filtered_frames += 1;
            return;
        }
        widen(&mut self.span, t);

        let frame_bits = packet.frame_length as u64 * 8;
        self.total_frame_bits += frame_bits;
        self.max_frame = self.max_frame.max(packet.frame_length);
        self.throughput_points
            .push(SeriesPoint::new(t, frame_bits as f64));
        self.traffic.add(t, packet.frame_length);

        let Some(seg) = packet.tcp else {
            self.goodput_points.push(SeriesPoint::new(t, 0.0));
            return;
        };

        self.peak_window = self.peak_window.max(seg.advertised_window);
        self.max_payload = self.max_payload.max(packet.payload_length());
        self.window_points
            .push(SeriesPoint::new(t, f64::from(seg.advertised_window)));

        let class = FlowKey::for_packet(packet, self.analysis.flow_key)
            .map(|key| self.retransmissions.classify(key, seg.sequence_number));
        let good_bits = match class {
            Some(SegmentClass::Original) => seg.payload_length as u64 * 8,
            _ => 0,
        };
        self.total_payload_bits += good_bits;
        self.goodput_points.push(SeriesPoint::new(t, good_bits as f64));

        if let Some(table) = self.connections.as_mut() {
            if let Some(id) = ConnectionId::for_packet(packet) {
                table.observe(id, seg.flags, t);
            }
        }
    }

    pub fn observed_duration(&self) -> f64 {
        self.span.map_or(0.0, |(lo, hi)| hi - lo)
    }

    pub fn capture_duration(&self) -> f64 {
        self.capture_span.map_or(0.0, |(lo, hi)| hi - lo)
    }

    pub fn finalize(&self) -> Metrics {
        let duration = self.observed_duration();
        let unit = self.analysis.rate_unit;
        let rate = |bits: u64| {
            if duration > 0.0 {
                unit.scale(bits as f64 / duration)
            } else {
                0.0
            }
        };
        let normalization = self.analysis.goodput_normalization;
        let goodput = match normalization {
            GoodputNormalization::Rate => rate(self.total_payload_bits),
            GoodputNormalization::Megabits => self.total_payload_bits as f64 / 1_000_000.0,
        };

        Metrics {
            total_frames: self.total_frames,
            total_packets: self.retransmissions.total(),
            unique_packets: self.retransmissions.unique(),
            retransmissions: self.retransmissions.duplicates(),
            total_frame_bits: self.total_frame_bits,
            total_payload_bits: self.total_payload_bits,
            observed_duration: duration,
            capture_duration: self.capture_duration(),
            throughput: rate(self.total_frame_bits),
            goodput,
            rate_unit: unit,
            goodput_normalization: normalization,
            loss_ratio: self.retransmissions.loss_ratio(),
            peak_window: self.peak_window,
            max_payload: self.max_payload as u64,
            max_frame: self.max_frame as u64,
            filtered_frames: self.filtered_frames,
            snaplen_truncated: self.snaplen_truncated,
            flows: self.retransmissions.flows() as u64,
        }
    }

    pub fn series(&self) -> Series {
        let d = self.analysis.bin_duration;
        let unit = self.analysis.rate_unit;
        Series {
            bin_duration: d,
            throughput: series::rate_series(&bin(&self.throughput_points, d), d, unit),
            goodput: series::rate_series(&bin(&self.goodput_points, d), d, unit),
            window: self.window_points.clone(),
            traffic_interval: self.traffic.interval(),
            traffic: self.traffic.slots(),
        }
    }

    /// Per-connection durations, or `None` outside lifecycle mode.
    pub fn close_connections(&self) -> Option<Vec<ClosedConnection>> {
        self.connections
            .as_ref()
            .map(|table| table.close_connections(self.lifecycle.default_unclosed_duration))
    }

    pub fn into_analysis(self) -> Analysis {
        let metrics = self.finalize();
        let series = self.series();
        let connections = self.close_connections();
        let connection_summary = connections
            .as_deref()
            .map(|closed| ConnectionSummary::new(closed, self.lifecycle.attack_window));
        Analysis {
            metrics,
            series,
            connections,
            connection_summary,
        }
    }
}

fn widen(span: &mut Option<(f64, f64)>, t: f64) {
    *span = Some(match *span {
        Some((lo, hi)) => (lo.min(t), hi.max(t)),
        None => (t, t),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowKeyGranularity;
    use crate::decode::{Layer, TcpFlags, TcpSegment};
    use crate::protocol::test_frames::TcpFrame;
    use std::net::{IpAddr, Ipv4Addr};

    fn tcp(t: f64, seq: u32, payload: usize) -> DecodedPacket {
        tcp_flags(t, seq, payload, TcpFlags::ACK)
    }

    fn tcp_flags(t: f64, seq: u32, payload: usize, flags: TcpFlags) -> DecodedPacket {
        DecodedPacket {
            offset_seconds: t,
            frame_length: 54 + payload,
            layer: Layer::Transport,
            src_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            dst_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
            tcp: Some(TcpSegment {
                src_port: 40000,
                dst_port: 5201,
                sequence_number: seq,
                flags,
                payload_length: payload,
                advertised_window: 1000 + seq as u16,
            }),
        }
    }

    fn raw(t: f64, len: usize) -> DecodedPacket {
        DecodedPacket {
            offset_seconds: t,
            frame_length: len,
            layer: Layer::Raw,
            src_addr: None,
            dst_addr: None,
            tcp: None,
        }
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(AnalysisConfig::default(), LifecycleConfig::default())
    }

    #[test]
    fn empty_input_is_all_zero() {
        let agg = aggregator();
        let m = agg.finalize();
        assert_eq!(m.total_frames, 0);
        assert_eq!(m.throughput, 0.0);
        assert_eq!(m.goodput, 0.0);
        assert_eq!(m.loss_ratio, 0.0);
        let s = agg.series();
        assert!(s.throughput.is_empty());
        assert!(s.goodput.is_empty());
        assert!(s.traffic.is_empty());
        assert!(agg.close_connections().is_none());
    }

    #[test]
    fn duplicate_sequence_halves_unique() {
        let mut agg = aggregator();
        agg.ingest(&tcp(0.0, 100, 50));
        agg.ingest(&tcp(1.0, 100, 50));
        let m = agg.finalize();
        assert_eq!(m.total_packets, 2);
        assert_eq!(m.unique_packets, 1);
        assert_eq!(m.retransmissions, 1);
        assert_eq!(m.loss_ratio, 0.5);
        assert_eq!(m.total_payload_bits, 400);
        assert_eq!(m.total_frame_bits, 2 * 104 * 8);
        assert_eq!(m.observed_duration, 1.0);
        assert_eq!(m.throughput, 1664.0);
        assert_eq!(m.goodput, 400.0);
        assert_eq!(m.max_payload, 50);
        assert_eq!(m.max_frame, 104);
    }

    #[test]
    fn single_packet_has_no_rate() {
        let mut agg = aggregator();
        agg.ingest(&raw(5.0, 100));
        let m = agg.finalize();
        assert_eq!(m.observed_duration, 0.0);
        assert_eq!(m.throughput, 0.0);
        assert_eq!(m.total_frame_bits, 800);
        assert_eq!(agg.series().throughput.len(), 1);
    }

    #[test]
    fn non_tcp_counts_toward_throughput_only() {
        let mut agg = aggregator();
        agg.ingest(&raw(0.0, 60));
        agg.ingest(&tcp(2.0, 1, 10));
        let m = agg.finalize();
        assert_eq!(m.total_frames, 2);
        assert_eq!(m.total_packets, 1);
        assert_eq!(m.total_frame_bits, (60 + 64) * 8);
        assert_eq!(m.total_payload_bits, 80);
        assert_eq!(m.peak_window, 1001);
    }

    #[test]
    fn peak_window_tracks_maximum() {
        let mut agg = aggregator();
        for (i, seq) in [5u32, 40, 12].into_iter().enumerate() {
            agg.ingest(&tcp(i as f64, seq, 0));
        }
        assert_eq!(agg.finalize().peak_window, 1040);
        assert_eq!(agg.series().window.len(), 3);
    }

    #[test]
    fn port_and_payload_filters_exclude_everything() {
        let analysis = AnalysisConfig {
            destination_port: Some(5201),
            require_nonzero_payload: true,
            flow_key: FlowKeyGranularity::Connection,
            ..AnalysisConfig::default()
        };
        let mut agg = Aggregator::new(analysis, LifecycleConfig::default());
        agg.ingest(&raw(0.0, 60));
        agg.ingest(&tcp(1.0, 1, 0));
        let mut other_port = tcp(2.0, 2, 100);
        if let Some(seg) = other_port.tcp.as_mut() {
            seg.dst_port = 80;
        }
        agg.ingest(&other_port);
        agg.ingest(&tcp(3.0, 3, 100));
        agg.ingest(&tcp(5.0, 4, 100));

        let m = agg.finalize();
        assert_eq!(m.total_frames, 5);
        assert_eq!(m.filtered_frames, 3);
        assert_eq!(m.counted_frames(), 2);
        assert_eq!(m.total_packets, 2);
        assert_eq!(m.observed_duration, 2.0);
        assert_eq!(m.capture_duration, 5.0);
        assert_eq!(m.total_frame_bits, 2 * 154 * 8);
    }

    #[test]
    fn mbps_scales_both_rates() {
        let analysis = AnalysisConfig {
            rate_unit: RateUnit::Mbps,
            ..AnalysisConfig::default()
        };
        let mut agg = Aggregator::new(analysis, LifecycleConfig::default());
        agg.ingest(&tcp(0.0, 1, 124_946));
        agg.ingest(&tcp(1.0, 2, 124_946));
        let m = agg.finalize();
        assert_eq!(m.throughput, 2.0);
        assert!((m.goodput - 1.999136).abs() < 1e-9);
    }

    #[test]
    fn megabit_goodput_ignores_duration() {
        let mut agg = Aggregator::new(analysis_mbps_megabits(), LifecycleConfig::default());
        agg.ingest(&tcp(0.0, 1, 1448));
        agg.ingest(&tcp(10.0, 2, 1448));
        let m = agg.finalize();
        assert!((m.goodput - 0.023168).abs() < 1e-12);
        assert_eq!(m.goodput_label(), "Mb");
        assert!((m.throughput - 2.0 * 1502.0 * 8.0 / 10.0 / 1e6).abs() < 1e-12);

        // A single frame still reports its megabits.
        let mut agg = Aggregator::new(analysis_mbps_megabits(), LifecycleConfig::default());
        agg.ingest(&tcp(0.0, 1, 125_000));
        let m = agg.finalize();
        assert_eq!(m.throughput, 0.0);
        assert_eq!(m.goodput, 1.0);
    }

    fn analysis_mbps_megabits() -> AnalysisConfig {
        AnalysisConfig {
            rate_unit: RateUnit::Mbps,
            goodput_normalization: GoodputNormalization::Megabits,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn out_of_order_offsets_keep_duration_positive() {
        let mut agg = aggregator();
        agg.ingest(&tcp(2.0, 1, 100));
        agg.ingest(&tcp(-1.0, 2, 100));
        agg.ingest(&raw(0.5, 60));
        let m = agg.finalize();
        assert_eq!(m.observed_duration, 3.0);
        assert_eq!(m.capture_duration, 3.0);
        assert!(m.throughput > 0.0);
        assert!(m.goodput > 0.0);
        let s = agg.series();
        assert!(s.throughput.iter().all(|p| p.value >= 0.0));
        assert!(s.goodput.iter().all(|p| p.value >= 0.0));
        assert!(s.throughput.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn binned_series_cover_total_bits() {
        let mut agg = aggregator();
        for i in 0..25u32 {
            agg.ingest(&tcp(f64::from(i) * 0.07, i, 100 + i as usize));
        }
        let m = agg.finalize();
        let s = agg.series();
        let binned: f64 = s.throughput.iter().map(|p| p.value * s.bin_duration).sum();
        assert!(binned >= m.total_frame_bits as f64 - 1e-6);
    }

    #[test]
    fn finalize_is_idempotent() {
        let packets: Vec<DecodedPacket> =
            (0..10).map(|i| tcp(f64::from(i) * 0.1, i % 4, 20)).collect();
        let run = || {
            let mut agg = aggregator();
            for p in &packets {
                agg.ingest(p);
            }
            agg.into_analysis()
        };
        let a = run();
        assert_eq!(a, run());
        assert!(a.metrics.unique_packets <= a.metrics.total_packets);
        assert!((0.0..=1.0).contains(&a.metrics.loss_ratio));
    }

    #[test]
    fn lifecycle_mode_closes_connections() {
        let lifecycle = LifecycleConfig {
            enabled: true,
            ..LifecycleConfig::default()
        };
        let mut agg = Aggregator::new(AnalysisConfig::default(), lifecycle);
        agg.ingest(&tcp_flags(0.0, 1, 0, TcpFlags::SYN));
        agg.ingest(&tcp_flags(10.0, 2, 0, TcpFlags::FIN | TcpFlags::ACK));
        agg.ingest(&tcp_flags(10.5, 3, 0, TcpFlags::ACK));
        let analysis = agg.into_analysis();
        let closed = analysis.connections.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration, 10.5);
        let summary = analysis.connection_summary.unwrap();
        assert_eq!(summary.all.closed, 1);
        assert!(summary.during_attack.is_none());
    }

    #[test]
    fn ingest_frame_offsets_from_first_frame() {
        let mut agg = aggregator();
        let frame = |t: f64, seq: u32| RawFrame {
            index: 0,
            capture_time: t,
            wire_length: 0,
            bytes: TcpFrame {
                seq,
                payload_len: 10,
                ..Default::default()
            }
            .ethernet(),
        };
        agg.ingest_frame(&frame(1000.5, 1), LinkType::Ethernet);
        agg.ingest_frame(&frame(1002.0, 2), LinkType::Ethernet);
        assert_eq!(agg.first_seen_time(), Some(1000.5));
        let m = agg.finalize();
        assert_eq!(m.observed_duration, 1.5);
        assert_eq!(m.total_packets, 2);
        assert_eq!(m.total_payload_bits, 160);
        assert_eq!(m.snaplen_truncated, 0);
        assert_eq!(m.flows, 1);
    }

    #[test]
    fn snaplen_cut_frames_are_counted() {
        let mut agg = aggregator();
        let bytes = TcpFrame {
            payload_len: 10,
            ..Default::default()
        }
        .ethernet();
        let full = bytes.len() as u32;
        agg.ingest_frame(
            &RawFrame {
                index: 1,
                capture_time: 10.0,
                wire_length: full,
                bytes: bytes.clone(),
            },
            LinkType::Ethernet,
        );
        agg.ingest_frame(
            &RawFrame {
                index: 2,
                capture_time: 11.0,
                wire_length: full + 1400,
                bytes,
            },
            LinkType::Ethernet,
        );
        assert_eq!(agg.finalize().snaplen_truncated, 1);
    }
}
