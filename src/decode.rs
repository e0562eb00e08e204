//! Frame decoder: turns a [`RawFrame`] into the flat per-packet view the
//! aggregator consumes.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::capture::RawFrame;
use crate::protocol::{self, tcp::flags, LinkType};

/// Deepest layer that decoded successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Raw,
    Link,
    Network,
    Transport,
}

/// The TCP flag bits the analyzer reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(flags::FIN);
    pub const SYN: TcpFlags = TcpFlags(flags::SYN);
    pub const RST: TcpFlags = TcpFlags(flags::RST);
    pub const ACK: TcpFlags = TcpFlags(flags::ACK);

    const MASK: u8 = flags::FIN | flags::SYN | flags::RST | flags::ACK;

    pub fn from_bits(bits: u8) -> Self {
        TcpFlags(bits & Self::MASK)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn syn(self) -> bool {
        self.contains(Self::SYN)
    }

    #[inline]
    pub fn ack(self) -> bool {
        self.contains(Self::ACK)
    }

    #[inline]
    pub fn fin(self) -> bool {
        self.contains(Self::FIN)
    }

    #[inline]
    pub fn rst(self) -> bool {
        self.contains(Self::RST)
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.syn() {
            parts.push("SYN");
        }
        if self.ack() {
            parts.push("ACK");
        }
        if self.fin() {
            parts.push("FIN");
        }
        if self.rst() {
            parts.push("RST");
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// TCP fields of a packet that decoded all the way to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence_number: u32,
    pub flags: TcpFlags,
    pub payload_length: usize,
    pub advertised_window: u16,
}

/// One decoded packet. Lives for a single aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    /// Seconds since the first frame of the pass.
    pub offset_seconds: f64,
    /// Captured bytes of the whole frame.
    pub frame_length: usize,
    pub layer: Layer,
    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub tcp: Option<TcpSegment>,
}

impl DecodedPacket {
    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.tcp.is_some()
    }

    /// Payload bytes above TCP, zero for anything that is not TCP.
    #[inline]
    pub fn payload_length(&self) -> usize {
        self.tcp.map_or(0, |seg| seg.payload_length)
    }
}

/// Decode `frame` against the capture's link type.
///
/// Layer failures never propagate: the packet keeps every layer in front of
/// the damage and reports `is_tcp() == false`.
pub fn decode(frame: &RawFrame, link: LinkType, first_seen_time: f64) -> DecodedPacket {
    let parsed = protocol::parse_frame(link, &frame.bytes);

    if let Some(err) = &parsed.error {
        tracing::trace!(frame = frame.index, error = %err, "frame degraded");
    }

    let layer = if parsed.tcp.is_some() {
        Layer::Transport
    } else if parsed.network.is_some() {
        Layer::Network
    } else if parsed.link_ok {
        Layer::Link
    } else {
        Layer::Raw
    };

    let tcp = parsed.tcp.as_ref().map(|hdr| TcpSegment {
        src_port: hdr.src_port(),
        dst_port: hdr.dst_port(),
        sequence_number: hdr.sequence_number(),
        flags: TcpFlags::from_bits(hdr.flags_raw()),
        payload_length: hdr.payload().len(),
        advertised_window: hdr.window_size(),
    });

    DecodedPacket {
        offset_seconds: frame.capture_time - first_seen_time,
        frame_length: frame.bytes.len(),
        layer,
        src_addr: parsed.network.as_ref().map(|n| n.src_ip()),
        dst_addr: parsed.network.as_ref().map(|n| n.dst_ip()),
        tcp,
    }
}
