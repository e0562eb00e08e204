//! Zero-copy header parsers for the layers the analyzer cares about.
//!
//! Each parser borrows the frame buffer and exposes accessors over fixed
//! offsets. [`parse_frame`] walks link → network → transport and stops at the
//! first layer that fails to parse, so a damaged frame still yields every
//! layer in front of the damage.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod linux_sll;
pub mod tcp;

use std::fmt;
use std::net::IpAddr;

/// Link-layer header type of a capture, from the pcap global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    LinuxSll,
    RawIp,
    Other(i32),
}

impl From<i32> for LinkType {
    fn from(value: i32) -> Self {
        match value {
            1 => LinkType::Ethernet,
            113 => LinkType::LinuxSll,
            // DLT_RAW has two numeric spellings depending on the platform.
            12 | 14 | 101 => LinkType::RawIp,
            other => LinkType::Other(other),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Ethernet => write!(f, "EN10MB"),
            LinkType::LinuxSll => write!(f, "LINUX_SLL"),
            LinkType::RawIp => write!(f, "RAW"),
            LinkType::Other(v) => write!(f, "DLT({})", v),
        }
    }
}

/// EtherType values that lead somewhere the analyzer can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    VlanTagged,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x8100 => EtherType::VlanTagged,
            other => EtherType::Unknown(other),
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::VlanTagged => write!(f, "802.1Q VLAN"),
            EtherType::Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
        }
    }
}

/// IP protocol numbers. Only TCP is analyzed; everything else is carried
/// through as a raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            6 => IpProtocol::Tcp,
            other => IpProtocol::Other(other),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Other(v) => write!(f, "Proto({})", v),
        }
    }
}

/// A single layer failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// Not enough bytes for the header.
    TooShort {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Header present but its fields are inconsistent.
    InvalidHeader(String),
}

impl fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDecodeError::TooShort {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "{} header too short: need {} bytes, got {}",
                layer, expected, actual
            ),
            FrameDecodeError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
        }
    }
}

impl std::error::Error for FrameDecodeError {}

/// Network layer header.
#[derive(Debug)]
pub enum NetworkHeader<'a> {
    Ipv4(ipv4::Ipv4Header<'a>),
    Ipv6(ipv6::Ipv6Header<'a>),
}

impl<'a> NetworkHeader<'a> {
    pub fn src_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.src_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.src_addr()),
        }
    }

    pub fn dst_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.dst_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.dst_addr()),
        }
    }

    pub fn protocol(&self) -> IpProtocol {
        match self {
            NetworkHeader::Ipv4(h) => h.protocol(),
            NetworkHeader::Ipv6(h) => h.next_header(),
        }
    }

    /// Bytes carried above the IP header, clamped to the IP length field.
    pub fn payload(&self) -> &'a [u8] {
        match self {
            NetworkHeader::Ipv4(h) => h.payload(),
            NetworkHeader::Ipv6(h) => h.payload(),
        }
    }

    /// True when this packet cannot carry a transport header (a non-first
    /// IPv4 fragment).
    fn is_trailing_fragment(&self) -> bool {
        match self {
            NetworkHeader::Ipv4(h) => h.fragment_offset() != 0,
            NetworkHeader::Ipv6(_) => false,
        }
    }
}

/// Every layer that parsed, innermost last. `error` holds the failure that
/// stopped the walk, if any.
#[derive(Debug)]
pub struct ParsedFrame<'a> {
    pub link_ok: bool,
    pub network: Option<NetworkHeader<'a>>,
    pub tcp: Option<tcp::TcpHeader<'a>>,
    pub error: Option<FrameDecodeError>,
}

impl<'a> ParsedFrame<'a> {
    fn raw(error: Option<FrameDecodeError>) -> Self {
        ParsedFrame {
            link_ok: false,
            network: None,
            tcp: None,
            error,
        }
    }
}

/// Parse as many layers of a captured frame as possible.
///
/// Never fails: the result records how deep the walk got.
pub fn parse_frame(link: LinkType, data: &[u8]) -> ParsedFrame<'_> {
    // Layer 2: find the network payload and what it claims to be.
    let (ether_type, l3) = match link {
        LinkType::Ethernet => match ethernet::EthernetHeader::parse(data) {
            Ok(eth) => match eth.inner() {
                Ok(inner) => inner,
                Err(e) => return ParsedFrame::raw(Some(e)),
            },
            Err(e) => return ParsedFrame::raw(Some(e)),
        },
        LinkType::LinuxSll => match linux_sll::SllHeader::parse(data) {
            Ok(sll) => (sll.protocol(), sll.payload()),
            Err(e) => return ParsedFrame::raw(Some(e)),
        },
        LinkType::RawIp => match data.first().map(|b| b >> 4) {
            Some(4) => (EtherType::Ipv4, data),
            Some(6) => (EtherType::Ipv6, data),
            _ => {
                return ParsedFrame::raw(Some(FrameDecodeError::InvalidHeader(
                    "raw frame does not start with an IP version nibble".into(),
                )))
            }
        },
        LinkType::Other(_) => return ParsedFrame::raw(None),
    };

    let mut frame = ParsedFrame {
        link_ok: true,
        network: None,
        tcp: None,
        error: None,
    };

    // Layer 3: IP family only.
    let network = match ether_type {
        EtherType::Ipv4 => ipv4::Ipv4Header::parse(l3).map(NetworkHeader::Ipv4),
        EtherType::Ipv6 => ipv6::Ipv6Header::parse(l3).map(NetworkHeader::Ipv6),
        _ => return frame,
    };
    let network = match network {
        Ok(hdr) => hdr,
        Err(e) => {
            frame.error = Some(e);
            return frame;
        }
    };

    // Layer 4: TCP only.
    if network.protocol() == IpProtocol::Tcp && !network.is_trailing_fragment() {
        match tcp::TcpHeader::parse(network.payload()) {
            Ok(hdr) => frame.tcp = Some(hdr),
            Err(e) => frame.error = Some(e),
        }
    }
    frame.network = Some(network);
    frame
}
