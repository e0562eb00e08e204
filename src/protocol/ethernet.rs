//! Ethernet II frame header.
//!
//! Layout: destination MAC (6) | source MAC (6) | EtherType (2) | payload.
//! A single 802.1Q tag (4 bytes) may sit between the source MAC and the real
//! EtherType.

use super::{EtherType, FrameDecodeError};

/// Ethernet header length without VLAN tags.
pub const ETH_HEADER_LEN: usize = 14;

const VLAN_TAG_LEN: usize = 4;

#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameDecodeError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(FrameDecodeError::TooShort {
                layer: "ethernet",
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(EthernetHeader { data })
    }

    #[inline]
    pub fn dst_mac(&self) -> &'a [u8] {
        &self.data[0..6]
    }

    #[inline]
    pub fn src_mac(&self) -> &'a [u8] {
        &self.data[6..12]
    }

    #[inline]
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes([self.data[12], self.data[13]]))
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HEADER_LEN..]
    }

    /// EtherType and payload of the encapsulated packet, looking through one
    /// 802.1Q tag.
    pub fn inner(&self) -> Result<(EtherType, &'a [u8]), FrameDecodeError> {
        let payload = self.payload();
        match self.ether_type() {
            EtherType::VlanTagged => {
                if payload.len() < VLAN_TAG_LEN {
                    return Err(FrameDecodeError::TooShort {
                        layer: "802.1q",
                        expected: VLAN_TAG_LEN,
                        actual: payload.len(),
                    });
                }
                let inner = EtherType::from(u16::from_be_bytes([payload[2], payload[3]]));
                Ok((inner, &payload[VLAN_TAG_LEN..]))
            }
            other => Ok((other, payload)),
        }
    }
}
