//! Linux cooked capture (SLL) header, produced when capturing on the `any`
//! pseudo-interface.
//!
//! Layout: packet type (2) | ARPHRD type (2) | address length (2) |
//! address (8) | protocol (2) | payload.

use super::{EtherType, FrameDecodeError};

pub const SLL_HEADER_LEN: usize = 16;

#[derive(Debug)]
pub struct SllHeader<'a> {
    data: &'a [u8],
}

impl<'a> SllHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameDecodeError> {
        if data.len() < SLL_HEADER_LEN {
            return Err(FrameDecodeError::TooShort {
                layer: "linux_sll",
                expected: SLL_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(SllHeader { data })
    }

    /// Protocol of the payload, in EtherType space.
    #[inline]
    pub fn protocol(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes([self.data[14], self.data[15]]))
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[SLL_HEADER_LEN..]
    }
}
