//! Capture builders for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const ACK: u8 = 0x10;

pub const CLIENT: [u8; 4] = [10, 0, 0, 1];
pub const SERVER: [u8; 4] = [10, 0, 0, 2];

/// One TCP segment over IPv4.
#[derive(Clone, Copy)]
pub struct Segment {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub flags: u8,
    pub window: u16,
    pub payload_len: usize,
}

impl Segment {
    pub fn client(seq: u32, flags: u8, payload_len: usize) -> Self {
        Segment {
            src: CLIENT,
            dst: SERVER,
            src_port: 40000,
            dst_port: 5201,
            seq,
            flags,
            window: 29200,
            payload_len,
        }
    }

    pub fn server(seq: u32, flags: u8) -> Self {
        Segment {
            src: SERVER,
            dst: CLIENT,
            src_port: 5201,
            dst_port: 40000,
            seq,
            flags,
            window: 65535,
            payload_len: 0,
        }
    }

    pub fn ip_bytes(&self) -> Vec<u8> {
        let total = 20 + 20 + self.payload_len;
        let mut pkt = vec![0u8; total];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        pkt[8] = 64;
        pkt[9] = 6;
        pkt[12..16].copy_from_slice(&self.src);
        pkt[16..20].copy_from_slice(&self.dst);
        let tcp = &mut pkt[20..40];
        tcp[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&self.seq.to_be_bytes());
        tcp[12] = 0x50;
        tcp[13] = self.flags;
        tcp[14..16].copy_from_slice(&self.window.to_be_bytes());
        pkt
    }

    pub fn ethernet(&self) -> Vec<u8> {
        let mut frame = vec![
            0x00, 0x00, 0x00, 0x00, 0x00, 0x02, // dst
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // src
            0x08, 0x00,
        ];
        frame.extend_from_slice(&self.ip_bytes());
        frame
    }

    /// Linux cooked capture (SLL) framing.
    pub fn sll(&self) -> Vec<u8> {
        let mut frame = vec![
            0x00, 0x00, // packet type: to us
            0x00, 0x01, // ARPHRD_ETHER
            0x00, 0x06, // address length
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, // address
            0x08, 0x00, // protocol
        ];
        frame.extend_from_slice(&self.ip_bytes());
        frame
    }
}

/// An Ethernet ARP request: link layer only.
pub fn arp_frame() -> Vec<u8> {
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06]);
    frame.extend_from_slice(&[0u8; 28]);
    frame
}

/// Builds a little-endian microsecond pcap file in memory.
pub struct PcapBuilder {
    bytes: Vec<u8>,
}

impl PcapBuilder {
    pub fn new(linktype: u32) -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // magic
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        bytes.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        bytes.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        bytes.extend_from_slice(&linktype.to_le_bytes());
        PcapBuilder { bytes }
    }

    pub fn ethernet() -> Self {
        Self::new(1)
    }

    /// Append a record stamped `sec` + `usec` (relative to a base of 1000 s).
    pub fn record(mut self, sec: u32, usec: u32, data: &[u8]) -> Self {
        self.push_header(sec, usec, data.len() as u32, data.len() as u32);
        self.bytes.extend_from_slice(data);
        self
    }

    /// Append a record whose header claims `data.len() + missing` bytes.
    pub fn truncated_record(mut self, sec: u32, usec: u32, data: &[u8], missing: u32) -> Self {
        let claimed = data.len() as u32 + missing;
        self.push_header(sec, usec, claimed, claimed);
        self.bytes.extend_from_slice(data);
        self
    }

    fn push_header(&mut self, sec: u32, usec: u32, incl_len: u32, orig_len: u32) {
        self.bytes.extend_from_slice(&(1000 + sec).to_le_bytes());
        self.bytes.extend_from_slice(&usec.to_le_bytes());
        self.bytes.extend_from_slice(&incl_len.to_le_bytes());
        self.bytes.extend_from_slice(&orig_len.to_le_bytes());
    }

    pub fn write(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, &self.bytes).expect("write capture");
        path
    }
}
