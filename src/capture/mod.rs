//! Offline capture reading.
//!
//! Opens a pcap savefile through libpcap and yields its records in file
//! order as owned [`reader::RawFrame`]s.

pub mod reader;

pub use reader::{CaptureError, CaptureReader, RawFrame};
