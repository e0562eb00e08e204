//! Lazy pcap record reader.

use pcap::{Capture, Offline};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::protocol::LinkType;

/// Errors from reading a capture file.
#[derive(Debug)]
pub enum CaptureError {
    /// The file is missing, unreadable or not a capture container. Fatal for
    /// that file.
    Open { path: PathBuf, source: pcap::Error },
    /// A record's framing is corrupt. The record is skipped.
    Format { index: u64, source: pcap::Error },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Open { path, source } => {
                write!(f, "cannot open capture {}: {}", path.display(), source)
            }
            CaptureError::Format { index, source } => {
                write!(f, "corrupt record #{}: {}", index, source)
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Open { source, .. } | CaptureError::Format { source, .. } => {
                Some(source)
            }
        }
    }
}

/// One captured record. Timestamps are whatever the capture recorded and
/// are not guaranteed to be monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// 1-based position in the file.
    pub index: u64,
    /// Seconds since the epoch.
    pub capture_time: f64,
    /// Length on the wire, which exceeds `bytes.len()` when the snaplen cut
    /// the frame short.
    pub wire_length: u32,
    pub bytes: Vec<u8>,
}

/// Iterator over the records of one capture file.
///
/// libpcap cannot resynchronise after a damaged record header, so the
/// first [`CaptureError::Format`] is also the last item.
pub struct CaptureReader {
    capture: Capture<Offline>,
    link_type: LinkType,
    next_index: u64,
    finished: bool,
}

impl CaptureReader {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let capture = Capture::from_file(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let link_type = LinkType::from(capture.get_datalink().0);

        tracing::info!(path = %path.display(), link_type = %link_type, "capture opened");
        if let LinkType::Other(dlt) = link_type {
            tracing::warn!(
                path = %path.display(),
                dlt,
                "unsupported link type, frames count toward raw totals only"
            );
        }

        Ok(CaptureReader {
            capture,
            link_type,
            next_index: 1,
            finished: false,
        })
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }
}

impl Iterator for CaptureReader {
    type Item = Result<RawFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        match self.capture.next_packet() {
            Ok(packet) => {
                let capture_time = packet.header.ts.tv_sec as f64
                    + packet.header.ts.tv_usec as f64 / 1_000_000.0;
                Some(Ok(RawFrame {
                    index,
                    capture_time,
                    wire_length: packet.header.len,
                    bytes: packet.data.to_vec(),
                }))
            }
            Err(pcap::Error::NoMorePackets) => {
                self.finished = true;
                None
            }
            Err(source) => {
                self.finished = true;
                Some(Err(CaptureError::Format { index, source }))
            }
        }
    }
}
