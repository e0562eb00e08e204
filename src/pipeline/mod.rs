//! Per-file analysis driver.
//!
//! ```text
//! CaptureReader ──RawFrame──→ decode ──DecodedPacket──→ Aggregator
//!                                                          │
//!                                              Analysis (metrics, series,
//!                                              connections) ──→ report
//! ```
//!
//! Each file is one single-threaded pass. [`batch`] runs many files on a
//! worker pool, one [`Aggregator`] per job.

pub mod batch;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::capture::{CaptureError, CaptureReader};
use crate::config::Config;
use crate::metrics::{Aggregator, Analysis, Metrics};
use crate::protocol::LinkType;
use crate::report;

pub use batch::{expand_inputs, run_batch, BatchOutcome};

#[derive(Debug)]
pub enum AnalysisError {
    /// The capture could not be opened. Nothing was analyzed.
    Capture(CaptureError),
    /// Analysis succeeded but a report file could not be written.
    Output(io::Error),
    /// The worker handling the file exited without reporting back.
    Aborted,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Capture(err) => write!(f, "{}", err),
            AnalysisError::Output(err) => write!(f, "report write failed: {}", err),
            AnalysisError::Aborted => write!(f, "worker aborted before finishing"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Capture(err) => Some(err),
            AnalysisError::Output(err) => Some(err),
            AnalysisError::Aborted => None,
        }
    }
}

impl From<CaptureError> for AnalysisError {
    fn from(err: CaptureError) -> Self {
        AnalysisError::Capture(err)
    }
}

impl From<io::Error> for AnalysisError {
    fn from(err: io::Error) -> Self {
        AnalysisError::Output(err)
    }
}

/// Result of analyzing one capture.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Base name of the capture, used to key summaries and name outputs.
    pub name: String,
    pub path: PathBuf,
    pub link_type: LinkType,
    pub analysis: Analysis,
    /// Records lost to a corrupt capture tail.
    pub corrupt_records: u64,
    pub elapsed_secs: f64,
}

/// Base name of a capture file without its extension.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The whole file, filtered frames included, spans less than `min_secs`.
/// A zero minimum never warns.
pub fn is_short_capture(metrics: &Metrics, min_secs: f64) -> bool {
    min_secs > 0.0 && metrics.capture_duration < min_secs
}

/// Read, decode and aggregate one capture. Only a failure to open the file
/// is an error; a corrupt record ends the pass with what was read so far.
pub fn analyze_file(path: &Path, config: &Config) -> Result<FileReport, AnalysisError> {
    let started = Instant::now();
    let reader = CaptureReader::open(path)?;
    let link_type = reader.link_type();
    let mut aggregator = Aggregator::new(config.analysis.clone(), config.lifecycle.clone());
    let mut corrupt_records = 0u64;

    for item in reader {
        match item {
            Ok(frame) => aggregator.ingest_frame(&frame, link_type),
            Err(err) => {
                corrupt_records += 1;
                tracing::warn!(path = %path.display(), error = %err, "skipping corrupt record");
            }
        }
    }

    let analysis = aggregator.into_analysis();
    let metrics = &analysis.metrics;
    let min_secs = config.analysis.min_capture_secs;
    if is_short_capture(metrics, min_secs) {
        tracing::warn!(
            path = %path.display(),
            capture_secs = metrics.capture_duration,
            min_secs,
            "capture shorter than expected, rates may be unreliable"
        );
    }

    let elapsed_secs = started.elapsed().as_secs_f64();
    tracing::info!(
        path = %path.display(),
        frames = metrics.total_frames,
        filtered = metrics.filtered_frames,
        tcp_segments = metrics.total_packets,
        elapsed_secs,
        "capture analyzed"
    );

    Ok(FileReport {
        name: base_name(path),
        path: path.to_path_buf(),
        link_type,
        analysis,
        corrupt_records,
        elapsed_secs,
    })
}

/// Analyze one capture and, when an output directory is configured, write
/// its report files.
pub fn process_file(path: &Path, config: &Config) -> Result<FileReport, AnalysisError> {
    let report = analyze_file(path, config)?;
    if let Some(dir) = &config.output.dir {
        report::write_reports(dir, &report, &config.output.formats)?;
    }
    Ok(report)
}
