//! Batch worker pool.
//!
//! ```text
//! dispatcher (caller thread)
//!   |
//!   +--[bounded job channel]--→ tl-worker-0 ─┐
//!   +                        --→ tl-worker-1 ─┼--[result channel]--→ collector
//!   ...                                       │   (input order restored)
//!   +                        --→ tl-worker-N ─┘
//! ```
//!
//! Files are independent: each job builds its own aggregator, so workers
//! share nothing but the read-only config.

use crossbeam_channel::{bounded, unbounded};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::config::Config;

use super::{process_file, AnalysisError, FileReport};

struct Job {
    index: usize,
    path: PathBuf,
}

struct JobResult {
    index: usize,
    result: Result<FileReport, AnalysisError>,
}

/// Outcome for one input of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<FileReport, AnalysisError>,
}

/// Worker count for `jobs` files: the configured value, or the CPU count
/// clamped to 1..=8. Never more workers than jobs.
pub fn worker_count(configured: usize, jobs: usize) -> usize {
    let workers = if configured == 0 {
        num_cpus::get().clamp(1, 8)
    } else {
        configured
    };
    workers.min(jobs).max(1)
}

/// Analyze every path on a pool of worker threads. Results come back in
/// the order of `paths`, one per input, failures included.
pub fn run_batch(paths: Vec<PathBuf>, config: &Config) -> Vec<BatchOutcome> {
    if paths.is_empty() {
        return Vec::new();
    }

    let num_workers = worker_count(config.batch.workers, paths.len());
    let capacity = num_workers * config.batch.queue_depth.max(1);
    tracing::info!(num_workers, files = paths.len(), "starting batch");

    let config = Arc::new(config.clone());
    let (job_tx, job_rx) = bounded::<Job>(capacity);
    let (result_tx, result_rx) = unbounded::<JobResult>();

    let mut handles = Vec::with_capacity(num_workers);
    for worker_id in 0..num_workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let config = Arc::clone(&config);

        let handle = thread::Builder::new()
            .name(format!("tl-worker-{}", worker_id))
            .spawn(move || {
                tracing::debug!(worker_id, "worker started");
                let mut processed = 0usize;
                for job in job_rx.iter() {
                    let result = process_file(&job.path, &config);
                    if let Err(err) = &result {
                        tracing::warn!(path = %job.path.display(), error = %err, "file failed");
                    }
                    processed += 1;
                    if result_tx
                        .send(JobResult {
                            index: job.index,
                            result,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!(worker_id, processed, "worker stopped");
            })
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }

    // Only the workers hold these now; the channels disconnect when they exit.
    drop(job_rx);
    drop(result_tx);

    for (index, path) in paths.iter().enumerate() {
        let job = Job {
            index,
            path: path.clone(),
        };
        if job_tx.send(job).is_err() {
            tracing::warn!("all workers exited, stopping dispatch");
            break;
        }
    }
    drop(job_tx);

    let mut slots: Vec<Option<Result<FileReport, AnalysisError>>> =
        paths.iter().map(|_| None).collect();
    for done in result_rx.iter() {
        slots[done.index] = Some(done.result);
    }

    for handle in handles {
        if handle.join().is_err() {
            tracing::warn!("worker thread panicked");
        }
    }

    paths
        .into_iter()
        .zip(slots)
        .map(|(path, slot)| BatchOutcome {
            path,
            result: slot.unwrap_or_else(|| Err(AnalysisError::Aborted)),
        })
        .collect()
}

fn is_capture(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pcap"))
        .unwrap_or(false)
}

/// Expand directories to their `.pcap` files, sorted by name. File
/// arguments are kept as given, whatever their extension.
pub fn expand_inputs(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_capture(path))
                .collect();
            found.sort();
            if found.is_empty() {
                tracing::warn!(dir = %input.display(), "no .pcap files in directory");
            }
            out.extend(found);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}
