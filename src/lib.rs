//! tcplens library crate: capture reading, frame decoding and TCP metrics
//! aggregation, shared by the binary, benchmarks and integration tests.

pub mod capture;
pub mod cli;
pub mod config;
pub mod decode;
pub mod display;
pub mod flow;
pub mod lifecycle;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod report;

pub use pipeline::{analyze_file, run_batch, AnalysisError, FileReport};
