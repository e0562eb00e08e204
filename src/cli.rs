use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    AttackWindow, FlowKeyGranularity, GoodputNormalization, OutputFormat, Profile, RateUnit,
};

/// tcplens: TCP throughput, goodput, loss and connection lifecycle metrics
/// from pcap captures
#[derive(Parser, Debug)]
#[command(name = "tcplens", version, about)]
pub struct Cli {
    /// Capture files or directories of .pcap files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Config file (TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Directory for report files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Experiment rule set to start from
    #[arg(short = 'p', long, value_enum)]
    pub profile: Option<Profile>,

    /// Throughput/goodput bin width in seconds
    #[arg(short = 'b', long)]
    pub bin_duration: Option<f64>,

    /// Flow identity for retransmission tracking
    #[arg(long, value_enum)]
    pub flow_key: Option<FlowKeyGranularity>,

    /// Count only TCP segments sent to this port
    #[arg(long)]
    pub dst_port: Option<u16>,

    /// Count only TCP segments that carry payload
    #[arg(long)]
    pub nonzero_payload: bool,

    /// Count every frame, overriding a config or profile payload filter
    #[arg(long, conflicts_with = "nonzero_payload")]
    pub any_payload: bool,

    /// Rate unit for throughput and goodput
    #[arg(long, value_enum)]
    pub rate_unit: Option<RateUnit>,

    /// Headline goodput as a rate or as total megabits
    #[arg(long, value_enum)]
    pub goodput: Option<GoodputNormalization>,

    /// Traffic volume slot width in seconds
    #[arg(long)]
    pub traffic_interval: Option<f64>,

    /// Track connection lifecycles
    #[arg(long)]
    pub lifecycle: bool,

    /// Disable connection lifecycle tracking
    #[arg(long, conflicts_with = "lifecycle")]
    pub no_lifecycle: bool,

    /// Duration assigned to connections never seen closing (seconds)
    #[arg(long)]
    pub unclosed_duration: Option<f64>,

    /// Attack window as START:END seconds from the first frame
    #[arg(long, value_parser = parse_window)]
    pub attack_window: Option<AttackWindow>,

    /// Worker threads for batch runs (0 = auto)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Report formats to write (repeatable)
    #[arg(short = 'f', long = "format", value_enum)]
    pub formats: Vec<OutputFormat>,

    /// Print one line per file instead of the full summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_window(raw: &str) -> Result<AttackWindow, String> {
    let (start, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", raw))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|e| format!("bad window start '{}': {}", start, e))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|e| format!("bad window end '{}': {}", end, e))?;
    Ok(AttackWindow { start, end })
}
