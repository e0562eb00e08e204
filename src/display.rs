//! Console summaries for the CLI.

use std::path::Path;

use crate::lifecycle::{ConnectionStats, ConnectionSummary};
use crate::metrics::Metrics;
use crate::pipeline::{AnalysisError, FileReport};

/// Print the metrics block for one analyzed capture.
pub fn print_file_report(report: &FileReport) {
    let m = &report.analysis.metrics;
    let unit = m.rate_unit.label();

    println!("{}", "=".repeat(72));
    println!(
        "{}  ({}, {})",
        report.name,
        report.path.display(),
        report.link_type
    );
    println!("{}", "-".repeat(72));
    println!(
        "  Frames:          {} counted, {} filtered",
        m.counted_frames(),
        m.filtered_frames
    );
    println!(
        "  TCP segments:    {} ({} unique, {} retransmitted)",
        m.total_packets, m.unique_packets, m.retransmissions
    );
    println!("  Duration:        {:.3} s", m.observed_duration);
    println!("  Throughput:      {} {}", format_rate(m.throughput), unit);
    println!("  Goodput:         {} {}", format_rate(m.goodput), m.goodput_label());
    println!("  Loss rate:       {:.2}%", m.loss_percent());
    println!("  Peak window:     {}", m.peak_window);
    println!("  Max payload:     {} bytes", m.max_payload);
    println!("  Max frame:       {} bytes", m.max_frame);
    if m.snaplen_truncated > 0 {
        println!("  Snaplen cut:     {} frames", m.snaplen_truncated);
    }
    if report.corrupt_records > 0 {
        println!(
            "  Corrupt records: {} (capture truncated)",
            report.corrupt_records
        );
    }

    if let Some(summary) = &report.analysis.connection_summary {
        print_connection_summary(summary);
    }
}

fn print_connection_summary(summary: &ConnectionSummary) {
    println!("  Connections:");
    print_stats_line("all", &summary.all);
    if let (Some(window), Some(during), Some(outside)) = (
        &summary.attack_window,
        &summary.during_attack,
        &summary.outside_attack,
    ) {
        let label = format!("{:.0}-{:.0}s", window.start, window.end);
        print_stats_line(&label, during);
        print_stats_line("outside", outside);
    }
}

fn print_stats_line(label: &str, stats: &ConnectionStats) {
    println!(
        "    {:<10} {:>6} opened  {:>6} closed  {:>6} reset  {:>6} unclosed  mean {:.3} s",
        label, stats.connections, stats.closed, stats.reset, stats.unclosed, stats.mean_duration
    );
}

/// Print a failed input with its diagnostic.
pub fn print_failure(path: &Path, error: &AnalysisError) {
    println!("{}", "=".repeat(72));
    println!("{}  FAILED: {}", path.display(), error);
}

/// Print the batch totals line.
pub fn print_batch_footer(succeeded: usize, failed: usize, elapsed_secs: f64) {
    println!("{}", "=".repeat(72));
    println!(
        "{} file(s) analyzed, {} failed in {:.2} s",
        succeeded, failed, elapsed_secs
    );
}

/// Two decimals, six below 1.0 (slow links in Mbps).
fn format_rate(value: f64) -> String {
    if value == 0.0 || value.abs() >= 1.0 {
        format!("{:.2}", value)
    } else {
        format!("{:.6}", value)
    }
}

/// One line per file for `--quiet` runs.
pub fn format_brief(name: &str, m: &Metrics) -> String {
    format!(
        "{}: throughput {} {}, goodput {} {}, loss {:.2}%, peak window {}",
        name,
        format_rate(m.throughput),
        m.rate_unit.label(),
        format_rate(m.goodput),
        m.goodput_label(),
        m.loss_percent(),
        m.peak_window
    )
}
