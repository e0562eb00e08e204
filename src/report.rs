//! Report files.
//!
//! Every file is written under a `.tmp` name first and renamed into place,
//! so a reader never sees a half-written report.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{OutputFormat, RateUnit};
use crate::lifecycle::{CloseReason, ClosedConnection, ConnectionSummary};
use crate::metrics::{Metrics, Series, SeriesPoint};
use crate::pipeline::FileReport;

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a str,
    path: String,
    link_type: String,
    corrupt_records: u64,
    metrics: &'a Metrics,
    series: &'a Series,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<&'a [ClosedConnection]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_summary: Option<&'a ConnectionSummary>,
}

fn write_atomic<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = File::create(&tmp).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()
    });
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, path)
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        let escaped = field.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}

/// Write the configured report files for one capture. Returns the paths
/// written.
pub fn write_reports(
    dir: &Path,
    report: &FileReport,
    formats: &[OutputFormat],
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let stem = &report.name;
    let mut written = Vec::new();

    for format in formats {
        match format {
            OutputFormat::Json => {
                let path = dir.join(format!("{}.json", stem));
                write_json(&path, report)?;
                written.push(path);
            }
            OutputFormat::Text => {
                let path = dir.join(format!("{}.txt", stem));
                write_text(&path, &report.analysis.metrics)?;
                written.push(path);
            }
            OutputFormat::Csv => {
                let analysis = &report.analysis;
                let unit = analysis.metrics.rate_unit;
                let series = &analysis.series;

                let path = dir.join(format!("{}_throughput.csv", stem));
                write_rate_csv(&path, &series.throughput, unit)?;
                written.push(path);

                let path = dir.join(format!("{}_goodput.csv", stem));
                write_rate_csv(&path, &series.goodput, unit)?;
                written.push(path);

                let path = dir.join(format!("{}_window.csv", stem));
                write_window_csv(&path, &series.window)?;
                written.push(path);

                let path = dir.join(format!("{}_traffic.csv", stem));
                write_traffic_csv(&path, series)?;
                written.push(path);

                if let Some(connections) = &analysis.connections {
                    let path = dir.join(format!("{}_connections.csv", stem));
                    write_connections_csv(&path, connections)?;
                    written.push(path);
                }
            }
        }
    }

    tracing::debug!(dir = %dir.display(), file = %stem, files = written.len(), "reports written");
    Ok(written)
}

pub fn write_json(path: &Path, report: &FileReport) -> io::Result<()> {
    let analysis = &report.analysis;
    let body = JsonReport {
        file: &report.name,
        path: report.path.display().to_string(),
        link_type: report.link_type.to_string(),
        corrupt_records: report.corrupt_records,
        metrics: &analysis.metrics,
        series: &analysis.series,
        connections: analysis.connections.as_deref(),
        connection_summary: analysis.connection_summary.as_ref(),
    };
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, &body)?;
        writeln!(w)
    })
}

/// The four-line summary of the window experiments.
pub fn format_text(metrics: &Metrics) -> String {
    let label = metrics.rate_unit.label();
    let precision = match metrics.rate_unit {
        RateUnit::Bps => 2,
        RateUnit::Mbps => 8,
    };
    format!(
        "Total Throughput: {:.*} {}\nTotal Goodput: {:.*} {}\nPacket Loss Rate: {:.2}%\nMaximum Window Size: {}\n",
        precision,
        metrics.throughput,
        label,
        precision,
        metrics.goodput,
        label,
        metrics.loss_percent(),
        metrics.peak_window,
    )
}

pub fn write_text(path: &Path, metrics: &Metrics) -> io::Result<()> {
    let text = format_text(metrics);
    write_atomic(path, |w| w.write_all(text.as_bytes()))
}

fn write_rate_csv(path: &Path, points: &[SeriesPoint], unit: RateUnit) -> io::Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "time_secs,rate_{}", unit_column(unit))?;
        for point in points {
            writeln!(w, "{:.6},{:.6}", point.time, point.value)?;
        }
        Ok(())
    })
}

fn unit_column(unit: RateUnit) -> &'static str {
    match unit {
        RateUnit::Bps => "bps",
        RateUnit::Mbps => "mbps",
    }
}

fn write_window_csv(path: &Path, points: &[SeriesPoint]) -> io::Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "time_secs,window")?;
        for point in points {
            writeln!(w, "{:.6},{}", point.time, point.value)?;
        }
        Ok(())
    })
}

fn write_traffic_csv(path: &Path, series: &Series) -> io::Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "slot_start_secs,bytes")?;
        for slot in &series.traffic {
            writeln!(w, "{:.6},{}", slot.start(series.traffic_interval), slot.bytes)?;
        }
        Ok(())
    })
}

fn write_connections_csv(path: &Path, connections: &[ClosedConnection]) -> io::Result<()> {
    write_atomic(path, |w| {
        writeln!(w, "src_ip,src_port,dst_ip,dst_port,start_time_secs,duration_secs,close_reason")?;
        for conn in connections {
            let reason = match conn.close_reason {
                Some(CloseReason::FinAck) => "fin_ack",
                Some(CloseReason::Reset) => "reset",
                None => "unclosed",
            };
            writeln!(
                w,
                "{},{},{},{},{:.6},{:.6},{}",
                csv_escape(&conn.id.src.to_string()),
                conn.id.src_port,
                csv_escape(&conn.id.dst.to_string()),
                conn.id.dst_port,
                conn.start_time,
                conn.duration,
                reason
            )?;
        }
        Ok(())
    })
}

/// Write `summary.json`: base name → metrics for every successful file.
pub fn write_summary<'a, I>(dir: &Path, reports: I) -> io::Result<PathBuf>
where
    I: IntoIterator<Item = &'a FileReport>,
{
    let mut summary: BTreeMap<&str, &Metrics> = BTreeMap::new();
    for report in reports {
        if summary
            .insert(&report.name, &report.analysis.metrics)
            .is_some()
        {
            tracing::warn!(file = %report.name, "duplicate base name in batch, keeping the last");
        }
    }

    fs::create_dir_all(dir)?;
    let path = dir.join("summary.json");
    write_atomic(&path, |w| {
        serde_json::to_writer_pretty(&mut *w, &summary)?;
        writeln!(w)
    })?;
    Ok(path)
}
