use clap::Parser;
use std::time::Instant;

use tcplens::cli;
use tcplens::config::{self, Config};
use tcplens::display;
use tcplens::pipeline::{self, BatchOutcome};
use tcplens::report;

fn main() {
    let args = cli::Cli::parse();

    // Initialize tracing/logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let paths = match pipeline::expand_inputs(&args.inputs) {
        Ok(paths) if !paths.is_empty() => paths,
        Ok(_) => {
            eprintln!("error: no capture files found");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("error: cannot read inputs: {}", err);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let outcomes = pipeline::run_batch(paths, &config);
    let failed = print_outcomes(&outcomes, config.output.quiet);

    let mut summary_failed = false;
    if let Some(dir) = &config.output.dir {
        let reports = outcomes.iter().filter_map(|o| o.result.as_ref().ok());
        match report::write_summary(dir, reports) {
            Ok(path) => tracing::info!(path = %path.display(), "summary written"),
            Err(err) => {
                eprintln!("error: cannot write summary: {}", err);
                summary_failed = true;
            }
        }
    }

    if !config.output.quiet {
        display::print_batch_footer(
            outcomes.len() - failed,
            failed,
            started.elapsed().as_secs_f64(),
        );
    }

    if failed > 0 || summary_failed {
        std::process::exit(2);
    }
}

/// Print every outcome in input order. Returns the number of failures.
fn print_outcomes(outcomes: &[BatchOutcome], quiet: bool) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) if quiet => {
                println!("{}", display::format_brief(&report.name, &report.analysis.metrics));
            }
            Ok(report) => display::print_file_report(report),
            Err(err) => {
                failed += 1;
                if quiet {
                    eprintln!("{}: {}", outcome.path.display(), err);
                } else {
                    display::print_failure(&outcome.path, err);
                }
            }
        }
    }
    failed
}

fn load_config(args: &cli::Cli) -> Result<Config, config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(config::ConfigError::Io)?;
            Config::from_toml_with_profile(&raw, args.profile)?
        }
        None => Config::from_toml_with_profile("", args.profile)?,
    };

    let analysis = &mut config.analysis;
    if let Some(value) = args.bin_duration {
        analysis.bin_duration = value;
    }
    if let Some(value) = args.flow_key {
        analysis.flow_key = value;
    }
    if let Some(value) = args.dst_port {
        analysis.destination_port = Some(value);
    }
    if args.nonzero_payload {
        analysis.require_nonzero_payload = true;
    }
    if args.any_payload {
        analysis.require_nonzero_payload = false;
    }
    if let Some(value) = args.rate_unit {
        analysis.rate_unit = value;
    }
    if let Some(value) = args.goodput {
        analysis.goodput_normalization = value;
    }
    if let Some(value) = args.traffic_interval {
        analysis.traffic_interval = value;
    }

    let lifecycle = &mut config.lifecycle;
    if args.lifecycle {
        lifecycle.enabled = true;
    }
    if args.no_lifecycle {
        lifecycle.enabled = false;
    }
    if let Some(value) = args.unclosed_duration {
        lifecycle.default_unclosed_duration = value;
    }
    if let Some(value) = args.attack_window {
        lifecycle.attack_window = Some(value);
    }

    if let Some(value) = args.workers {
        config.batch.workers = value;
    }

    let output = &mut config.output;
    if let Some(value) = &args.output_dir {
        output.dir = Some(value.clone());
    }
    if !args.formats.is_empty() {
        output.formats = args.formats.clone();
    }
    if args.quiet {
        output.quiet = true;
    }

    config.validate()?;
    Ok(config)
}
