//! Command implementation: build or reuse the snapshot, then report on it

use crate::cli::args::Args;
use crate::config::CongestionThresholds;
use crate::error::Result;
use crate::models::{CongestionLevel, LongTable};
use crate::pipeline::validate::ValidationReport;
use crate::query::{CongestionQuery, DayFilter, PeakHoursPattern, QueryFilter, StationRank};
use crate::store::{CongestionStore, LoadOutcome};

use colored::*;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a run produced
#[derive(Debug)]
pub struct RunSummary {
    pub snapshot: PathBuf,
    pub outcome: LoadOutcome,
    pub report: ValidationReport,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether `--strict` should fail the run
    pub fn fails_strict(&self) -> bool {
        !self.report.is_valid()
    }
}

/// Run the command; the summary has already been printed when this returns
pub fn run(args: &Args) -> Result<RunSummary> {
    setup_logging(args);
    let start = Instant::now();

    let config = args.pipeline_config()?;
    let thresholds = config.derivation.thresholds;
    let day = args.day_filter()?;
    let snapshot = args.output_path()?;
    info!(
        "Processing {} into {}",
        args.input.display(),
        snapshot.display()
    );

    let spinner = args.show_progress().then(create_spinner);
    let mut store = CongestionStore::new(args.input.clone(), snapshot.clone(), config)?;
    if let Some(pb) = &spinner {
        store = store.with_progress(pb.clone());
    }

    let loaded = if args.force {
        store.rebuild().map(|_| LoadOutcome::Rebuilt)
    } else {
        store.refresh()
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let outcome = loaded?;
    debug!("Snapshot outcome: {:?}", outcome);

    let table = store.load()?;
    let report = store.statistics()?;
    let elapsed = start.elapsed();

    if !args.quiet {
        let query = CongestionQuery::from_table(&table)?;
        print_summary(&snapshot, outcome, &table, &report, elapsed);
        print_peaks(day, &query.peak_hours_pattern(day)?);
        let ranking = query
            .filtered(&QueryFilter::day(day))?
            .top_stations(args.top, false)?;
        print_top_stations(day, &thresholds, &ranking);
    }
    if !report.is_valid() {
        warn!(
            "Validation found {} violations and {} parse issues",
            report.violations.len(),
            report.parse_issues.len()
        );
    }

    Ok(RunSummary {
        snapshot,
        outcome,
        report: (*report).clone(),
        elapsed,
    })
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("subway_congestion={}", log_level)));

    // try_init: a second call (tests) leaves the first subscriber in place
    let initialized = if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if initialized.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Checking snapshot");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn describe_outcome(outcome: LoadOutcome) -> ColoredString {
    match outcome {
        LoadOutcome::Memory | LoadOutcome::Snapshot => "reused existing snapshot".cyan(),
        LoadOutcome::Rebuilt => "built new snapshot".green(),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn print_summary(
    snapshot: &std::path::Path,
    outcome: LoadOutcome,
    table: &LongTable,
    report: &ValidationReport,
    elapsed: Duration,
) {
    let stats = &report.statistics;

    println!("\n{}", "Subway congestion snapshot".bold());
    println!("{}", "━".repeat(48));
    println!("   • Snapshot: {} ({})", snapshot.display(), describe_outcome(outcome));
    println!("   • Rows: {}", table.len());
    println!(
        "   • Lines: {}  Stations: {}",
        stats.line_count, stats.station_count
    );
    println!(
        "   • Congestion mean {}  std {}  min {}  max {}",
        format_value(stats.mean),
        format_value(stats.std_dev),
        format_value(stats.min),
        format_value(stats.max)
    );
    if let Some(peak) = &stats.peak {
        println!(
            "   • Peak: {} {} at {} ({:.1})",
            peak.line, peak.station_name, peak.time_slot, peak.value
        );
    }
    println!("   • Time: {}", HumanDuration(elapsed));

    if report.is_valid() {
        println!("   {}", "✓ No violations".green());
    } else {
        if !report.parse_issues.is_empty() {
            println!(
                "   {}",
                format!("⚠ {} malformed cells stored as 0", report.parse_issues.len()).yellow()
            );
        }
        for (kind, count) in report.violation_counts() {
            println!("   {}", format!("⚠ {}: {}", kind, count).yellow());
        }
    }
}

fn print_peaks(day: DayFilter, pattern: &PeakHoursPattern) {
    println!("\n{} ({})", "Commute peaks".bold(), day);
    for (label, window) in [("Morning", &pattern.morning), ("Evening", &pattern.evening)] {
        match window {
            Some(peak) => println!(
                "   • {}: {} at {:.1} (window mean {:.1})",
                label, peak.time_slot, peak.value, peak.window_mean
            ),
            None => println!("   • {}: no data", label),
        }
    }
}

fn print_top_stations(day: DayFilter, thresholds: &CongestionThresholds, ranking: &[StationRank]) {
    if ranking.is_empty() {
        return;
    }
    println!("\n{} ({})", "Busiest stations".bold(), day);
    for station in ranking {
        let mean = format!("{:>7.1}", station.mean);
        let mean = match thresholds.level(station.mean) {
            CongestionLevel::High => mean.red(),
            CongestionLevel::Medium => mean.yellow(),
            CongestionLevel::Low => mean.normal(),
        };
        println!(
            "   {:>3}. {} {} {}  (max {:.1})",
            station.rank, mean, station.line, station.station_name, station.max
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn export() -> String {
        let mut headers = vec!["요일구분", "호선", "역번호", "출발역", "상하구분"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        headers.push("5시30분".to_string());
        for hour in 6..24 {
            headers.push(format!("{}시00분", hour));
            headers.push(format!("{}시30분", hour));
        }
        headers.push("0시00분".to_string());
        headers.push("0시30분".to_string());

        let mut cells = vec!["10".to_string(); 39];
        cells[5] = "140".to_string();
        let row = ["평일", "2호선", "222", "강남", "내선"]
            .iter()
            .map(|s| s.to_string())
            .chain(cells)
            .collect::<Vec<_>>();
        format!("{}\n{}\n", headers.join(","), row.join(","))
    }

    #[test]
    fn test_run_builds_then_reuses() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("export.csv");
        let output = temp_dir.path().join("out").join("snap.parquet");
        fs::write(&input, export()).unwrap();

        let args = Args::parse_from([
            "subway-congestion",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-q",
        ]);
        let first = run(&args).unwrap();
        assert_eq!(first.outcome, LoadOutcome::Rebuilt);
        assert_eq!(first.report.statistics.total_rows, 39);
        assert_eq!(first.report.statistics.max, Some(140.0));
        assert!(!first.fails_strict());
        assert!(output.exists());

        let second = run(&args).unwrap();
        assert_eq!(second.outcome, LoadOutcome::Snapshot);

        let forced = Args::parse_from([
            "subway-congestion",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-q",
            "--force",
        ]);
        assert_eq!(run(&forced).unwrap().outcome, LoadOutcome::Rebuilt);
    }

    #[test]
    fn test_run_fails_on_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let args = Args::parse_from([
            "subway-congestion",
            "/nonexistent/export.csv",
            "-o",
            temp_dir.path().join("snap.parquet").to_str().unwrap(),
            "-q",
        ]);
        assert!(run(&args).is_err());
    }
}
