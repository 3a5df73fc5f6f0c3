use anyhow::Context;
use clap::Parser;
use std::process;
use subway_congestion::cli::{self, Args};

fn main() {
    let args = Args::parse();

    let result = cli::run(&args).with_context(|| {
        format!(
            "Failed to build congestion snapshot from {}",
            args.input.display()
        )
    });

    match result {
        Ok(summary) if args.strict && summary.fails_strict() => {
            eprintln!(
                "Error: validation report for {} holds {} violations and {} parse issues (--strict)",
                summary.snapshot.display(),
                summary.report.violations.len(),
                summary.report.parse_issues.len()
            );
            process::exit(1);
        }
        Ok(_summary) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
