//! Standalone inspector for push-up totals files.
//!
//! Reads a totals file without touching the network, prints what it
//! holds, and checks that monthly subtotals add up to each user's total.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pushup_tally::config::DEFAULT_STATE_FILE;
use pushup_tally::tally::{ReportFormat, TallyState, render};

/// Push-up totals inspector.
#[derive(Parser, Debug)]
#[command(name = "inspect_totals")]
#[command(about = "Inspects and checks a push-up totals file offline")]
#[command(version)]
struct Args {
    /// Path to the totals JSON file to inspect.
    #[arg(short, long, default_value = DEFAULT_STATE_FILE)]
    file: PathBuf,

    /// Layout of the printed totals.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Monthly)]
    report: ReportFormat,

    /// Show per-user consistency results even when they pass.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    inspect(&args)
}

fn inspect(args: &Args) -> ExitCode {
    println!("Inspecting: {}", args.file.display());

    if !args.file.exists() {
        println!("No totals file yet; a first run starts from an empty state.");
        return ExitCode::SUCCESS;
    }

    let state = match TallyState::load(&args.file) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("✗ Failed to load totals: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Schema version:    {}", state.version);
    println!("Last processed id: {}", state.last_processed_id);
    println!(
        "Session:           {}",
        if state.has_credential() { "stored" } else { "none (interactive login on next run)" }
    );
    println!("Users:             {}", state.totals.len());
    println!("Grand total:       {}\n", state.grand_total());

    match render(&state, args.report) {
        Ok(report) => println!("{report}"),
        Err(e) => {
            eprintln!("✗ Failed to render totals: {e}");
            return ExitCode::FAILURE;
        }
    }

    if state.monthly.is_empty() {
        println!("No monthly breakdown stored; nothing to cross-check.");
        return ExitCode::SUCCESS;
    }

    let problems = state.check_consistency();

    if args.verbose {
        for user in state.totals.keys() {
            if !problems.iter().any(|p| &p.user == user) {
                println!("  ✓ {user}");
            }
        }
    }

    for problem in &problems {
        println!(
            "  ✗ {}: total {} but monthly subtotals add up to {}",
            problem.user, problem.total, problem.monthly_sum
        );
    }

    if problems.is_empty() {
        println!("✓ Monthly subtotals match totals for all {} users", state.totals.len());
        ExitCode::SUCCESS
    } else {
        println!("✗ {} user(s) with inconsistent subtotals", problems.len());
        ExitCode::FAILURE
    }
}
