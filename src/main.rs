//! Push-Up Tally - Main Entry Point
//!
//! Logs in to Telegram as a user, scans a group chat for numeric-only
//! messages newer than the stored watermark, and updates the totals file.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Input, Password};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use pushup_tally::config::{DEFAULT_STATE_FILE, TallySettings, TelegramConfig};
use pushup_tally::tally::{self, Accumulator, ReportFormat, Scanner, SessionOrigin, TallyState};
use pushup_tally::telegram::{GroupHistory, InteractiveLogin, LoginPrompt, TelegramBot, prepare_session_file};

/// Telegram userbot that tallies push-up counts posted to a group chat.
#[derive(Parser, Debug)]
#[command(name = "pushup_tally")]
#[command(about = "Tally numeric-only messages in a Telegram group per user and month")]
#[command(version)]
struct Args {
    /// Path to the totals JSON file.
    #[arg(short, long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Layout of the final report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Monthly)]
    report: ReportFormat,

    /// Keep totals only, without per-month subtotals.
    #[arg(long)]
    no_monthly: bool,
}

/// Reads login answers from the terminal.
#[derive(Debug, Clone, Copy)]
struct TerminalPrompt;

impl LoginPrompt for TerminalPrompt {
    fn phone_number(&self) -> io::Result<String> {
        Input::new()
            .with_prompt("Enter your phone number (with country code)")
            .interact_text()
            .map_err(io::Error::other)
    }

    fn login_code(&self) -> io::Result<String> {
        Input::new()
            .with_prompt("Enter the code you received")
            .interact_text()
            .map_err(io::Error::other)
    }

    fn password(&self, hint: Option<&str>) -> io::Result<String> {
        info!("Password hint: {}", hint.unwrap_or("no hint"));
        Password::new()
            .with_prompt("Enter your 2FA password")
            .interact()
            .map_err(io::Error::other)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config =
        TelegramConfig::from_env().context("Failed to load Telegram configuration from environment")?;

    let mut settings = TallySettings::from_env_with_defaults();

    let mut state = TallyState::load(&args.state_file)
        .with_context(|| format!("Failed to load {}", args.state_file.display()))?;
    settings.track_monthly = state.settle_monthly_mode(settings.track_monthly && !args.no_monthly);

    info!(
        "Loaded {} user totals (watermark {}, month buckets in {})",
        state.totals.len(),
        state.last_processed_id,
        settings.timezone
    );

    prepare_session_file(&tg_config.session_path, &state.session_credential)
        .context("Failed to restore session from stored credential")?;

    // Connect to Telegram
    let bot = TelegramBot::connect(&tg_config, &settings)
        .await
        .context("Failed to connect to Telegram")?;

    let login = InteractiveLogin::new(&bot, &tg_config.api_hash, TerminalPrompt);
    match tally::ensure_credential(&mut state, &args.state_file, &login)
        .await
        .context("Failed to establish a session")?
    {
        SessionOrigin::FreshLogin => {}
        SessionOrigin::Restored => {
            bot.ensure_authorized()
                .await
                .context("Failed to restore session")?;
            info!("Session restored using saved credential.");
        }
    }

    info!("You are logged in!");

    let group = match bot.resolve_group(tg_config.group_id).await {
        Ok(group) => group,
        Err(e) => {
            error!("Failed to find group \"{}\"", tg_config.group_id);
            bot.disconnect();
            return Err(e).context("Failed to resolve group");
        }
    };

    let scanner = Scanner::new(
        Accumulator::new(settings.timezone, settings.track_monthly),
        settings.page_size,
    );
    let history = GroupHistory::new(&bot, group);

    let summary = scanner
        .run(&history, &mut state)
        .await
        .context("Failed to scan group history")?;

    debug!("Scan summary: {:?}", summary);

    let report = tally::render(&state, args.report).context("Failed to render report")?;
    println!("Push-Up Totals:");
    println!("{report}");

    state
        .save(&args.state_file)
        .with_context(|| format!("Failed to save {}", args.state_file.display()))?;

    info!(
        "Push-up totals and session credential written to {}",
        args.state_file.display()
    );

    bot.disconnect();

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
