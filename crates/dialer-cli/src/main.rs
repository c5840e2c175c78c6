//! Dialer operator console
//!
//! ```text
//! dialer preview --contacts leads.csv
//! dialer numbers
//! dialer run --contacts leads.csv --from +15550001111 --message "Hi from the clinic"
//! ```

mod output;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use dialer_core::import::{parse_contacts, ImportReport};
use dialer_core::{
    setup_logging, CallMode, CallSequencer, CampaignBackend, CountryCode, DialerConfig,
    FeedbackSink, HttpBackend, NoFeedback, RunState, SequencerEvent, TerminalBell,
};

#[derive(Parser, Debug)]
#[command(
    name = "dialer",
    author,
    version,
    about = "Outbound call campaign console",
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "DIALER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a contact sheet and show the resulting queue
    Preview {
        /// CSV file with a phone column
        #[arg(long)]
        contacts: PathBuf,

        /// Prefix for 10-digit numbers, e.g. +1
        #[arg(long)]
        country_code: Option<String>,
    },
    /// List caller-ID numbers available to the account
    Numbers,
    /// Run an IVR blast campaign over a contact sheet
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// CSV file with a phone column
    #[arg(long)]
    contacts: PathBuf,

    /// Caller-ID number to dial from
    #[arg(long)]
    from: Option<String>,

    /// Message played when the callee answers
    #[arg(short, long)]
    message: Option<String>,

    /// Instructions for the AI agent on the call
    #[arg(long)]
    ai_prompt: Option<String>,

    /// Number callees are forwarded to on request
    #[arg(long)]
    forward: Option<String>,

    /// Pause between calls in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Prefix for 10-digit numbers, e.g. +1
    #[arg(long)]
    country_code: Option<String>,

    /// Ring the terminal bell on each outcome
    #[arg(long)]
    bell: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        DialerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    setup_logging(config.logging.to_logging_config()?)?;

    match cli.command {
        Command::Preview {
            contacts,
            country_code,
        } => {
            if let Some(code) = country_code {
                config.campaign.country_code = code.parse()?;
            }
            preview(&contacts, &config.campaign.country_code)
        }
        Command::Numbers => numbers(&config).await,
        Command::Run(args) => run(config, args).await,
    }
}

fn import(path: &Path, country_code: &CountryCode) -> anyhow::Result<ImportReport> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let report = parse_contacts(file, country_code)
        .with_context(|| format!("cannot import {}", path.display()))?;
    if report.skipped_rows > 0 {
        warn!(skipped = report.skipped_rows, "Rows without a phone number were skipped");
    }
    Ok(report)
}

fn preview(path: &Path, country_code: &CountryCode) -> anyhow::Result<()> {
    let report = import(path, country_code)?;
    println!("{}", output::contacts_table(&report.contacts));
    println!(
        "{} contacts, {} rows skipped",
        report.contacts.len().to_string().bold(),
        report.skipped_rows
    );
    for contact in output::undialable(&report.contacts) {
        println!(
            "{} {} ({}) does not look dialable",
            "!".yellow().bold(),
            contact.name,
            contact.original_phone
        );
    }
    Ok(())
}

async fn numbers(config: &DialerConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let numbers = backend
        .list_from_numbers()
        .await
        .context("failed to list caller-ID numbers")?;
    if numbers.is_empty() {
        println!("No caller-ID numbers on this account");
    } else {
        println!("{}", output::numbers_table(&numbers));
    }
    Ok(())
}

async fn run(mut config: DialerConfig, args: RunArgs) -> anyhow::Result<()> {
    let campaign = &mut config.campaign;
    if let Some(from) = args.from {
        campaign.from_number = Some(from);
    }
    if let Some(message) = args.message {
        campaign.intro_message = message;
    }
    if args.ai_prompt.is_some() {
        campaign.ai_prompt = args.ai_prompt;
    }
    if args.forward.is_some() {
        campaign.forward_number = args.forward;
    }
    if let Some(code) = args.country_code {
        campaign.country_code = code.parse()?;
    }
    if let Some(delay) = args.delay_ms {
        config.sequencer.call_delay_ms = delay;
    }
    if config.sequencer.mode != CallMode::IvrBlast {
        warn!(
            mode = %config.sequencer.mode,
            "The console has no voice device; running as IVR blast"
        );
        config.sequencer.mode = CallMode::IvrBlast;
    }

    let report = import(&args.contacts, &config.campaign.country_code)?;
    let contacts = report.contacts.clone();

    let feedback: Arc<dyn FeedbackSink> = if args.bell {
        Arc::new(TerminalBell)
    } else {
        Arc::new(NoFeedback)
    };
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let sequencer = CallSequencer::builder(backend)
        .campaign(config.campaign.clone())
        .config(config.sequencer.clone())
        .feedback(feedback)
        .build();

    sequencer.load_contacts(report.contacts).await?;
    let mut events = sequencer.subscribe();
    if let Err(e) = sequencer.start().await {
        if e.is_configuration_error() {
            bail!("cannot start campaign: {e} (check --from, --message and the contact sheet)");
        }
        return Err(e.into());
    }
    info!(contacts = contacts.len(), "Campaign started; press Ctrl-C to pause");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if let Err(e) = sequencer.pause().await {
                    warn!(error = %e, "Pause failed");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    output::print_event(&event, &contacts);
                    let done = matches!(
                        event,
                        SequencerEvent::Finished { .. } | SequencerEvent::Halted { .. }
                    );
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Console fell behind sequencer events")
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let snapshot = sequencer.snapshot().await;
    output::print_summary(&snapshot);
    if let RunState::Halted { reason } = snapshot.run_state {
        bail!("campaign halted: {reason}");
    }
    Ok(())
}
