use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};
use temp_print::{Cadence, EntryKind, EphemeralPrinter, PrintOptions};

/// Show each message on a single line for a while, then erase it.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Seconds each message stays visible
    #[arg(short, long, default_value_t = 2.0)]
    duration: f64,

    /// Seconds between skip checks; leave out to wait each message out in full,
    /// 0 to poll continuously
    #[arg(short, long)]
    cadence: Option<f64>,

    /// Print the messages as ordinary lines instead of erasing them
    #[arg(short, long)]
    persistent: bool,

    /// Seconds to wait before each message appears
    #[arg(long, default_value_t = 0.0)]
    pre_delay: f64,

    /// Where to write the log; stdout is taken by the messages
    #[arg(long, default_value = "temp-print.log")]
    log_file: PathBuf,

    #[arg(long, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,

    #[arg(required = true)]
    messages: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = File::create(&args.log_file)
        .with_context(|| format!("could not create log file {}", args.log_file.display()))?;
    WriteLogger::init(args.log_level, Config::default(), log_file)?;

    let printer = EphemeralPrinter::builder()
        .default_display_duration(args.duration)
        .refresh_cadence(Cadence::from_secs(args.cadence))
        .build()?;

    let kind = if args.persistent {
        EntryKind::Persistent
    } else {
        EntryKind::Ephemeral
    };
    let options = PrintOptions {
        kind,
        ..PrintOptions::new()
    }
    .flush()
    .pre_delay(args.pre_delay);

    for message in &args.messages {
        printer
            .print([message], &options)
            .with_context(|| format!("can't show {:?}", message))?;
    }
    info!("queued {} messages", args.messages.len());

    printer.wait()?;
    Ok(())
}
