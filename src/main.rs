//! `zap`: parse a journald-format archive, resolve field/value filters to
//! content hashes, remove every entry that matches one, and write the
//! rebuilt archive back out — re-verifying it before declaring success.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use journal_zap::error::JournalError;
use journal_zap::filter::{self, FilterSpec, Policy};
use journal_zap::objects::EntryObject;
use journal_zap::{reader, rebuild, verifier};

/// Remove matching entries from a journald binary log.
#[derive(Debug, Parser)]
#[command(name = "zap", version, about)]
struct Args {
    /// Journal file to read.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Where to write the rebuilt journal.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Field name to match (e.g. `MESSAGE`). May be repeated.
    #[arg(short = 'F', long = "field")]
    field: Vec<String>,

    /// Field value to match, as a case-insensitive substring. May be repeated.
    #[arg(short = 'V', long = "value")]
    value: Vec<String>,

    /// Print every entry, matched or not.
    #[arg(short = 'p', long = "print-all")]
    print_all: bool,

    /// Print every matched entry.
    #[arg(short = 'P', long = "print-matches")]
    print_matches: bool,

    /// Prompt for confirmation before deleting each matched entry.
    #[arg(short = 'c', long = "confirm")]
    confirm: bool,

    /// Assume "yes" to every confirmation prompt (only meaningful with `-c`).
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// Raise log verbosity to debug.
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn prompt_confirm(entry: &EntryObject) -> bool {
    match inquire::Confirm::new(&format!("Delete entry seqnum={}? (Y/n)", entry.seqnum))
        .with_default(true)
        .prompt()
    {
        Ok(answer) => answer,
        Err(_) => false,
    }
}

fn run(args: Args) -> Result<(), JournalError> {
    let bytes = std::fs::read(&args.file).map_err(|e| {
        JournalError::Parse(journal_zap::error::ParseError::Malformed {
            offset: 0,
            reason: format!("failed to read {}: {e}", args.file.display()),
        })
    })?;

    let journal = reader::parse(&bytes)?;
    verifier::verify(&journal)?;

    let policy = Policy {
        print_all: args.print_all,
        print_matches: args.print_matches,
        confirm_matches: args.confirm,
    };

    let mut auto_yes = |_: &EntryObject| true;
    let mut interactive = prompt_confirm;

    let confirm_cb: Option<&mut dyn FnMut(&EntryObject) -> bool> = if args.confirm {
        if args.yes {
            Some(&mut auto_yes)
        } else {
            Some(&mut interactive)
        }
    } else {
        None
    };

    let spec = FilterSpec {
        field_names: args.field,
        field_values: args.value,
        policy,
        confirm: confirm_cb,
    };

    let filtered = filter::filter(&journal, spec)?;
    tracing::info!(removed = filtered.removed_count, kept = filtered.surviving_entries.len(), "filtered entries");

    let rebuilt = rebuild::rebuild(&journal, &filtered)?;

    std::fs::write(&args.output, &rebuilt).map_err(|e| {
        JournalError::Parse(journal_zap::error::ParseError::Malformed {
            offset: 0,
            reason: format!("failed to write {}: {e}", args.output.display()),
        })
    })?;

    let roundtrip = reader::parse(&rebuilt)?;
    verifier::verify(&roundtrip)?;

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
