//! Command-line interface.

pub mod commands;
pub mod context;
pub mod display;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::errors::DispatchError;
use crate::infrastructure::logging::SecretScrubber;

/// Dispatch checks onto a work queue and keep the run store honest.
#[derive(Parser)]
#[command(name = "vigil", version, about)]
pub struct Cli {
    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from a specific file instead of .vigil/
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter .vigil/config.yaml
    Init(commands::init::InitArgs),
    /// Dispatch a check onto the queue
    Dispatch(commands::dispatch::DispatchArgs),
    /// Inspect run records
    Runs(commands::runs::RunsArgs),
    /// Audit running records against live broker state
    Reconcile(commands::reconcile::ReconcileArgs),
}

/// Exit code for retryable capacity rejections (EX_TEMPFAIL).
const EXIT_CAPACITY: i32 = 75;

/// Print an error (scrubbed of secrets) and exit with a meaningful code.
pub fn handle_error(err: anyhow::Error, json: bool, scrubber: &SecretScrubber) -> ! {
    let retryable = matches!(
        err.downcast_ref::<DispatchError>(),
        Some(e) if e.is_retryable()
    );
    let message = scrubber.scrub(&format!("{err:#}"));

    if json {
        let body = serde_json::json!({
            "error": message,
            "retryable": retryable,
        });
        eprintln!("{body}");
    } else {
        eprintln!("{} {message}", console::style("error:").red().bold());
        if retryable {
            eprintln!("{}", console::style("the queue is at capacity; retry later").dim());
        }
    }

    std::process::exit(if retryable { EXIT_CAPACITY } else { 1 });
}
