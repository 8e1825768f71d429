//! `vigil runs`: inspect run records.

use anyhow::Result;
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::display::table::format_runs_table;
use crate::domain::models::RunStatus;
use crate::domain::ports::RunFilters;

#[derive(Args)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsCommand,
}

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List runs, newest first
    List {
        /// Filter by status (queued, running, passed, failed, error, timeout)
        #[arg(long)]
        status: Option<String>,

        /// Filter by job id
        #[arg(long)]
        job_id: Option<Uuid>,

        /// Maximum rows
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one run in full
    Show {
        /// Run id
        id: Uuid,
    },
}

pub async fn execute(args: RunsArgs, ctx: &AppContext, json: bool) -> Result<()> {
    match args.command {
        RunsCommand::List {
            status,
            job_id,
            limit,
        } => {
            let status = match status.as_deref() {
                Some(s) => Some(
                    RunStatus::from_str(s)
                        .ok_or_else(|| anyhow::anyhow!("unknown status filter: {s}"))?,
                ),
                None => None,
            };
            let runs = ctx
                .runs
                .list(RunFilters {
                    status,
                    job_id,
                    queue_class: None,
                    limit: Some(limit),
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No runs found.");
            } else {
                println!("{}", format_runs_table(&runs));
                println!("\nShowing {} run(s)", runs.len());
            }
        }
        RunsCommand::Show { id } => {
            let run = ctx
                .runs
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Run {id} not found"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                println!("Run Details:");
                println!("  ID: {}", run.id);
                println!("  Job: {}", run.job_id);
                println!("  Status: {}", run.status.as_str());
                println!("  Trigger: {}", run.trigger.as_str());
                println!("  Queue class: {}", run.queue_class);
                if let Some(position) = run.queue_position {
                    println!("  Queue position: {position}");
                }
                if let Some(engine) = &run.engine {
                    println!("  Engine: {engine}");
                }
                if let Some(location) = &run.location {
                    println!("  Location: {location}");
                }
                println!(
                    "  Started: {}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if let Some(completed) = run.completed_at {
                    println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                if let Some(duration) = run.duration_ms {
                    println!("  Duration: {duration} ms");
                }
                if let Some(detail) = &run.error_detail {
                    println!("  Error: {detail}");
                }
            }
        }
    }
    Ok(())
}
