//! `vigil reconcile`: audit running records against broker state.

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use crate::cli::context::AppContext;

#[derive(Args)]
pub struct ReconcileArgs {
    /// Keep reconciling on the configured interval instead of one pass
    #[arg(long)]
    pub watch: bool,
}

pub async fn execute(args: ReconcileArgs, ctx: &AppContext, json: bool) -> Result<()> {
    if args.watch {
        let interval = Duration::from_secs(ctx.config.reconciler.interval_secs);
        if !json {
            println!(
                "Reconciling every {}s (ctrl-c to stop)",
                interval.as_secs()
            );
        }
        ctx.reconciler.run_forever(interval).await;
        return Ok(());
    }

    let report = ctx.reconciler.reconcile().await?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "inspected": report.inspected,
                "corrected": report.corrected,
            })
        );
    } else {
        println!(
            "Inspected {} running run(s), corrected {}",
            report.inspected, report.corrected
        );
    }
    Ok(())
}
