//! `vigil dispatch`: validate, resolve, and submit a check.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::domain::models::{
    CheckTask, ExecutionProfile, ProjectScope, ScriptSpec, TriggerSource,
};

#[derive(Args)]
pub struct DispatchArgs {
    /// Job (check definition) identifier; generated when omitted
    #[arg(long)]
    pub job_id: Option<Uuid>,

    /// Script file to execute; repeat for multi-script load tests
    #[arg(long = "script", required = true, value_name = "FILE")]
    pub scripts: Vec<PathBuf>,

    /// Execution profile
    #[arg(long, value_parser = ["browser", "loadtest"], default_value = "browser")]
    pub profile: String,

    /// Geographic location hint for load tests
    #[arg(long)]
    pub location: Option<String>,

    /// Project scope for variable resolution
    #[arg(long, default_value = "default")]
    pub scope: String,

    /// What initiated this run
    #[arg(long, value_parser = ["manual", "scheduled", "remote"], default_value = "manual")]
    pub trigger: String,
}

pub async fn execute(args: DispatchArgs, ctx: &AppContext, json: bool) -> Result<()> {
    let mut scripts = Vec::with_capacity(args.scripts.len());
    for path in &args.scripts {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        scripts.push(ScriptSpec::new(name, body));
    }

    let profile = match args.profile.as_str() {
        "loadtest" => ExecutionProfile::LoadTest {
            location: args.location.clone(),
        },
        _ => ExecutionProfile::Browser,
    };

    let mut task = CheckTask::new(
        args.job_id.unwrap_or_else(Uuid::new_v4),
        profile,
        scripts,
    );
    if let Some(location) = args.location {
        task = task.with_location_hint(location);
    }

    let trigger = TriggerSource::from_str(&args.trigger).unwrap_or_default();
    let scope = ProjectScope::new(args.scope);

    let outcome = ctx.dispatcher.dispatch(task, &scope, trigger).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "run_id": outcome.run_id,
                "status": outcome.status.as_str(),
                "queue_position": outcome.queue_position,
            })
        );
    } else {
        println!("Run dispatched.");
        println!("  Run ID: {}", outcome.run_id);
        println!("  Status: {}", outcome.status.as_str());
        if let Some(position) = outcome.queue_position {
            println!("  Queue position: {position}");
        }
    }
    Ok(())
}
