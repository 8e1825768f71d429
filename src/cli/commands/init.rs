//! `vigil init`: write a starter project config.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::domain::models::Config;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: InitArgs, json: bool) -> Result<()> {
    let config_dir = args.dir.join(".vigil");
    let config_path = config_dir.join("config.yaml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let rendered = serde_yaml::to_string(&Config::default())
        .context("Failed to render default config")?;
    std::fs::write(&config_path, rendered)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "created": config_path.display().to_string() })
        );
    } else {
        println!("Wrote {}", config_path.display());
        println!("Edit capacity ceilings and broker.base_url before dispatching.");
    }
    Ok(())
}
