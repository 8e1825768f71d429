//! Vigil CLI entry point.

use clap::Parser;

use vigil::cli::{context::AppContext, handle_error, Cli, Commands};
use vigil::infrastructure::config::ConfigLoader;
use vigil::infrastructure::logging::{self, SecretScrubber};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let scrubber = SecretScrubber::new();

    let config = match cli.config.as_ref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json, &scrubber),
    };

    logging::init(&config.logging);

    let result = match cli.command {
        // Init needs no database or broker.
        Commands::Init(args) => vigil::cli::commands::init::execute(args, cli.json).await,
        command => match AppContext::init(config, &scrubber).await {
            Ok(ctx) => match command {
                Commands::Dispatch(args) => {
                    vigil::cli::commands::dispatch::execute(args, &ctx, cli.json).await
                }
                Commands::Runs(args) => {
                    vigil::cli::commands::runs::execute(args, &ctx, cli.json).await
                }
                Commands::Reconcile(args) => {
                    vigil::cli::commands::reconcile::execute(args, &ctx, cli.json).await
                }
                Commands::Init(_) => unreachable!(),
            },
            Err(err) => Err(err),
        },
    };

    if let Err(err) = result {
        handle_error(err, cli.json, &scrubber);
    }
}
