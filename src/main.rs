// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use crossbake::exec::CancelToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Build {
            recipes,
            context,
            jobs,
            step_timeout,
        } => {
            let cancel = CancelToken::new();
            watch_interrupt(cancel.clone());
            commands::cmd_build(config, &recipes, &context, jobs, step_timeout, cancel)
        }
        Commands::Plan {
            recipes,
            recipes_dir,
        } => commands::cmd_plan(config, &recipes, recipes_dir),
        Commands::Clean {
            recipe,
            context,
            dependents,
        } => commands::cmd_clean(config, &recipe, &context, dependents),
        Commands::Status { recipes, context } => commands::cmd_status(config, &recipes, &context),
        Commands::Recipes { recipes_dir } => commands::cmd_recipes(config, recipes_dir),
    }
}

/// Cancel running builds on the first Ctrl-C, exit on the second
fn watch_interrupt(cancel: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("crossbake-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted; stopping builds (press Ctrl-C again to abort)");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });

    if let Err(e) = spawned {
        warn!("Ctrl-C handling unavailable: {}", e);
    }
}
