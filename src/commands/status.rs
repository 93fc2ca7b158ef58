// src/commands/status.rs

//! Status command - marker state per recipe and architecture

use super::{build_context, load_config, load_registry};
use crate::cli::ContextArgs;
use anyhow::Result;
use crossbake::driver::{FailureRecord, Marker};
use std::path::Path;

pub fn cmd_status(config_path: Option<&Path>, recipes: &[String], args: &ContextArgs) -> Result<()> {
    let config = load_config(config_path, args)?;
    let registry = load_registry(&config)?;
    let ctx = build_context(&config, args)?;

    let names: Vec<String> = if recipes.is_empty() {
        registry
            .names()
            .filter(|name| ctx.builds_dir().join(name).is_dir())
            .map(str::to_string)
            .collect()
    } else {
        recipes.to_vec()
    };

    if names.is_empty() {
        println!("Nothing built under {}", ctx.build_root().display());
        return Ok(());
    }

    let mut stale = 0;
    let mut failed = 0;
    for name in &names {
        let Some(recipe) = registry.get(name) else {
            println!("{:<20} unknown recipe", name);
            continue;
        };
        println!("{} {}", recipe.name, recipe.version_str());

        let fingerprint = recipe.fingerprint();
        for arch in ctx.architectures() {
            let dirs = ctx.work_dirs(&recipe.name, arch);
            let state = match Marker::read(&dirs.marker)? {
                None => match FailureRecord::read(&dirs.failure)? {
                    Some(record) => {
                        failed += 1;
                        format!(
                            "failed {} at step '{}' (run clean to retry)",
                            record.failed_at.format("%Y-%m-%d %H:%M:%S"),
                            record.step
                        )
                    }
                    None => "not built".to_string(),
                },
                Some(marker) if marker.fingerprint != fingerprint => {
                    stale += 1;
                    format!(
                        "done {} (stale: recipe changed, run clean to rebuild)",
                        marker.completed_at.format("%Y-%m-%d %H:%M:%S")
                    )
                }
                Some(marker) => format!("done {}", marker.completed_at.format("%Y-%m-%d %H:%M:%S")),
            };
            println!("  {:<12} {}", arch.name, state);
        }
    }

    if stale > 0 || failed > 0 {
        println!("\n{} stale pair(s), {} failed pair(s)", stale, failed);
    }
    Ok(())
}
