// src/commands/clean.rs

//! Clean command - drop markers and work directories for explicit retry

use super::{build_context, load_config, load_registry};
use crate::cli::ContextArgs;
use anyhow::Result;
use crossbake::driver::clean_pair;
use crossbake::lock::BuildRootLock;
use crossbake::resolver::registry_graph;
use crossbake::Error;

pub fn cmd_clean(
    config_path: Option<&std::path::Path>,
    recipe: &str,
    args: &ContextArgs,
    dependents: bool,
) -> Result<()> {
    let config = load_config(config_path, args)?;
    let registry = load_registry(&config)?;
    if !registry.contains(recipe) {
        return Err(Error::UnknownRecipe {
            name: recipe.to_string(),
            required_by: None,
        }
        .into());
    }

    let mut names = vec![recipe.to_string()];
    if dependents {
        names.extend(registry_graph(&registry).transitive_dependents(recipe));
    }

    let ctx = build_context(&config, args)?;
    let _lock = BuildRootLock::acquire(ctx.build_root())?;

    let mut cleaned = 0;
    for name in &names {
        let Some(recipe) = registry.get(name) else {
            continue;
        };
        for arch in ctx.architectures() {
            if clean_pair(&ctx, recipe, arch)? {
                println!("Cleaned {} ({})", recipe.name, arch);
                cleaned += 1;
            }
        }
    }

    if cleaned == 0 {
        println!("Nothing to clean");
    }
    Ok(())
}
