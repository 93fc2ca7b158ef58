// src/commands/mod.rs
//! Command handlers for the crossbake CLI

mod build;
mod clean;
mod plan;
mod status;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use plan::{cmd_plan, cmd_recipes};
pub use status::cmd_status;

use crate::cli::ContextArgs;
use anyhow::{Context, Result};
use crossbake::{BuildContext, Config, Registry};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Load the configuration file and apply command line overrides
pub(crate) fn load_config(path: Option<&Path>, args: &ContextArgs) -> Result<Config> {
    let mut config = Config::load_or_default(path).context("Failed to load configuration")?;

    if let Some(dir) = &args.recipes_dir {
        config.recipes_dir = Some(dir.clone());
    }
    if let Some(root) = &args.build_root {
        config.build_root = Some(root.clone());
    }
    if let Some(ndk) = &args.ndk_dir {
        config.ndk_dir = Some(ndk.clone());
    }
    if let Some(sdk) = &args.sdk_dir {
        config.sdk_dir = Some(sdk.clone());
    }
    if let Some(api) = args.api {
        config.ndk_api = Some(api);
    }
    Ok(config)
}

/// Load the recipe registry named by the configuration
pub(crate) fn load_registry(config: &Config) -> Result<Registry> {
    let dir = config.recipes_dir();
    let registry = Registry::load_dir(&dir)
        .with_context(|| format!("Failed to load recipes from {}", dir.display()))?;
    debug!("Loaded {} recipe(s) from {}", registry.len(), dir.display());

    for (recipe, missing) in registry.dangling_references() {
        warn!("Recipe {} refers to unknown recipe {}", recipe, missing);
    }
    Ok(registry)
}

/// Assemble the build context, discovering the NDK/SDK when unset
pub(crate) fn build_context(config: &Config, args: &ContextArgs) -> Result<BuildContext> {
    let ctx = config
        .context_builder(&args.archs)?
        .discover_from_env()
        .finish()
        .context("Invalid build configuration")?;
    debug!(
        "NDK {} (API {}), build root {}",
        ctx.ndk_dir().display(),
        config.api_level(),
        ctx.build_root().display()
    );
    Ok(ctx)
}

/// Recipes directory override only
pub(crate) fn recipes_args(recipes_dir: Option<PathBuf>) -> ContextArgs {
    ContextArgs {
        recipes_dir,
        ..Default::default()
    }
}
