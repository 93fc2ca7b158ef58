// src/commands/plan.rs

//! Plan and recipes commands - inspect resolution without building

use super::{load_config, load_registry, recipes_args};
use anyhow::Result;
use crossbake::recipe::Source;
use crossbake::resolver::{Requirement, resolve_requirements};
use std::path::{Path, PathBuf};

/// Print the build order for the requested recipes
pub fn cmd_plan(
    config_path: Option<&Path>,
    recipes: &[String],
    recipes_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, &recipes_args(recipes_dir))?;
    let registry = load_registry(&config)?;

    let requested = recipes
        .iter()
        .map(|r| Requirement::parse(r))
        .collect::<crossbake::Result<Vec<_>>>()?;
    let plan = resolve_requirements(&registry, &requested)?;

    println!("Build order ({} recipe(s)):", plan.len());
    for (i, recipe) in plan.recipes().iter().enumerate() {
        let mut line = format!("{:>3}. {} {}", i + 1, recipe.name, recipe.version_str());

        let opt: Vec<&str> = recipe
            .opt_depends
            .iter()
            .filter(|o| plan.contains(o))
            .map(String::as_str)
            .collect();
        if !recipe.depends.is_empty() {
            let deps: Vec<&str> = recipe.depends.iter().map(String::as_str).collect();
            line.push_str(&format!("  depends: {}", deps.join(", ")));
        }
        if !opt.is_empty() {
            line.push_str(&format!("  optional: {}", opt.join(", ")));
        }
        println!("{}", line);
    }
    Ok(())
}

/// List every recipe in the registry
pub fn cmd_recipes(config_path: Option<&Path>, recipes_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, &recipes_args(recipes_dir))?;
    let registry = load_registry(&config)?;

    if registry.is_empty() {
        println!("No recipes found in {}", config.recipes_dir().display());
        return Ok(());
    }

    for recipe in registry.iter() {
        let source = match &recipe.source {
            Source::None => "-".to_string(),
            Source::Path(path) => path.display().to_string(),
            Source::Url(_) => recipe.url().unwrap_or_default(),
        };
        println!("{:<20} {:<12} {}", recipe.name, recipe.version_str(), source);
        if !recipe.depends.is_empty() {
            let deps: Vec<&str> = recipe.depends.iter().map(String::as_str).collect();
            println!("    depends: {}", deps.join(", "));
        }
        if !recipe.conflicts.is_empty() {
            let conflicts: Vec<&str> = recipe.conflicts.iter().map(String::as_str).collect();
            println!("    conflicts: {}", conflicts.join(", "));
        }
    }
    println!("\n{} recipe(s)", registry.len());
    Ok(())
}
