// src/cli.rs
//! CLI definitions for crossbake
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crossbake")]
#[command(version)]
#[command(about = "Cross-compile recipe dependency trees for Android architectures", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (default: ./crossbake.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that touches a build root
#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
    /// Target architecture (repeatable; overrides the configured list)
    #[arg(short, long = "arch", value_name = "ABI")]
    pub archs: Vec<String>,

    /// Directory holding recipe files
    #[arg(long)]
    pub recipes_dir: Option<PathBuf>,

    /// Build root for work directories and markers
    #[arg(long)]
    pub build_root: Option<PathBuf>,

    /// Android NDK location
    #[arg(long)]
    pub ndk_dir: Option<PathBuf>,

    /// Android SDK location
    #[arg(long)]
    pub sdk_dir: Option<PathBuf>,

    /// Android API level
    #[arg(long)]
    pub api: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build recipes and their dependencies for every architecture
    Build {
        /// Recipes to build (`name` or `name==version`)
        #[arg(required = true)]
        recipes: Vec<String>,

        #[command(flatten)]
        context: ContextArgs,

        /// Parallel jobs passed to make/cmake
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Kill a build step after this many seconds
        #[arg(long, value_name = "SECS")]
        step_timeout: Option<u64>,
    },

    /// Print the resolved build order without building
    Plan {
        /// Requested recipes
        #[arg(required = true)]
        recipes: Vec<String>,

        /// Directory holding recipe files
        #[arg(long)]
        recipes_dir: Option<PathBuf>,
    },

    /// Remove markers and build directories so recipes rebuild
    Clean {
        /// Recipe to clean
        recipe: String,

        #[command(flatten)]
        context: ContextArgs,

        /// Also clean every recipe that depends on it
        #[arg(long)]
        dependents: bool,
    },

    /// Show completion state per architecture
    Status {
        /// Recipes to inspect (default: every recipe with a build directory)
        recipes: Vec<String>,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// List available recipes
    Recipes {
        /// Directory holding recipe files
        #[arg(long)]
        recipes_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_args() {
        let cli = Cli::try_parse_from([
            "crossbake", "-v", "build", "grpc", "kivy==2.0", "--arch", "x86", "-a", "arm64-v8a",
            "-j", "4",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Build {
                recipes,
                context,
                jobs,
                ..
            } => {
                assert_eq!(recipes, vec!["grpc", "kivy==2.0"]);
                assert_eq!(context.archs, vec!["x86", "arm64-v8a"]);
                assert_eq!(jobs, Some(4));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_build_requires_recipe() {
        assert!(Cli::try_parse_from(["crossbake", "build"]).is_err());
    }
}
