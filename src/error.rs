// src/error.rs

//! Error types for recipe resolution and cross-builds
//!
//! Resolution errors (`UnknownRecipe`, `Cycle`, `Conflict`, `InvalidRequest`)
//! abort an invocation before any build starts. Build errors are scoped to a
//! single `(recipe, architecture)` pair and always carry both names.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A requested recipe, or a dependency of one, is not in the registry
    #[error("Unknown recipe '{name}'{}", required_by_suffix(.required_by))]
    UnknownRecipe {
        name: String,
        required_by: Option<String>,
    },

    /// The hard dependency graph contains a cycle
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// Two selected recipes conflict, or a recipe depends on something it conflicts with
    #[error("Recipe '{first}' conflicts with '{second}'")]
    Conflict { first: String, second: String },

    /// Malformed build request (bad pin syntax, contradicting pins, empty request)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A recipe declaration is unusable
    #[error("Invalid recipe '{name}': {reason}")]
    InvalidRecipe { name: String, reason: String },

    /// An external build step exited unsuccessfully
    #[error(
        "Build of '{recipe}' for {arch} failed at step '{step}' ({}){}",
        status_text(.status),
        tail_suffix(.output_tail)
    )]
    BuildFailure {
        recipe: String,
        arch: String,
        step: String,
        status: Option<i32>,
        output_tail: String,
    },

    /// The build succeeded but declared artifacts were not produced
    #[error(
        "Recipe '{recipe}' for {arch} did not produce {} in {}",
        .missing.join(", "),
        .dir.display()
    )]
    ArtifactMissing {
        recipe: String,
        arch: String,
        missing: Vec<String>,
        dir: PathBuf,
    },

    /// Two recipes claim the same output filename for one architecture
    #[error("Artifact '{artifact}' for {arch} is claimed by both '{first}' and '{second}'")]
    ArtifactCollision {
        arch: String,
        artifact: String,
        first: String,
        second: String,
    },

    /// Sources for a recipe could not be prepared
    #[error("Sources for '{recipe}' unavailable: {reason}")]
    SourceUnavailable { recipe: String, reason: String },

    /// The operator interrupted the build
    #[error("Build cancelled")]
    Cancelled,

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Recipe, config or marker parse failure
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised while computing the build plan
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownRecipe { .. }
                | Error::Cycle { .. }
                | Error::Conflict { .. }
                | Error::InvalidRequest(_)
                | Error::ArtifactCollision { .. }
        )
    }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{}')", parent),
        None => String::new(),
    }
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated".to_string(),
    }
}

fn tail_suffix(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!("\n--- last output ---\n{}", tail)
    }
}
