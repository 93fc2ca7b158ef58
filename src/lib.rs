// src/lib.rs

//! crossbake: recipe-driven cross-compilation for Android
//!
//! Recipes describe third-party libraries and how to build them. A build
//! request names a set of recipes; crossbake resolves the transitive
//! closure into a build order and then builds every recipe for every
//! requested architecture.
//!
//! # Architecture
//!
//! - Resolver: recipe closure, conflict checks and topological ordering
//! - Environment: per-`(recipe, arch)` toolchain variables
//! - Driver: idempotent builds guarded by completion markers
//! - Orchestrator: one worker per architecture, failure isolation
//! - Aggregator: collects artifacts into `libs_dir/<arch>/`

pub mod aggregate;
pub mod arch;
pub mod config;
pub mod context;
pub mod driver;
pub mod env;
mod error;
pub mod exec;
pub mod lock;
pub mod orchestrator;
pub mod recipe;
pub mod resolver;
pub mod source;

pub use arch::Architecture;
pub use config::Config;
pub use context::{BuildContext, BuildContextBuilder};
pub use error::{Error, Result};
pub use orchestrator::{BuildReport, Orchestrator, PairOutcome};
pub use recipe::{Recipe, Registry};
pub use resolver::{BuildPlan, resolve};
