// src/orchestrator.rs

//! Multi-architecture build orchestration
//!
//! Runs a [`BuildPlan`] for every architecture in the context. Each
//! architecture gets its own rayon worker that walks the plan in order,
//! so architectures build in parallel while recipes within one
//! architecture build sequentially.
//!
//! # Failure policy
//!
//! - A failed pair never affects other architectures.
//! - Within an architecture, a recipe whose hard dependency failed (or was
//!   itself blocked) is blocked and not attempted. Unrelated recipes still
//!   build.
//! - A failed optional dependency is downgraded: the dependent builds
//!   without it and a warning is logged.
//! - Cancellation stops each worker before its next recipe and terminates
//!   running build steps; cancelled pairs get no marker.
//! - A built pair is done only once its artifacts are collected and its
//!   install tree is staged; otherwise it is reported and recorded as failed.

use crate::aggregate::{ArtifactAggregator, check_declared_collisions};
use crate::arch::Architecture;
use crate::context::BuildContext;
use crate::driver::{BuildDriver, BuildState, StateTable};
use crate::error::{Error, Result};
use crate::exec::{CancelToken, CommandRunner};
use crate::lock::BuildRootLock;
use crate::resolver::BuildPlan;
use crate::source::SourceProvider;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// What happened to one `(recipe, architecture)` pair
#[derive(Debug)]
pub enum PairOutcome {
    Built,
    /// Marker already present; nothing ran
    Cached,
    Failed(Error),
    /// Not attempted because a hard dependency did not complete
    Blocked { dependency: String },
    Cancelled,
}

impl PairOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Built | Self::Cached)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Cached => "cached",
            Self::Failed(_) => "failed",
            Self::Blocked { .. } => "blocked",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "failed: {}", e),
            Self::Blocked { dependency } => write!(f, "blocked by {}", dependency),
            other => write!(f, "{}", other.label()),
        }
    }
}

#[derive(Debug)]
pub struct PairReport {
    pub recipe: String,
    pub outcome: PairOutcome,
    /// Optional dependencies that were unavailable when this pair built
    pub downgraded: Vec<String>,
    /// Aggregated artifact paths
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct ArchReport {
    pub arch: String,
    /// Pairs in build order
    pub pairs: Vec<PairReport>,
}

impl ArchReport {
    pub fn pair(&self, recipe: &str) -> Option<&PairReport> {
        self.pairs.iter().find(|p| p.recipe == recipe)
    }
}

/// Outcome of one invocation across all architectures
#[derive(Debug)]
pub struct BuildReport {
    /// Architectures in context order
    pub archs: Vec<ArchReport>,
    pub states: BTreeMap<(String, String), BuildState>,
    pub duration_secs: u64,
}

/// Pair counts by outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub built: usize,
    pub cached: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.pairs().all(|(_, pair)| pair.outcome.is_ok())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &PairReport)> {
        self.archs
            .iter()
            .flat_map(|a| a.pairs.iter().map(move |p| (a.arch.as_str(), p)))
    }

    pub fn outcome(&self, recipe: &str, arch: &str) -> Option<&PairOutcome> {
        self.archs
            .iter()
            .find(|a| a.arch == arch)
            .and_then(|a| a.pair(recipe))
            .map(|p| &p.outcome)
    }

    /// `(arch, recipe, error)` for every failed pair
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str, &Error)> {
        self.pairs().filter_map(|(arch, pair)| match &pair.outcome {
            PairOutcome::Failed(e) => Some((arch, pair.recipe.as_str(), e)),
            _ => None,
        })
    }

    pub fn was_cancelled(&self) -> bool {
        self.pairs()
            .any(|(_, pair)| matches!(pair.outcome, PairOutcome::Cancelled))
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for (_, pair) in self.pairs() {
            match pair.outcome {
                PairOutcome::Built => summary.built += 1,
                PairOutcome::Cached => summary.cached += 1,
                PairOutcome::Failed(_) => summary.failed += 1,
                PairOutcome::Blocked { .. } => summary.blocked += 1,
                PairOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

pub struct Orchestrator<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn CommandRunner,
    sources: &'a dyn SourceProvider,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        runner: &'a dyn CommandRunner,
        sources: &'a dyn SourceProvider,
    ) -> Self {
        Self {
            ctx,
            runner,
            sources,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build every recipe of the plan for every architecture
    ///
    /// Returns `Err` only for problems that prevent building at all
    /// (artifact collisions in the plan, a locked build root). Per-pair
    /// failures are part of the report.
    pub fn run(&self, plan: &BuildPlan) -> Result<BuildReport> {
        let archs = self.ctx.architectures();
        check_declared_collisions(plan, archs)?;
        let _lock = BuildRootLock::acquire(self.ctx.build_root())?;

        let states = StateTable::new();
        let aggregator = ArtifactAggregator::new(self.ctx);
        let runtime = self
            .ctx
            .runtime_recipe()
            .and_then(|name| plan.get(name))
            .map(|recipe| recipe.as_ref());
        let driver = BuildDriver::new(self.ctx, self.runner, self.sources, &states)
            .with_cancel(self.cancel.clone())
            .with_runtime(runtime);

        info!(
            "Building {} recipe(s) for {}: {}",
            plan.len(),
            archs
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            plan.names().join(" ")
        );
        let started = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(archs.len())
            .thread_name(|i| format!("crossbake-arch-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("Failed to start build workers: {}", e)))?;
        let reports: Vec<ArchReport> = pool.install(|| {
            archs
                .par_iter()
                .map(|arch| self.run_arch(&driver, &aggregator, plan, arch))
                .collect()
        });

        let report = BuildReport {
            archs: reports,
            states: states.snapshot(),
            duration_secs: started.elapsed().as_secs(),
        };
        let summary = report.summary();
        info!(
            "Finished in {}s: {} built, {} cached, {} failed, {} blocked",
            report.duration_secs, summary.built, summary.cached, summary.failed, summary.blocked
        );
        Ok(report)
    }

    fn run_arch(
        &self,
        driver: &BuildDriver<'_>,
        aggregator: &ArtifactAggregator<'_>,
        plan: &BuildPlan,
        arch: &Architecture,
    ) -> ArchReport {
        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut pairs = Vec::with_capacity(plan.len());

        for recipe in plan.recipes() {
            let mut report = PairReport {
                recipe: recipe.name.clone(),
                outcome: PairOutcome::Cancelled,
                downgraded: Vec::new(),
                artifacts: Vec::new(),
            };

            if self.cancel.is_cancelled() {
                pairs.push(report);
                continue;
            }

            if let Some(dep) = recipe.depends.iter().find(|d| !completed.contains(*d)) {
                warn!(
                    "[{} {}] skipped: dependency {} did not build",
                    recipe.name, arch, dep
                );
                report.outcome = PairOutcome::Blocked {
                    dependency: dep.clone(),
                };
                pairs.push(report);
                continue;
            }

            let mut available = BTreeSet::new();
            for opt in recipe.opt_depends.iter().filter(|o| plan.contains(o)) {
                if completed.contains(opt) {
                    available.insert(opt.clone());
                } else {
                    warn!(
                        "[{} {}] optional dependency {} unavailable, building without it",
                        recipe.name, arch, opt
                    );
                    report.downgraded.push(opt.clone());
                }
            }

            let result = driver
                .ensure_built_with(recipe, arch, &available)
                .and_then(|built| {
                    let collected = aggregator
                        .collect(recipe, arch, &built)
                        .and_then(|copied| aggregator.stage(recipe, arch).map(|_| copied));
                    if collected.is_err() {
                        driver.states().mark_failed(&recipe.name, &arch.name);
                    }
                    collected.map(|copied| (built.cached, copied))
                });

            report.outcome = match result {
                Ok((cached, copied)) => {
                    completed.insert(recipe.name.clone());
                    report.artifacts = copied;
                    if cached {
                        PairOutcome::Cached
                    } else {
                        PairOutcome::Built
                    }
                }
                Err(Error::Cancelled) => {
                    warn!("[{} {}] cancelled", recipe.name, arch);
                    PairOutcome::Cancelled
                }
                Err(e) => {
                    error!("[{} {}] {}", recipe.name, arch, e);
                    PairOutcome::Failed(e)
                }
            };
            pairs.push(report);
        }

        ArchReport {
            arch: arch.name.clone(),
            pairs,
        }
    }
}
