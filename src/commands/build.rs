// src/commands/build.rs

//! Build command - resolve and cross-compile for every architecture

use super::{build_context, load_config, load_registry};
use crate::cli::ContextArgs;
use anyhow::{Context, Result, bail};
use crossbake::exec::{CancelToken, ProcessRunner};
use crossbake::orchestrator::{BuildReport, PairOutcome};
use crossbake::resolver::{Requirement, resolve_requirements};
use crossbake::source::PreparedSources;
use crossbake::Orchestrator;
use std::path::Path;
use tracing::info;

/// Build the requested recipes
///
/// Fails if any `(recipe, arch)` pair did not complete.
pub fn cmd_build(
    config_path: Option<&Path>,
    recipes: &[String],
    args: &ContextArgs,
    jobs: Option<usize>,
    step_timeout: Option<u64>,
    cancel: CancelToken,
) -> Result<()> {
    let mut config = load_config(config_path, args)?;
    if jobs.is_some() {
        config.jobs = jobs;
    }
    if step_timeout.is_some() {
        config.step_timeout_secs = step_timeout;
    }

    let registry = load_registry(&config)?;
    let requested = recipes
        .iter()
        .map(|r| Requirement::parse(r))
        .collect::<crossbake::Result<Vec<_>>>()?;
    let plan = resolve_requirements(&registry, &requested).context("Resolution failed")?;
    info!("Build order: {}", plan.names().join(" -> "));

    let ctx = build_context(&config, args)?;
    let runner = ProcessRunner::new().with_timeout(ctx.step_timeout());
    let sources = PreparedSources::new(ctx.packages_dir());

    let report = Orchestrator::new(&ctx, &runner, &sources)
        .with_cancel(cancel)
        .run(&plan)?;

    print_report(&report);
    println!("\nLibraries collected in {}", ctx.libs_dir().display());

    if report.was_cancelled() {
        bail!("Build cancelled");
    }
    let summary = report.summary();
    if summary.failed + summary.blocked > 0 {
        bail!(
            "{} pair(s) failed, {} blocked",
            summary.failed,
            summary.blocked
        );
    }
    Ok(())
}

fn print_report(report: &BuildReport) {
    for arch in &report.archs {
        println!("\n[{}]", arch.arch);
        for pair in &arch.pairs {
            let marker = match pair.outcome {
                PairOutcome::Built | PairOutcome::Cached => "[OK]",
                PairOutcome::Failed(_) => "[FAILED]",
                PairOutcome::Blocked { .. } => "[SKIPPED]",
                PairOutcome::Cancelled => "[CANCELLED]",
            };
            println!("  {:<11} {:<20} {}", marker, pair.recipe, pair.outcome);
            if !pair.downgraded.is_empty() {
                println!("              built without: {}", pair.downgraded.join(", "));
            }
        }
    }

    let summary = report.summary();
    println!(
        "\n{} built, {} cached, {} failed, {} blocked in {}s",
        summary.built, summary.cached, summary.failed, summary.blocked, report.duration_secs
    );
}
