// src/driver/mod.rs

//! Per-pair build driver
//!
//! [`BuildDriver::ensure_built`] takes one `(recipe, architecture)` pair to
//! `done` or `failed`:
//!
//! 1. If the pair's completion marker exists, return immediately.
//! 2. Move the pair to `building`, clear and recreate its work directory.
//! 3. Prepare sources, compute the pair environment and run the recipe's
//!    build procedure with the work directory and environment.
//! 4. Verify that every declared artifact exists in the artifact directory.
//! 5. Write the marker atomically and move the pair to `done`.
//!
//! Any failure leaves the marker unset, writes a failure record and leaves
//! the pair `failed`. A recorded failure is returned as-is by later
//! invocations until the pair is cleaned. Cancellation records nothing, so a
//! cancelled pair is pending again on the next run.

pub mod marker;
pub mod state;

pub use marker::{FailureRecord, Marker};
pub use state::{BuildState, StateTable};

use crate::arch::Architecture;
use crate::context::{BuildContext, WorkDirs};
use crate::env::{EnvironmentBuilder, RecipeEnv};
use crate::error::{Error, Result};
use crate::exec::{BuildLog, CancelToken, CommandRunner};
use crate::recipe::{BuildJob, Recipe};
use crate::source::SourceProvider;
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of bringing a pair to `done`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairBuild {
    /// True if the marker was already present and nothing ran
    pub cached: bool,
    pub artifact_dir: PathBuf,
    /// Declared artifacts, as absolute paths inside `artifact_dir`
    pub artifacts: Vec<PathBuf>,
}

pub struct BuildDriver<'a> {
    ctx: &'a BuildContext,
    runner: &'a dyn CommandRunner,
    sources: &'a dyn SourceProvider,
    states: &'a StateTable,
    cancel: CancelToken,
    runtime: Option<&'a Recipe>,
}

impl<'a> BuildDriver<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        runner: &'a dyn CommandRunner,
        sources: &'a dyn SourceProvider,
        states: &'a StateTable,
    ) -> Self {
        Self {
            ctx,
            runner,
            sources,
            states,
            cancel: CancelToken::new(),
            runtime: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Recipe whose include/link roots are exposed to its dependents
    pub fn with_runtime(mut self, runtime: Option<&'a Recipe>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn states(&self) -> &StateTable {
        self.states
    }

    pub fn environment(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        available_opt_depends: &BTreeSet<String>,
    ) -> RecipeEnv {
        EnvironmentBuilder::new(self.ctx)
            .with_runtime(self.runtime)
            .build(recipe, arch, available_opt_depends)
    }

    /// Build a pair unless its marker already exists
    pub fn ensure_built(&self, recipe: &Recipe, arch: &Architecture) -> Result<PairBuild> {
        self.ensure_built_with(recipe, arch, &BTreeSet::new())
    }

    /// Like [`ensure_built`](Self::ensure_built), exposing the given
    /// optional dependencies as available
    pub fn ensure_built_with(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        available_opt_depends: &BTreeSet<String>,
    ) -> Result<PairBuild> {
        let dirs = self.ctx.work_dirs(&recipe.name, arch);
        let env = self.environment(recipe, arch, available_opt_depends);

        if Marker::exists(&dirs.marker) {
            debug!("[{} {}] already built, skipping", recipe.name, arch);
            self.states.mark_done(&recipe.name, &arch.name);
            return Ok(pair_build(recipe, &env, true));
        }

        match FailureRecord::read(&dirs.failure) {
            Ok(None) => {}
            Ok(Some(record)) => {
                warn!(
                    "[{} {}] failed in an earlier run at step '{}'; clean it to retry",
                    recipe.name, arch, record.step
                );
                self.states.mark_failed(&recipe.name, &arch.name);
                return Err(record.into_error());
            }
            Err(e) => {
                self.states.mark_failed(&recipe.name, &arch.name);
                return Err(e);
            }
        }

        match self.states.begin(&recipe.name, &arch.name) {
            Ok(()) => {}
            Err(BuildState::Done) => return Ok(pair_build(recipe, &env, true)),
            Err(state) => {
                return Err(Error::InvalidRequest(format!(
                    "'{}' for {} is already {} in this invocation",
                    recipe.name, arch, state
                )));
            }
        }

        info!("Building {} {} for {}...", recipe.name, recipe.version_str(), arch);
        let started = Instant::now();

        let result = self
            .build_pair(recipe, arch, &dirs, &env)
            .and_then(|artifacts| {
                let marker = Marker {
                    recipe: recipe.name.clone(),
                    version: recipe.version.clone(),
                    arch: arch.name.clone(),
                    fingerprint: recipe.fingerprint(),
                    artifacts,
                    completed_at: Utc::now(),
                    duration_secs: Some(started.elapsed().as_secs()),
                };
                marker.write(&dirs.marker)
            });

        match result {
            Ok(()) => {
                self.states.finish(&recipe.name, &arch.name, true);
                info!(
                    "Built {} for {} in {}s",
                    recipe.name,
                    arch,
                    started.elapsed().as_secs()
                );
                Ok(pair_build(recipe, &env, false))
            }
            Err(e) => {
                self.states.finish(&recipe.name, &arch.name, false);
                debug!("[{} {}] failed: {}", recipe.name, arch, e);
                if !matches!(e, Error::Cancelled) {
                    record_failure(recipe, arch, &dirs, &e);
                }
                Err(e)
            }
        }
    }

    fn build_pair(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        dirs: &WorkDirs,
        env: &RecipeEnv,
    ) -> Result<Vec<PathBuf>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        reset_work_dirs(dirs)?;
        fs::create_dir_all(self.ctx.staging_dir(arch))?;
        fs::create_dir_all(self.ctx.arch_libs_dir(arch))?;

        self.sources.prepare(recipe, arch, &dirs.source)?;

        let log = BuildLog::create(&dirs.log_file)?;
        log.line(&format!(
            "# {} {} for {} ({})",
            recipe.name,
            recipe.version_str(),
            arch,
            arch.compiler_target()
        ))?;

        let job = BuildJob::new(
            recipe,
            arch,
            env,
            dirs,
            self.ctx,
            self.runner,
            &self.cancel,
            &log,
        );
        recipe.procedure().build(&job)?;

        verify_artifacts(recipe, arch, env.artifact_dir())
    }
}

/// Remove a pair's work directory and its aggregated artifacts
///
/// Returns true if anything was removed.
pub fn clean_pair(ctx: &BuildContext, recipe: &Recipe, arch: &Architecture) -> Result<bool> {
    let dirs = ctx.work_dirs(&recipe.name, arch);
    let mut removed = false;

    if dirs.root.exists() {
        fs::remove_dir_all(&dirs.root)?;
        removed = true;
    }

    let libs = ctx.arch_libs_dir(arch);
    for lib in &recipe.generated_libraries {
        let path = libs.join(lib);
        if path.is_file() {
            fs::remove_file(&path)?;
            removed = true;
        }
    }

    if removed {
        info!("Cleaned {} for {}", recipe.name, arch);
    }
    Ok(removed)
}

fn record_failure(recipe: &Recipe, arch: &Architecture, dirs: &WorkDirs, err: &Error) {
    let record = FailureRecord::new(&recipe.name, arch, recipe.fingerprint(), err);
    let written = fs::create_dir_all(&dirs.root)
        .map_err(Error::from)
        .and_then(|()| record.write(&dirs.failure));
    if let Err(e) = written {
        warn!("[{} {}] could not record failure: {}", recipe.name, arch, e);
    }
}

fn reset_work_dirs(dirs: &WorkDirs) -> Result<()> {
    if dirs.root.exists() {
        fs::remove_dir_all(&dirs.root)?;
    }
    for dir in [&dirs.source, &dirs.build, &dirs.install] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn verify_artifacts(recipe: &Recipe, arch: &Architecture, dir: &Path) -> Result<Vec<PathBuf>> {
    let missing: Vec<String> = recipe
        .generated_libraries
        .iter()
        .filter(|lib| !dir.join(lib).is_file())
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(Error::ArtifactMissing {
            recipe: recipe.name.clone(),
            arch: arch.name.clone(),
            missing,
            dir: dir.to_path_buf(),
        });
    }

    Ok(recipe
        .generated_libraries
        .iter()
        .map(|lib| dir.join(lib))
        .collect())
}

fn pair_build(recipe: &Recipe, env: &RecipeEnv, cached: bool) -> PairBuild {
    let dir = env.artifact_dir();
    PairBuild {
        cached,
        artifact_dir: dir.clone(),
        artifacts: recipe
            .generated_libraries
            .iter()
            .map(|lib| dir.join(lib))
            .collect(),
    }
}
