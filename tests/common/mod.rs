// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use crossbake::exec::{CancelToken, CommandOutput, CommandRunner, CommandSpec};
use crossbake::recipe::{BuildJob, BuildProcedure, Recipe};
use crossbake::{Architecture, BuildContext, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Build context over scratch NDK and build-root directories
///
/// Keep the fixture alive to prevent cleanup.
pub struct Fixture {
    pub ndk: TempDir,
    pub root: TempDir,
    pub ctx: BuildContext,
}

pub fn fixture(archs: &[&str]) -> Fixture {
    let ndk = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let ctx = BuildContext::builder()
        .with_architectures(
            archs
                .iter()
                .map(|a| Architecture::android(a, 21).unwrap()),
        )
        .with_ndk_dir(ndk.path())
        .with_build_root(root.path())
        .with_jobs(2)
        .finish()
        .unwrap();
    Fixture { ndk, root, ctx }
}

/// Runner for procedures that never shell out
pub struct NoopRunner;

impl CommandRunner for NoopRunner {
    fn run(&self, spec: &CommandSpec, _cancel: &CancelToken) -> Result<CommandOutput> {
        Ok(CommandOutput {
            status: Some(0),
            stdout: format!("ran {}\n", spec.program),
            ..Default::default()
        })
    }
}

/// In-process build procedure that writes the declared artifacts
#[derive(Clone, Default)]
pub struct FakeBuild {
    pub calls: Arc<AtomicUsize>,
    /// Architectures where the build fails
    pub fail_on: Vec<String>,
    /// Succeed without producing artifacts
    pub skip_artifacts: bool,
    /// `(arch, available optional deps)` per invocation
    pub seen_opts: Arc<Mutex<Vec<(String, BTreeSet<String>)>>>,
    /// Headers written into `install/include`
    pub installs_headers: Vec<String>,
    /// Headers that must be found through `-I` in `CFLAGS`
    pub requires_headers: Vec<String>,
}

impl FakeBuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, arch: &str) -> Self {
        self.fail_on.push(arch.to_string());
        self
    }

    pub fn without_artifacts(mut self) -> Self {
        self.skip_artifacts = true;
        self
    }

    pub fn installing_header(mut self, header: &str) -> Self {
        self.installs_headers.push(header.to_string());
        self
    }

    pub fn requiring_header(mut self, header: &str) -> Self {
        self.requires_headers.push(header.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BuildProcedure for FakeBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_opts.lock().push((
            job.arch.name.clone(),
            job.env.available_opt_depends().clone(),
        ));

        if self.fail_on.contains(&job.arch.name) {
            return Err(job.failure("compile", "simulated compiler error"));
        }
        let cflags = job.env.get("CFLAGS").unwrap_or_default();
        for header in &self.requires_headers {
            let found = cflags
                .split_whitespace()
                .filter_map(|flag| flag.strip_prefix("-I"))
                .any(|dir| Path::new(dir).join(header).is_file());
            if !found {
                return Err(job.failure("compile", format!("{}: No such file or directory", header)));
            }
        }

        let include = job.dirs.install.join("include");
        for header in &self.installs_headers {
            fs::create_dir_all(&include)?;
            fs::write(include.join(header), format!("/* {} */", job.recipe.name))?;
        }
        if self.skip_artifacts {
            return Ok(());
        }

        let dir = job.env.artifact_dir();
        fs::create_dir_all(dir)?;
        for lib in &job.recipe.generated_libraries {
            fs::write(dir.join(lib), format!("{} for {}", job.recipe.name, job.arch))?;
        }
        Ok(())
    }
}

/// Recipe built by a fresh [`FakeBuild`]
pub fn fake_recipe(name: &str) -> Recipe {
    Recipe::new(name, FakeBuild::new())
}
