// src/recipe/procedure.rs

//! Build procedures
//!
//! A procedure is the only recipe-specific code that runs during a build.
//! It receives a [`BuildJob`] carrying the architecture, the pair's
//! environment and its scoped working directories, and drives external tools
//! through the job so that every step is logged and failures carry the
//! recipe, architecture and output tail.
//!
//! Recipe files select a built-in procedure with `[build] kind = "..."`.

use crate::arch::Architecture;
use crate::context::{BuildContext, WorkDirs};
use crate::env::RecipeEnv;
use crate::error::{Error, Result};
use crate::exec::{BuildLog, CancelToken, CommandOutput, CommandRunner, CommandSpec, OUTPUT_TAIL_LINES};
use crate::recipe::Recipe;
use crate::source::copy_tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Build hook of a recipe
///
/// `build` runs once per architecture with the working directory already
/// cleared and sources prepared. Returning `Ok` means the tools succeeded;
/// artifact verification happens afterwards in the driver.
pub trait BuildProcedure: Send + Sync {
    fn build(&self, job: &BuildJob<'_>) -> Result<()>;

    /// Stable description used in fingerprints and logs
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Everything a procedure may use while building one pair
pub struct BuildJob<'a> {
    pub recipe: &'a Recipe,
    pub arch: &'a Architecture,
    pub env: &'a RecipeEnv,
    pub dirs: &'a WorkDirs,
    pub ctx: &'a BuildContext,
    runner: &'a dyn CommandRunner,
    cancel: &'a CancelToken,
    log: &'a BuildLog,
}

impl<'a> BuildJob<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recipe: &'a Recipe,
        arch: &'a Architecture,
        env: &'a RecipeEnv,
        dirs: &'a WorkDirs,
        ctx: &'a BuildContext,
        runner: &'a dyn CommandRunner,
        cancel: &'a CancelToken,
        log: &'a BuildLog,
    ) -> Self {
        Self {
            recipe,
            arch,
            env,
            dirs,
            ctx,
            runner,
            cancel,
            log,
        }
    }

    pub fn render(&self, template: &str) -> String {
        self.env.render(template)
    }

    /// Source directory, optionally narrowed to a subdirectory template
    pub fn source_dir(&self, subdir: Option<&str>) -> PathBuf {
        match subdir {
            Some(sub) => self.dirs.source.join(self.render(sub)),
            None => self.dirs.source.clone(),
        }
    }

    /// Command preloaded with the pair environment, running in `build/`
    pub fn command(&self, program: impl Into<String>) -> CommandSpec {
        CommandSpec::new(program)
            .envs(self.env.vars())
            .current_dir(&self.dirs.build)
    }

    /// Run one step; a non-zero exit becomes `BuildFailure`
    pub fn run(&self, step: &str, spec: &CommandSpec) -> Result<CommandOutput> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        info!("[{} {}] {}", self.recipe.name, self.arch, step);
        debug!("  $ {} (in {})", spec.display(), spec.cwd.display());
        self.log.command(step, spec)?;

        let output = self.runner.run(spec, self.cancel)?;
        self.log.output(&output)?;

        if !output.success() {
            return Err(Error::BuildFailure {
                recipe: self.recipe.name.clone(),
                arch: self.arch.name.clone(),
                step: step.to_string(),
                status: if output.timed_out { None } else { output.status },
                output_tail: output.tail(OUTPUT_TAIL_LINES),
            });
        }
        Ok(output)
    }

    /// Failure raised by a procedure without running a command
    pub fn failure(&self, step: &str, message: impl Into<String>) -> Error {
        let message = message.into();
        let _ = self.log.line(&format!("=== {} ===\n{}", step, message));
        Error::BuildFailure {
            recipe: self.recipe.name.clone(),
            arch: self.arch.name.clone(),
            step: step.to_string(),
            status: None,
            output_tail: message,
        }
    }

    pub fn log_line(&self, text: &str) -> Result<()> {
        self.log.line(text)
    }
}

/// Built-in procedure selected by a recipe file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BuildSpec {
    Cmake(CmakeBuild),
    Autotools(AutotoolsBuild),
    Script(ScriptBuild),
    RuntimeModule(RuntimeModuleBuild),
    HeaderOnly(HeaderOnlyBuild),
}

impl BuildSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cmake(_) => "cmake",
            Self::Autotools(_) => "autotools",
            Self::Script(_) => "script",
            Self::RuntimeModule(_) => "runtime-module",
            Self::HeaderOnly(_) => "header-only",
        }
    }

    pub fn into_procedure(self) -> Arc<dyn BuildProcedure> {
        match self {
            Self::Cmake(b) => Arc::new(b),
            Self::Autotools(b) => Arc::new(b),
            Self::Script(b) => Arc::new(b),
            Self::RuntimeModule(b) => Arc::new(b),
            Self::HeaderOnly(b) => Arc::new(b),
        }
    }
}

/// CMake project configured with the NDK toolchain file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmakeBuild {
    pub source_subdir: Option<String>,
    pub generator: Option<String>,
    /// Extra `-D` arguments, rendered as templates
    pub defines: Vec<String>,
    pub targets: Vec<String>,
    pub install: bool,
}

impl Default for CmakeBuild {
    fn default() -> Self {
        Self {
            source_subdir: None,
            generator: None,
            defines: Vec::new(),
            targets: Vec::new(),
            install: true,
        }
    }
}

impl BuildProcedure for CmakeBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir(self.source_subdir.as_deref());
        let api = job.arch.api_level;

        let mut configure = job
            .command("cmake")
            .arg(source.to_string_lossy())
            .arg(format!(
                "-DCMAKE_TOOLCHAIN_FILE={}",
                job.ctx.cmake_toolchain_file().display()
            ))
            .arg(format!("-DANDROID_ABI={}", job.arch.name))
            .arg(format!("-DANDROID_PLATFORM=android-{}", api))
            .arg(format!("-DANDROID_NATIVE_API_LEVEL={}", api))
            .arg("-DCMAKE_BUILD_TYPE=Release")
            .arg(format!("-DCMAKE_INSTALL_PREFIX={}", job.dirs.install.display()));
        if let Some(generator) = &self.generator {
            configure = configure.arg("-G").arg(generator.as_str());
        }
        configure = configure.args(self.defines.iter().map(|d| job.render(d)));
        job.run("configure", &configure)?;

        let mut build = job
            .command("cmake")
            .args(["--build", ".", "--parallel"])
            .arg(job.ctx.jobs().to_string());
        for target in &self.targets {
            build = build.arg("--target").arg(target.as_str());
        }
        job.run("build", &build)?;

        if self.install {
            job.run("install", &job.command("cmake").args(["--install", "."]))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// `configure && make && make install`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotoolsBuild {
    pub source_subdir: Option<String>,
    /// Run `autoreconf -fi` in the source tree first
    pub autoreconf: bool,
    /// Build inside the source tree instead of `build/`
    pub in_source: bool,
    pub configure_args: Vec<String>,
    pub make_targets: Vec<String>,
    pub install: bool,
    pub install_target: String,
}

impl Default for AutotoolsBuild {
    fn default() -> Self {
        Self {
            source_subdir: None,
            autoreconf: false,
            in_source: false,
            configure_args: Vec::new(),
            make_targets: Vec::new(),
            install: true,
            install_target: "install".to_string(),
        }
    }
}

impl BuildProcedure for AutotoolsBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        let source = job.source_dir(self.source_subdir.as_deref());
        let cwd = if self.in_source {
            source.clone()
        } else {
            job.dirs.build.clone()
        };

        if self.autoreconf {
            let spec = job.command("autoreconf").arg("-fi").current_dir(&source);
            job.run("autoreconf", &spec)?;
        }

        let configure = job
            .command(source.join("configure").to_string_lossy())
            .arg(format!("--host={}", job.arch.toolchain_prefix))
            .arg(format!("--prefix={}", job.dirs.install.display()))
            .args(self.configure_args.iter().map(|a| job.render(a)))
            .current_dir(&cwd);
        job.run("configure", &configure)?;

        let make = job
            .command("make")
            .arg(format!("-j{}", job.ctx.jobs()))
            .args(self.make_targets.iter().map(|t| job.render(t)))
            .current_dir(&cwd);
        job.run("make", &make)?;

        if self.install {
            let install = job
                .command("make")
                .arg(self.install_target.as_str())
                .current_dir(&cwd);
            job.run("install", &install)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Explicit list of commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBuild {
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub name: Option<String>,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory template, relative paths resolve against `build/`
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl BuildProcedure for ScriptBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        for step in &self.steps {
            let program = job.render(&step.program);
            let name = step.name.clone().unwrap_or_else(|| {
                program
                    .rsplit('/')
                    .next()
                    .unwrap_or(program.as_str())
                    .to_string()
            });

            let mut spec = job
                .command(program.as_str())
                .args(step.args.iter().map(|a| job.render(a)));
            for (key, value) in &step.env {
                spec = spec.env(key.as_str(), job.render(value));
            }
            if let Some(cwd) = &step.cwd {
                spec = spec.current_dir(job.dirs.build.join(job.render(cwd)));
            }
            job.run(&name, &spec)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Interpreter extension module built with the host runtime's `setup.py`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeModuleBuild {
    pub source_subdir: Option<String>,
    pub setup_script: String,
    pub build_args: Vec<String>,
    pub install_args: Vec<String>,
}

impl Default for RuntimeModuleBuild {
    fn default() -> Self {
        Self {
            source_subdir: None,
            setup_script: "setup.py".to_string(),
            build_args: Vec::new(),
            install_args: Vec::new(),
        }
    }
}

impl BuildProcedure for RuntimeModuleBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        let Some(host) = job.env.get("HOST_RUNTIME") else {
            return Err(job.failure(
                "setup",
                "no host runtime configured; set host_runtime in crossbake.toml",
            ));
        };
        let source = job.source_dir(self.source_subdir.as_deref());
        let ldshared = format!("{} -shared", job.env.get("CC").unwrap_or("cc"));

        let build_ext = job
            .command(host)
            .arg(self.setup_script.as_str())
            .args(["build_ext", "-v"])
            .args(self.build_args.iter().map(|a| job.render(a)))
            .env("LDSHARED", ldshared.as_str())
            .current_dir(&source);
        job.run("build_ext", &build_ext)?;

        let install = job
            .command(host)
            .arg(self.setup_script.as_str())
            .arg("install")
            .arg(format!("--prefix={}", job.dirs.install.display()))
            .args(self.install_args.iter().map(|a| job.render(a)))
            .env("LDSHARED", ldshared.as_str())
            .current_dir(&source);
        job.run("install", &install)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Copies header directories into `install/include`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderOnlyBuild {
    pub include_dirs: Vec<String>,
}

impl Default for HeaderOnlyBuild {
    fn default() -> Self {
        Self {
            include_dirs: vec!["include".to_string()],
        }
    }
}

impl BuildProcedure for HeaderOnlyBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<()> {
        let dest = job.dirs.install.join("include");
        for dir in &self.include_dirs {
            let source = job.dirs.source.join(job.render(dir));
            if !source.is_dir() {
                warn!(
                    "[{} {}] header directory {} not found, skipping",
                    job.recipe.name,
                    job.arch,
                    source.display()
                );
                continue;
            }
            let copied = copy_tree(&source, &dest)?;
            job.log_line(&format!("copied {} files from {}", copied, source.display()))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}
