// src/context.rs

//! Invocation-wide build context
//!
//! A `BuildContext` holds the toolchain roots, requested architectures and
//! shared output directories for a single invocation. It is assembled by a
//! `BuildContextBuilder` during setup, which may accumulate paths discovered
//! from the environment, and is frozen by `finish()`. Afterwards it is only
//! ever passed around by shared reference.
//!
//! # Directory layout
//!
//! ```text
//! <build_root>/
//!   packages/<recipe>/                 pre-extracted sources
//!   other_builds/<recipe>/<arch>/
//!     src/ build/ install/             scoped working directories
//!     build.log                        command lines and captured output
//!     .crossbake-done.json             completion marker
//!     .crossbake-failed.json           failure record
//! <libs_dir>/<arch>/<artifact>         aggregated artifacts
//! <install_prefix>/<arch>/             shared staging prefix
//! ```

use crate::arch::Architecture;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name of the per-pair completion marker
pub const MARKER_FILE: &str = ".crossbake-done.json";

/// File name of the per-pair failure record
pub const FAILURE_FILE: &str = ".crossbake-failed.json";

/// File name of the per-pair build log
pub const LOG_FILE: &str = "build.log";

/// Host variables passed through to every build environment
pub const PASSTHROUGH_VARS: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR", "USER"];

/// Prebuilt NDK toolchain directory name for the host
#[cfg(target_os = "macos")]
pub const HOST_TAG: &str = "darwin-x86_64";
#[cfg(target_os = "linux")]
pub const HOST_TAG: &str = "linux-x86_64";
#[cfg(target_os = "windows")]
pub const HOST_TAG: &str = "windows-x86_64";
#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
pub const HOST_TAG: &str = "linux-x86_64";

/// Scoped working directories for one `(recipe, architecture)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub source: PathBuf,
    pub build: PathBuf,
    pub install: PathBuf,
    pub log_file: PathBuf,
    pub marker: PathBuf,
    pub failure: PathBuf,
}

impl WorkDirs {
    fn new(root: PathBuf) -> Self {
        Self {
            source: root.join("src"),
            build: root.join("build"),
            install: root.join("install"),
            log_file: root.join(LOG_FILE),
            marker: root.join(MARKER_FILE),
            failure: root.join(FAILURE_FILE),
            root,
        }
    }
}

/// Frozen configuration and path state for one invocation
#[derive(Debug, Clone)]
pub struct BuildContext {
    architectures: Vec<Architecture>,
    ndk_dir: PathBuf,
    sdk_dir: Option<PathBuf>,
    ndk_host_tag: String,
    build_root: PathBuf,
    libs_dir: PathBuf,
    install_prefix: PathBuf,
    runtime_recipe: Option<String>,
    host_runtime: Option<PathBuf>,
    jobs: usize,
    step_timeout: Option<Duration>,
    host_env: BTreeMap<String, String>,
}

impl BuildContext {
    pub fn builder() -> BuildContextBuilder {
        BuildContextBuilder::default()
    }

    /// Architectures in build order
    pub fn architectures(&self) -> &[Architecture] {
        &self.architectures
    }

    pub fn architecture(&self, name: &str) -> Option<&Architecture> {
        self.architectures.iter().find(|a| a.name == name)
    }

    pub fn ndk_dir(&self) -> &Path {
        &self.ndk_dir
    }

    pub fn sdk_dir(&self) -> Option<&Path> {
        self.sdk_dir.as_deref()
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    pub fn libs_dir(&self) -> &Path {
        &self.libs_dir
    }

    pub fn install_prefix(&self) -> &Path {
        &self.install_prefix
    }

    /// Name of the recipe providing interpreter include/link roots
    pub fn runtime_recipe(&self) -> Option<&str> {
        self.runtime_recipe.as_deref()
    }

    /// Host interpreter used by runtime-module recipes
    pub fn host_runtime(&self) -> Option<&Path> {
        self.host_runtime.as_deref()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    /// Host variables captured at setup
    pub fn host_env(&self) -> &BTreeMap<String, String> {
        &self.host_env
    }

    /// Root of the NDK's prebuilt LLVM toolchain
    pub fn toolchain_root(&self) -> PathBuf {
        self.ndk_dir
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join(&self.ndk_host_tag)
    }

    pub fn toolchain_bin(&self) -> PathBuf {
        self.toolchain_root().join("bin")
    }

    pub fn sysroot(&self) -> PathBuf {
        self.toolchain_root().join("sysroot")
    }

    /// CMake toolchain file shipped with the NDK
    pub fn cmake_toolchain_file(&self) -> PathBuf {
        self.ndk_dir
            .join("build")
            .join("cmake")
            .join("android.toolchain.cmake")
    }

    /// Pre-extracted source trees
    pub fn packages_dir(&self) -> PathBuf {
        self.build_root.join("packages")
    }

    /// Per-recipe build directories
    pub fn builds_dir(&self) -> PathBuf {
        self.build_root.join("other_builds")
    }

    pub fn work_dirs(&self, recipe: &str, arch: &Architecture) -> WorkDirs {
        WorkDirs::new(self.builds_dir().join(recipe).join(&arch.name))
    }

    /// Aggregated artifacts for one architecture
    pub fn arch_libs_dir(&self, arch: &Architecture) -> PathBuf {
        self.libs_dir.join(&arch.name)
    }

    /// Shared staging prefix for one architecture
    pub fn staging_dir(&self, arch: &Architecture) -> PathBuf {
        self.install_prefix.join(&arch.name)
    }
}

/// Accumulates context inputs during setup
#[derive(Debug, Default, Clone)]
pub struct BuildContextBuilder {
    architectures: Vec<Architecture>,
    ndk_dir: Option<PathBuf>,
    sdk_dir: Option<PathBuf>,
    ndk_host_tag: Option<String>,
    build_root: Option<PathBuf>,
    libs_dir: Option<PathBuf>,
    install_prefix: Option<PathBuf>,
    runtime_recipe: Option<String>,
    host_runtime: Option<PathBuf>,
    jobs: Option<usize>,
    step_timeout: Option<Duration>,
}

impl BuildContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target architecture; insertion order is build order
    pub fn with_architecture(mut self, arch: Architecture) -> Self {
        self.architectures.push(arch);
        self
    }

    pub fn with_architectures(mut self, archs: impl IntoIterator<Item = Architecture>) -> Self {
        self.architectures.extend(archs);
        self
    }

    pub fn with_ndk_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ndk_dir = Some(path.into());
        self
    }

    pub fn with_sdk_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sdk_dir = Some(path.into());
        self
    }

    /// Override the prebuilt toolchain directory name (defaults to the host's)
    pub fn with_ndk_host_tag(mut self, tag: impl Into<String>) -> Self {
        self.ndk_host_tag = Some(tag.into());
        self
    }

    pub fn with_build_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_root = Some(path.into());
        self
    }

    pub fn with_libs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.libs_dir = Some(path.into());
        self
    }

    pub fn with_install_prefix(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_prefix = Some(path.into());
        self
    }

    pub fn with_runtime_recipe(mut self, name: impl Into<String>) -> Self {
        self.runtime_recipe = Some(name.into());
        self
    }

    pub fn with_host_runtime(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_runtime = Some(path.into());
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Fill unset toolchain paths from the process environment
    pub fn discover_from_env(self) -> Self {
        self.discover_with(|key| std::env::var(key).ok())
    }

    /// Fill unset toolchain paths using `lookup` for environment variables
    ///
    /// Resolution order for the SDK is `ANDROID_SDK_ROOT`, `ANDROID_HOME`,
    /// then `~/Android/Sdk`. For the NDK it is `ANDROID_NDK_HOME`,
    /// `ANDROID_NDK_ROOT`, `ANDROID_NDK`, then `<sdk>/ndk-bundle` or the
    /// newest `<sdk>/ndk/<version>`.
    pub fn discover_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .find(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        if self.sdk_dir.is_none() {
            self.sdk_dir = from_env(&["ANDROID_SDK_ROOT", "ANDROID_HOME"]).or_else(|| {
                dirs::home_dir()
                    .map(|home| home.join("Android").join("Sdk"))
                    .filter(|p| p.is_dir())
            });
            if let Some(sdk) = &self.sdk_dir {
                debug!("Discovered Android SDK at {}", sdk.display());
            }
        }

        if self.ndk_dir.is_none() {
            self.ndk_dir = from_env(&["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT", "ANDROID_NDK"])
                .or_else(|| self.sdk_dir.as_deref().and_then(ndk_in_sdk));
            if let Some(ndk) = &self.ndk_dir {
                debug!("Discovered Android NDK at {}", ndk.display());
            }
        }

        if self.host_runtime.is_none()
            && self.runtime_recipe.is_some()
            && let Ok(path) = which::which("python3")
        {
            debug!("Using host runtime {}", path.display());
            self.host_runtime = Some(path);
        }

        self
    }

    /// Validate and freeze the context
    pub fn finish(self) -> Result<BuildContext> {
        if self.architectures.is_empty() {
            return Err(Error::Config("No target architectures configured".to_string()));
        }

        let mut seen = std::collections::BTreeSet::new();
        for arch in &self.architectures {
            if !seen.insert(arch.name.as_str()) {
                return Err(Error::Config(format!(
                    "Architecture '{}' requested more than once",
                    arch.name
                )));
            }
        }

        let ndk_dir = self.ndk_dir.ok_or_else(|| {
            Error::Config(
                "Android NDK not found; set ndk_dir or ANDROID_NDK_HOME".to_string(),
            )
        })?;
        if !ndk_dir.is_dir() {
            return Err(Error::Config(format!(
                "Android NDK directory does not exist: {}",
                ndk_dir.display()
            )));
        }

        let build_root = match self.build_root {
            Some(root) => root,
            None => std::env::current_dir()?.join("build"),
        };
        let libs_dir = self
            .libs_dir
            .unwrap_or_else(|| build_root.join("libs_collections"));
        let install_prefix = self
            .install_prefix
            .unwrap_or_else(|| build_root.join("staging"));

        let jobs = match self.jobs {
            Some(0) => return Err(Error::Config("jobs must be at least 1".to_string())),
            Some(j) => j,
            None => default_jobs(),
        };

        let host_env = PASSTHROUGH_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();

        Ok(BuildContext {
            architectures: self.architectures,
            ndk_dir,
            sdk_dir: self.sdk_dir,
            ndk_host_tag: self.ndk_host_tag.unwrap_or_else(|| HOST_TAG.to_string()),
            build_root,
            libs_dir,
            install_prefix,
            runtime_recipe: self.runtime_recipe,
            host_runtime: self.host_runtime,
            jobs,
            step_timeout: self.step_timeout,
            host_env,
        })
    }
}

/// Number of parallel jobs passed to make/cmake
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn ndk_in_sdk(sdk: &Path) -> Option<PathBuf> {
    let bundle = sdk.join("ndk-bundle");
    if bundle.is_dir() {
        return Some(bundle);
    }

    std::fs::read_dir(sdk.join("ndk"))
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| ndk_version(&path).map(|version| (version, path)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Version of a side-by-side NDK directory such as `ndk/25.1.8937393`
fn ndk_version(path: &Path) -> Option<semver::Version> {
    let name = path.file_name()?.to_str()?;
    semver::Version::parse(name).ok()
}
