// src/recipe/mod.rs

//! Recipes: declarative build units
//!
//! A recipe is a data record (name, version, source, dependency and
//! conflict sets, produced artifacts) plus a build procedure. The procedure
//! is selected by kind (cmake, autotools, script, runtime-module,
//! header-only) or supplied programmatically through [`BuildProcedure`].
//!
//! # Example Recipe
//!
//! ```toml
//! [recipe]
//! name = "grpc"
//! version = "v1.20.1"
//! url = "https://github.com/grpc/grpc/archive/{version}.zip"
//! depends = ["python3"]
//! generated_libraries = ["libgrpc.a", "libgpr.a"]
//! lib_dir = "%(build_dir)s/lib/%(arch)s"
//!
//! [env]
//! ANDROID_NDK = "%(ndk_dir)s"
//!
//! [build]
//! kind = "cmake"
//! defines = ["-DgRPC_BUILD_TESTS=OFF"]
//! ```

mod format;
pub mod parser;
pub mod procedure;
pub mod registry;

pub use format::{RecipeFile, RecipeSection, substitute};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use procedure::{BuildJob, BuildProcedure, BuildSpec};
pub use registry::Registry;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a recipe's sources come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// Nothing to fetch; the procedure works from the build environment alone
    #[default]
    None,
    /// Remote archive; may contain `{version}`
    Url(String),
    /// Files shipped alongside the recipe
    Path(PathBuf),
}

/// Include/link roots a runtime recipe exposes to its dependents
///
/// Values are templates rendered against the runtime recipe's own
/// per-architecture directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCapability {
    pub include_root: String,
    pub link_root: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A build unit
#[derive(Clone)]
pub struct Recipe {
    pub name: String,
    pub version: Option<String>,
    pub source: Source,
    pub depends: BTreeSet<String>,
    pub opt_depends: BTreeSet<String>,
    pub conflicts: BTreeSet<String>,
    /// Artifact filenames produced for every architecture, in declaration order
    pub generated_libraries: Vec<String>,
    /// Template overriding the artifact directory (default `install/lib`)
    pub lib_dir: Option<String>,
    /// Extra environment entries, rendered as templates
    pub env: BTreeMap<String, String>,
    pub runtime: Option<RuntimeCapability>,
    procedure: Arc<dyn BuildProcedure>,
}

impl Recipe {
    pub fn new(name: impl Into<String>, procedure: impl BuildProcedure + 'static) -> Self {
        Self::with_shared_procedure(name, Arc::new(procedure))
    }

    pub fn with_shared_procedure(
        name: impl Into<String>,
        procedure: Arc<dyn BuildProcedure>,
    ) -> Self {
        Self {
            name: name.into(),
            version: None,
            source: Source::None,
            depends: BTreeSet::new(),
            opt_depends: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            generated_libraries: Vec::new(),
            lib_dir: None,
            env: BTreeMap::new(),
            runtime: None,
            procedure,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source = Source::Url(url.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Source::Path(path.into());
        self
    }

    pub fn with_depends(mut self, names: &[&str]) -> Self {
        self.depends.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_opt_depends(mut self, names: &[&str]) -> Self {
        self.opt_depends.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_conflicts(mut self, names: &[&str]) -> Self {
        self.conflicts.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_libraries(mut self, names: &[&str]) -> Self {
        self.generated_libraries
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_lib_dir(mut self, template: impl Into<String>) -> Self {
        self.lib_dir = Some(template.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_runtime(mut self, capability: RuntimeCapability) -> Self {
        self.runtime = Some(capability);
        self
    }

    pub fn procedure(&self) -> &dyn BuildProcedure {
        self.procedure.as_ref()
    }

    /// Source URL with `{version}` expanded
    pub fn url(&self) -> Option<String> {
        match &self.source {
            Source::Url(template) => {
                let version = self.version.as_deref().unwrap_or_default();
                Some(
                    template
                        .replace("{version}", version)
                        .replace("%(version)s", version),
                )
            }
            _ => None,
        }
    }

    /// Version for display
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("-")
    }

    /// Digest of everything that affects the build output
    ///
    /// Stored in completion markers so `status` can flag stale builds.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |key: &str, value: &str| {
            hasher.update(key.as_bytes());
            hasher.update([0]);
            hasher.update(value.as_bytes());
            hasher.update([0]);
        };

        field("name", &self.name);
        field("version", self.version.as_deref().unwrap_or_default());
        field("source", &format!("{:?}", self.source));
        field("depends", &join(&self.depends));
        field("opt_depends", &join(&self.opt_depends));
        field("libraries", &self.generated_libraries.join(","));
        field("lib_dir", self.lib_dir.as_deref().unwrap_or_default());
        for (key, value) in &self.env {
            field(key, value);
        }
        if let Some(runtime) = &self.runtime {
            field("runtime", &format!("{:?}", runtime));
        }
        field("procedure", &self.procedure.describe());

        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("source", &self.source)
            .field("depends", &self.depends)
            .field("opt_depends", &self.opt_depends)
            .field("conflicts", &self.conflicts)
            .field("generated_libraries", &self.generated_libraries)
            .field("procedure", &self.procedure.describe())
            .finish()
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::procedure::HeaderOnlyBuild;

    fn recipe(name: &str) -> Recipe {
        Recipe::new(name, HeaderOnlyBuild::default())
    }

    #[test]
    fn test_url_version_template() {
        let r = recipe("grpc")
            .with_version("v1.20.1")
            .with_url("https://github.com/grpc/grpc/archive/{version}.zip");
        assert_eq!(
            r.url().as_deref(),
            Some("https://github.com/grpc/grpc/archive/v1.20.1.zip")
        );
        assert!(recipe("android").with_path("src").url().is_none());
    }

    #[test]
    fn test_fingerprint_tracks_version() {
        let a = recipe("zlib").with_version("1.2.13");
        let b = recipe("zlib").with_version("1.3");
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_conflicts() {
        let a = recipe("android");
        let b = recipe("android").with_conflicts(&["sdl2"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
