// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipe files are TOML documents with a `[recipe]` metadata table, an
//! optional `[env]` table, a `[build]` table selecting the procedure kind,
//! and an optional `[runtime]` table for interpreter recipes.

use super::procedure::BuildSpec;
use super::{Recipe, RuntimeCapability, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A complete recipe file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeFile {
    pub recipe: RecipeSection,

    /// Extra environment entries for every build of this recipe
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub build: BuildSpec,

    /// Include/link roots exposed to dependents
    #[serde(default)]
    pub runtime: Option<RuntimeCapability>,
}

/// Recipe metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSection {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Source archive URL; `{version}` is expanded
    #[serde(default)]
    pub url: Option<String>,

    /// Local source tree, relative to the recipe file
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub depends: BTreeSet<String>,

    #[serde(default)]
    pub opt_depends: BTreeSet<String>,

    #[serde(default)]
    pub conflicts: BTreeSet<String>,

    #[serde(default)]
    pub generated_libraries: Vec<String>,

    /// Artifact directory template
    #[serde(default)]
    pub lib_dir: Option<String>,
}

impl RecipeFile {
    /// Convert into a recipe record
    ///
    /// A relative `path` source is resolved against `base_dir`.
    pub fn into_recipe(self, base_dir: Option<&Path>) -> Recipe {
        let section = self.recipe;
        let source = match (section.url, section.path) {
            (Some(url), _) => Source::Url(url),
            (None, Some(path)) => match base_dir {
                Some(base) if path.is_relative() => Source::Path(base.join(path)),
                _ => Source::Path(path),
            },
            (None, None) => Source::None,
        };

        let mut recipe = Recipe::with_shared_procedure(section.name, self.build.into_procedure());
        recipe.version = section.version;
        recipe.source = source;
        recipe.depends = section.depends;
        recipe.opt_depends = section.opt_depends;
        recipe.conflicts = section.conflicts;
        recipe.generated_libraries = section.generated_libraries;
        recipe.lib_dir = section.lib_dir;
        recipe.env = self.env;
        recipe.runtime = self.runtime;
        recipe
    }
}

/// Substitute `%(name)s` placeholders
///
/// Unknown placeholders are left untouched.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    if !template.contains("%(") {
        return template.to_string();
    }

    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("%({})s", key), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_known_and_unknown() {
        let mut vars = BTreeMap::new();
        vars.insert("arch".to_string(), "x86_64".to_string());
        vars.insert("build_dir".to_string(), "/b".to_string());

        assert_eq!(
            substitute("%(build_dir)s/lib/%(arch)s", &vars),
            "/b/lib/x86_64"
        );
        assert_eq!(substitute("%(missing)s/x", &vars), "%(missing)s/x");
        assert_eq!(substitute("plain", &vars), "plain");
    }
}
