// src/recipe/registry.rs

//! Recipe registry
//!
//! Holds every known recipe keyed by name. Recipes are stored behind `Arc`
//! so build plans can share them without copying. Dependency names are not
//! checked on insertion; unknown names surface during resolution.

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::recipe::parser::load_recipe;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Recipe file name inside a per-recipe directory
pub const RECIPE_FILE: &str = "recipe.toml";

#[derive(Debug, Default, Clone)]
pub struct Registry {
    recipes: BTreeMap<String, Arc<Recipe>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe; names must be unique
    pub fn insert(&mut self, recipe: Recipe) -> Result<()> {
        if self.recipes.contains_key(&recipe.name) {
            return Err(Error::InvalidRecipe {
                name: recipe.name.clone(),
                reason: "declared more than once".to_string(),
            });
        }
        self.recipes.insert(recipe.name.clone(), Arc::new(recipe));
        Ok(())
    }

    /// Builder-style insert for programmatic registries
    pub fn with(mut self, recipe: Recipe) -> Result<Self> {
        self.insert(recipe)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Recipe>> {
        self.recipes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Recipes sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Recipe>> {
        self.recipes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    /// Load every `<name>.toml` and `<name>/recipe.toml` in `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| {
                Error::Config(format!("Cannot read recipes directory {}: {}", dir.display(), e))
            })?
            .collect::<std::result::Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();
            let file = if path.is_dir() {
                path.join(RECIPE_FILE)
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                path
            } else {
                continue;
            };
            if !file.is_file() {
                continue;
            }

            let (recipe, warnings) = load_recipe(&file)?;
            for warning in &warnings {
                warn!("{}", warning);
            }
            debug!("Loaded recipe {} from {}", recipe.name, file.display());
            registry.insert(recipe)?;
        }

        Ok(registry)
    }

    /// Names referenced by some recipe but not declared in the registry
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for recipe in self.recipes.values() {
            for dep in recipe.depends.iter().chain(&recipe.opt_depends) {
                if !self.contains(dep) {
                    dangling.push((recipe.name.clone(), dep.clone()));
                }
            }
        }
        dangling
    }
}
