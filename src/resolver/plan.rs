// src/resolver/plan.rs

//! Resolved build plans

use super::graph::RecipeGraph;
use crate::recipe::Recipe;
use std::sync::Arc;

/// Recipes in build order, plus the edges that produced the order
#[derive(Debug, Clone)]
pub struct BuildPlan {
    recipes: Vec<Arc<Recipe>>,
    graph: RecipeGraph,
}

impl BuildPlan {
    pub(crate) fn new(recipes: Vec<Arc<Recipe>>, graph: RecipeGraph) -> Self {
        Self { recipes, graph }
    }

    /// Recipes dependencies-first
    pub fn recipes(&self) -> &[Arc<Recipe>] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.recipes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.recipes.iter().position(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Recipe>> {
        self.recipes.iter().find(|r| r.name == name)
    }

    /// Ordering edges, including optional edges that were kept
    pub fn graph(&self) -> &RecipeGraph {
        &self.graph
    }
}
