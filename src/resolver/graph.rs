// src/resolver/graph.rs

//! Recipe dependency graph for build ordering
//!
//! A directed graph over recipe names where an edge `a -> b` means `a` must
//! be built after `b`. Ordered collections are used throughout so the
//! topological order and reported cycles are identical across runs.
//!
//! # Example
//!
//! ```
//! use crossbake::resolver::RecipeGraph;
//!
//! let mut graph = RecipeGraph::new();
//! graph.add_recipe("grpc", &["python3"]);
//! graph.add_recipe("python3", &["libffi", "openssl"]);
//! graph.add_recipe("openssl", &[]);
//! graph.add_recipe("libffi", &[]);
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, vec!["libffi", "openssl", "python3", "grpc"]);
//! ```

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Default, Clone)]
pub struct RecipeGraph {
    /// Recipe name to the recipes it must be built after
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Recipe name to the recipes built after it
    reverse_edges: BTreeMap<String, BTreeSet<String>>,
}

impl RecipeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe with its dependencies
    ///
    /// If the recipe already exists, this merges the dependencies.
    pub fn add_recipe(&mut self, name: &str, dependencies: &[&str]) {
        self.add_node(name);
        for dep in dependencies {
            self.add_edge(name, dep);
        }
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
        self.reverse_edges.entry(name.to_string()).or_default();
    }

    /// Record that `from` is built after `to`
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.reverse_edges
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    pub fn recipe_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Direct dependencies of a recipe
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// Recipes that directly depend on this recipe
    pub fn dependents(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.reverse_edges.get(name)
    }

    /// True if `to` is reachable from `from` along dependency edges
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        from == to || self.transitive_dependencies(from).contains(to)
    }

    /// Kahn's algorithm; ties are broken by recipe name
    ///
    /// Returns recipes dependencies-first, or `Error::Cycle` naming one cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut in_degrees: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degrees
            .iter()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut result = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_first() {
            result.push(node.to_string());

            if let Some(dependents) = self.reverse_edges.get(node) {
                for dependent in dependents {
                    if let Some(deg) = in_degrees.get_mut(dependent.as_str()) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.edges.len() {
            let cycle = self
                .find_cycles()
                .into_iter()
                .next()
                .unwrap_or_else(|| {
                    self.edges
                        .keys()
                        .filter(|k| !result.contains(k))
                        .cloned()
                        .collect()
                });
            return Err(Error::Cycle { cycle });
        }

        Ok(result)
    }

    /// Find cycles in the graph
    ///
    /// Each cycle is reported closed, e.g. `["a", "b", "a"]`.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut path = Vec::new();

        for start in self.edges.keys() {
            if !visited.contains(start.as_str()) {
                self.find_cycles_dfs(start, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn find_cycles_dfs<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        on_stack: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if !visited.contains(dep.as_str()) {
                    self.find_cycles_dfs(dep, visited, on_stack, path, cycles);
                } else if on_stack.contains(dep.as_str())
                    && let Some(start) = path.iter().position(|x| *x == dep)
                {
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.clone());
                    cycles.push(cycle);
                }
            }
        }

        path.pop();
        on_stack.remove(node);
    }

    /// All recipes a given recipe transitively depends on
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        Self::walk(&self.edges, name)
    }

    /// All recipes that transitively depend on a given recipe
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        Self::walk(&self.reverse_edges, name)
    }

    fn walk(edges: &BTreeMap<String, BTreeSet<String>>, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&String> = edges.get(name).into_iter().flatten().collect();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone())
                && let Some(more) = edges.get(next)
            {
                queue.extend(more.iter().filter(|n| !seen.contains(*n)));
            }
        }

        seen
    }
}
