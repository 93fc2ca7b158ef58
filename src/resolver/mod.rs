// src/resolver/mod.rs

//! Dependency resolution and conflict detection
//!
//! Turns a requested set of recipe names into a [`BuildPlan`]: the
//! transitive closure over `depends`, ordered so that every recipe comes
//! after its hard dependencies and after any optional dependency that is
//! also part of the plan. Resolution is pure and deterministic: the same
//! registry and request always produce the same plan or the same error.
//!
//! Requests may pin an exact version with `name==version`.

mod graph;
mod plan;

pub use graph::RecipeGraph;
pub use plan::BuildPlan;

use crate::error::{Error, Result};
use crate::recipe::{Recipe, Registry};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One requested recipe, optionally pinned to a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub pin: Option<String>,
}

impl Requirement {
    /// Parse `name` or `name==version`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (name, pin) = match input.split_once("==") {
            Some((name, version)) => {
                let version = version.trim();
                if version.is_empty() {
                    return Err(Error::InvalidRequest(format!("empty version pin in '{}'", input)));
                }
                (name.trim(), Some(version.to_string()))
            }
            None => (input, None),
        };

        if name.is_empty() {
            return Err(Error::InvalidRequest("empty recipe name".to_string()));
        }
        if name.contains(['<', '>', '=', '!', '~', ' ']) {
            return Err(Error::InvalidRequest(format!(
                "'{}': only exact pins (name==version) are supported",
                input
            )));
        }

        Ok(Self {
            name: name.to_string(),
            pin,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin {
            Some(pin) => write!(f, "{}=={}", self.name, pin),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Resolve requested names (or `name==version` pins) against a registry
pub fn resolve<S: AsRef<str>>(registry: &Registry, requested: &[S]) -> Result<BuildPlan> {
    let requirements = requested
        .iter()
        .map(|r| Requirement::parse(r.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    resolve_requirements(registry, &requirements)
}

pub fn resolve_requirements(registry: &Registry, requested: &[Requirement]) -> Result<BuildPlan> {
    if requested.is_empty() {
        return Err(Error::InvalidRequest("no recipes requested".to_string()));
    }

    let pins = collect_pins(requested)?;
    let selected = closure(registry, requested)?;

    for recipe in selected.values() {
        if let Some(both) = recipe.depends.intersection(&recipe.conflicts).next() {
            return Err(Error::Conflict {
                first: recipe.name.clone(),
                second: both.clone(),
            });
        }
    }

    let mut graph = RecipeGraph::new();
    for recipe in selected.values() {
        graph.add_node(&recipe.name);
        for dep in &recipe.depends {
            graph.add_edge(&recipe.name, dep);
        }
    }
    // Surface hard cycles before optional edges can change what gets reported.
    graph.topological_sort()?;

    for recipe in selected.values() {
        for opt in &recipe.opt_depends {
            if !selected.contains_key(opt) {
                continue;
            }
            if graph.reaches(opt, &recipe.name) {
                warn!(
                    "Ignoring optional dependency '{}' of '{}': it would create a cycle",
                    opt, recipe.name
                );
                continue;
            }
            graph.add_edge(&recipe.name, opt);
        }
    }

    let order = graph.topological_sort()?;
    check_conflicts(&selected, &order)?;

    let recipes = order
        .iter()
        .filter_map(|name| selected.get(name))
        .map(|recipe| match pins.get(&recipe.name) {
            Some(pin) if recipe.version.as_deref() != Some(pin.as_str()) => {
                debug!("Pinning {} to version {}", recipe.name, pin);
                Arc::new(Recipe::clone(recipe).with_version(pin.as_str()))
            }
            _ => Arc::clone(recipe),
        })
        .collect();

    debug!("Resolved build order: {}", order.join(", "));
    Ok(BuildPlan::new(recipes, graph))
}

/// Hard-dependency graph over every recipe in the registry
pub fn registry_graph(registry: &Registry) -> RecipeGraph {
    let mut graph = RecipeGraph::new();
    for recipe in registry.iter() {
        graph.add_node(&recipe.name);
        for dep in &recipe.depends {
            graph.add_edge(&recipe.name, dep);
        }
    }
    graph
}

fn collect_pins(requested: &[Requirement]) -> Result<HashMap<String, String>> {
    let mut pins: HashMap<String, String> = HashMap::new();
    for req in requested {
        let Some(pin) = &req.pin else { continue };
        match pins.get(&req.name) {
            Some(existing) if existing != pin => {
                return Err(Error::InvalidRequest(format!(
                    "'{}' pinned to both {} and {}",
                    req.name, existing, pin
                )));
            }
            _ => {
                pins.insert(req.name.clone(), pin.clone());
            }
        }
    }
    Ok(pins)
}

/// Transitive closure over hard dependencies
fn closure(
    registry: &Registry,
    requested: &[Requirement],
) -> Result<BTreeMap<String, Arc<Recipe>>> {
    let mut selected = BTreeMap::new();
    let mut queue: VecDeque<(String, Option<String>)> = requested
        .iter()
        .map(|r| r.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|name| (name, None))
        .collect();

    while let Some((name, required_by)) = queue.pop_front() {
        if selected.contains_key(&name) {
            continue;
        }
        let recipe = registry
            .get(&name)
            .ok_or_else(|| Error::UnknownRecipe {
                name: name.clone(),
                required_by: required_by.clone(),
            })?;
        for dep in &recipe.depends {
            if !selected.contains_key(dep) {
                queue.push_back((dep.clone(), Some(name.clone())));
            }
        }
        selected.insert(name, Arc::clone(recipe));
    }

    Ok(selected)
}

/// Report the conflicting pair that appears earliest in build order
fn check_conflicts(selected: &BTreeMap<String, Arc<Recipe>>, order: &[String]) -> Result<()> {
    let positions: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut earliest: Option<(usize, usize)> = None;
    for (i, name) in order.iter().enumerate() {
        let Some(recipe) = selected.get(name) else { continue };
        for other in &recipe.conflicts {
            if let Some(&j) = positions.get(other.as_str()) {
                let pair = (i.min(j), i.max(j));
                if pair.0 != pair.1 && earliest.is_none_or(|e| pair < e) {
                    earliest = Some(pair);
                }
            }
        }
    }

    match earliest {
        Some((first, second)) => Err(Error::Conflict {
            first: order[first].clone(),
            second: order[second].clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::procedure::HeaderOnlyBuild;

    fn recipe(name: &str) -> Recipe {
        Recipe::new(name, HeaderOnlyBuild::default())
    }

    #[test]
    fn test_requirement_parse() {
        assert_eq!(
            Requirement::parse("grpc==v1.20.1").unwrap(),
            Requirement {
                name: "grpc".to_string(),
                pin: Some("v1.20.1".to_string())
            }
        );
        assert_eq!(Requirement::parse(" zlib ").unwrap().pin, None);
        assert!(Requirement::parse("grpc>=1.0").is_err());
        assert!(Requirement::parse("grpc==").is_err());
        assert!(Requirement::parse("").is_err());
    }

    #[test]
    fn test_conflicting_pins() {
        let registry = Registry::new().with(recipe("zlib")).unwrap();
        let err = resolve(&registry, &["zlib==1.2", "zlib==1.3"]).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_pin_overrides_version() {
        let registry = Registry::new()
            .with(
                recipe("grpc")
                    .with_version("v1.20.1")
                    .with_url("https://github.com/grpc/grpc/archive/{version}.zip"),
            )
            .unwrap();
        let plan = resolve(&registry, &["grpc==v1.21.0"]).unwrap();
        let grpc = plan.get("grpc").unwrap();
        assert_eq!(grpc.version.as_deref(), Some("v1.21.0"));
        assert_eq!(
            grpc.url().as_deref(),
            Some("https://github.com/grpc/grpc/archive/v1.21.0.zip")
        );
        assert_eq!(
            registry.get("grpc").unwrap().version.as_deref(),
            Some("v1.20.1")
        );
    }

    #[test]
    fn test_depends_and_conflicts_overlap() {
        let registry = Registry::new()
            .with(recipe("a"))
            .unwrap()
            .with(recipe("b").with_depends(&["a"]).with_conflicts(&["a"]))
            .unwrap();
        match resolve(&registry, &["b"]).unwrap_err() {
            Error::Conflict { first, second } => {
                assert_eq!(first, "b");
                assert_eq!(second, "a");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_optional_edge_orders_when_selected() {
        let registry = Registry::new()
            .with(recipe("aaa").with_opt_depends(&["zzz"]))
            .unwrap()
            .with(recipe("zzz"))
            .unwrap();

        let plan = resolve(&registry, &["aaa", "zzz"]).unwrap();
        assert_eq!(plan.names(), vec!["zzz", "aaa"]);

        let plan = resolve(&registry, &["aaa"]).unwrap();
        assert_eq!(plan.names(), vec!["aaa"]);
    }

    #[test]
    fn test_optional_edge_closing_cycle_is_dropped() {
        let registry = Registry::new()
            .with(recipe("a").with_depends(&["b"]))
            .unwrap()
            .with(recipe("b").with_opt_depends(&["a"]))
            .unwrap();
        let plan = resolve(&registry, &["a"]).unwrap();
        assert_eq!(plan.names(), vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_dependency_names_parent() {
        let registry = Registry::new()
            .with(recipe("android").with_depends(&["pygame"]))
            .unwrap();
        match resolve(&registry, &["android"]).unwrap_err() {
            Error::UnknownRecipe { name, required_by } => {
                assert_eq!(name, "pygame");
                assert_eq!(required_by.as_deref(), Some("android"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_empty_request() {
        let registry = Registry::new();
        let none: [&str; 0] = [];
        assert!(matches!(
            resolve(&registry, &none).unwrap_err(),
            Error::InvalidRequest(_)
        ));
    }
}
