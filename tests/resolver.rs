// tests/resolver.rs

//! Resolution order, cycle and conflict tests over realistic registries.

mod common;

use common::fake_recipe;
use crossbake::recipe::Registry;
use crossbake::{Error, resolve};

/// A registry shaped like a typical Android app tree
fn app_registry() -> Registry {
    Registry::new()
        .with(fake_recipe("hostpython3").with_version("3.8.1"))
        .unwrap()
        .with(fake_recipe("libffi").with_version("v3.3"))
        .unwrap()
        .with(fake_recipe("openssl").with_version("1.1.1f"))
        .unwrap()
        .with(
            fake_recipe("python3")
                .with_version("3.8.1")
                .with_depends(&["hostpython3", "libffi"])
                .with_opt_depends(&["openssl", "sqlite3"]),
        )
        .unwrap()
        .with(fake_recipe("sdl2").with_depends(&["python3"]))
        .unwrap()
        .with(
            fake_recipe("pygame")
                .with_depends(&["python3"])
                .with_conflicts(&["sdl2"]),
        )
        .unwrap()
        .with(fake_recipe("kivy").with_depends(&["sdl2", "python3"]))
        .unwrap()
        .with(fake_recipe("sqlite3"))
        .unwrap()
}

fn assert_dependencies_first(registry: &Registry, order: &[&str]) {
    for (i, name) in order.iter().enumerate() {
        let recipe = registry.get(name).unwrap();
        for dep in &recipe.depends {
            let j = order.iter().position(|n| n == dep).unwrap();
            assert!(j < i, "{} must come before {} in {:?}", dep, name, order);
        }
        for opt in recipe.opt_depends.iter() {
            if let Some(j) = order.iter().position(|n| n == opt) {
                assert!(j < i, "{} must come before {} in {:?}", opt, name, order);
            }
        }
    }
}

#[test]
fn test_dependencies_precede_dependents() {
    let registry = app_registry();
    let plan = resolve(&registry, &["kivy"]).unwrap();

    assert_dependencies_first(&registry, &plan.names());
    assert_eq!(plan.names().last(), Some(&"kivy"));
    assert!(!plan.contains("openssl"));
    assert!(!plan.contains("pygame"));
}

#[test]
fn test_selected_optional_dependency_orders_first() {
    let registry = app_registry();
    let plan = resolve(&registry, &["python3", "openssl"]).unwrap();

    assert_eq!(plan.names(), vec!["hostpython3", "libffi", "openssl", "python3"]);
}

#[test]
fn test_resolution_is_deterministic() {
    let registry = app_registry();
    let first = resolve(&registry, &["kivy", "openssl"]).unwrap();
    let second = resolve(&registry, &["openssl", "kivy"]).unwrap();
    assert_eq!(first.names(), second.names());
}

#[test]
fn test_two_recipe_cycle_names_both() {
    let registry = Registry::new()
        .with(fake_recipe("a").with_depends(&["b"]))
        .unwrap()
        .with(fake_recipe("b").with_depends(&["a"]))
        .unwrap();

    match resolve(&registry, &["a"]).unwrap_err() {
        Error::Cycle { cycle } => {
            assert!(cycle.contains(&"a".to_string()));
            assert!(cycle.contains(&"b".to_string()));
        }
        other => panic!("expected cycle, got {other}"),
    }
}

#[test]
fn test_conflict_detected_regardless_of_declaring_side() {
    let registry = app_registry();

    for request in [["pygame", "kivy"], ["kivy", "pygame"]] {
        let err = resolve(&registry, &request).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }), "got {err}");
        assert!(err.to_string().contains("pygame"));
        assert!(err.to_string().contains("sdl2"));
    }
}

#[test]
fn test_conflict_reported_in_build_order() {
    let registry = Registry::new()
        .with(fake_recipe("A"))
        .unwrap()
        .with(fake_recipe("B").with_depends(&["A"]))
        .unwrap()
        .with(fake_recipe("C").with_conflicts(&["B"]))
        .unwrap();

    match resolve(&registry, &["A", "B", "C"]).unwrap_err() {
        Error::Conflict { first, second } => {
            assert_eq!(first, "B");
            assert_eq!(second, "C");
        }
        other => panic!("expected conflict, got {other}"),
    }

    let plan = resolve(&registry, &["A", "B"]).unwrap();
    assert_eq!(plan.names(), vec!["A", "B"]);
}

#[test]
fn test_unknown_dependency_names_requirer() {
    let registry = app_registry();
    let registry = {
        let mut r = registry;
        r.insert(fake_recipe("pyjnius").with_depends(&["six"])).unwrap();
        r
    };

    match resolve(&registry, &["pyjnius"]).unwrap_err() {
        Error::UnknownRecipe { name, required_by } => {
            assert_eq!(name, "six");
            assert_eq!(required_by.as_deref(), Some("pyjnius"));
        }
        other => panic!("expected unknown recipe, got {other}"),
    }
}

#[test]
fn test_version_pin_applies() {
    let registry = Registry::new()
        .with(
            fake_recipe("grpc")
                .with_version("v1.20.1")
                .with_url("https://github.com/grpc/grpc/archive/{version}.tar.gz"),
        )
        .unwrap();

    let plan = resolve(&registry, &["grpc==v1.24.0"]).unwrap();
    let grpc = plan.get("grpc").unwrap();
    assert_eq!(grpc.version.as_deref(), Some("v1.24.0"));
    assert_eq!(
        grpc.url().as_deref(),
        Some("https://github.com/grpc/grpc/archive/v1.24.0.tar.gz")
    );

    assert!(matches!(
        resolve(&registry, &["grpc==1", "grpc==2"]),
        Err(Error::InvalidRequest(_))
    ));
}
