// tests/recipes.rs

//! Tests against the recipe files shipped in `recipes/`.

mod common;

use common::fixture;
use crossbake::env::EnvironmentBuilder;
use crossbake::recipe::{Registry, Source};
use crossbake::source::{PreparedSources, SourceProvider};
use crossbake::{Error, resolve};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn shipped_registry() -> Registry {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("recipes");
    Registry::load_dir(&dir).unwrap()
}

#[test]
fn test_shipped_recipes_load() {
    let registry = shipped_registry();
    for name in ["android", "grpc", "libffi", "openssl", "pygame", "python3", "sdl2", "zlib"] {
        assert!(registry.contains(name), "missing recipe {name}");
    }
    assert!(registry.dangling_references().is_empty());

    let python = registry.get("python3").unwrap();
    assert!(python.runtime.is_some());
    assert_eq!(
        python.url().as_deref(),
        Some("https://www.python.org/ftp/python/3.8.1/Python-3.8.1.tgz")
    );
}

#[test]
fn test_grpc_plan() {
    let registry = shipped_registry();
    let plan = resolve(&registry, &["grpc"]).unwrap();
    assert_eq!(plan.names(), vec!["libffi", "python3", "grpc"]);

    let with_ssl = resolve(&registry, &["grpc", "openssl"]).unwrap();
    assert!(with_ssl.position("openssl").unwrap() < with_ssl.position("python3").unwrap());
}

#[test]
fn test_android_conflicts_with_sdl2() {
    let registry = shipped_registry();
    let err = resolve(&registry, &["android", "sdl2"]).unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert!(err.to_string().contains("sdl2"));

    let plan = resolve(&registry, &["android"]).unwrap();
    assert_eq!(plan.names(), vec!["libffi", "python3", "pygame", "android"]);
}

#[test]
fn test_grpc_environment() {
    let fx = fixture(&["arm64-v8a"]);
    let registry = shipped_registry();
    let arch = &fx.ctx.architectures()[0];
    let grpc = registry.get("grpc").unwrap();
    let python = registry.get("python3").unwrap();

    let env = EnvironmentBuilder::new(&fx.ctx)
        .with_runtime(Some(python.as_ref()))
        .build(grpc, arch, &BTreeSet::new());

    assert_eq!(env.get("ANDROID_NDK"), Some(fx.ndk.path().to_str().unwrap()));
    assert_eq!(env.get("ANDROID_ABI"), Some("arm64-v8a"));
    assert_eq!(env.get("RUNTIME_VERSION"), Some("3.8"));

    let python_install = fx.ctx.work_dirs("python3", arch).install;
    assert_eq!(
        env.get("RUNTIME_INCLUDE_ROOT").map(PathBuf::from),
        Some(python_install.join("include/python3.8"))
    );

    let build_dir = fx.ctx.work_dirs("grpc", arch).build;
    assert_eq!(env.artifact_dir(), &build_dir.join("lib").join("arm64-v8a"));
}

#[test]
fn test_included_files_source_is_copied() {
    let fx = fixture(&["x86"]);
    let registry = shipped_registry();
    let android = registry.get("android").unwrap();
    assert!(matches!(android.source, Source::Path(_)));
    assert_eq!(android.version_str(), "-");

    let dest = tempfile::tempdir().unwrap();
    let sources = PreparedSources::new(fx.ctx.packages_dir());
    sources
        .prepare(android, &fx.ctx.architectures()[0], dest.path())
        .unwrap();
    assert!(dest.path().join("setup.py").is_file());
    assert!(dest.path().join("android/__init__.py").is_file());
}
