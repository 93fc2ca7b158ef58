// src/aggregate.rs

//! Artifact aggregation into `libs_dir/<arch>/`
//!
//! Every architecture gets its own output directory, so workers never write
//! to the same path. Within one architecture, two recipes claiming the same
//! file name is an error: it is caught over the whole plan before building,
//! and again at copy time through a claims table.
//!
//! Completed pairs also have their `install/` tree merged into the shared
//! staging prefix for the architecture, which is where dependents find
//! headers and libraries through `CFLAGS` and `LDFLAGS`.

use crate::arch::Architecture;
use crate::context::BuildContext;
use crate::driver::PairBuild;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::resolver::BuildPlan;
use crate::source::copy_tree;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Fail if two recipes in the plan declare the same artifact name
///
/// Declared artifacts are the same for every architecture, so the collision
/// is reported for the first requested architecture.
pub fn check_declared_collisions(plan: &BuildPlan, archs: &[Architecture]) -> Result<()> {
    let Some(arch) = archs.first() else {
        return Ok(());
    };

    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for recipe in plan.recipes() {
        for artifact in &recipe.generated_libraries {
            if let Some(first) = owners.insert(artifact.as_str(), recipe.name.as_str())
                && first != recipe.name
            {
                return Err(Error::ArtifactCollision {
                    arch: arch.name.clone(),
                    artifact: artifact.clone(),
                    first: first.to_string(),
                    second: recipe.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Copies built artifacts into the shared per-arch libs directory
#[derive(Debug)]
pub struct ArtifactAggregator<'a> {
    ctx: &'a BuildContext,
    claims: Mutex<HashMap<(String, String), String>>,
}

impl<'a> ArtifactAggregator<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self {
            ctx,
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// Copy a pair's artifacts; returns their destination paths
    pub fn collect(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        built: &PairBuild,
    ) -> Result<Vec<PathBuf>> {
        self.claim(recipe, arch)?;

        let dest_dir = self.ctx.arch_libs_dir(arch);
        fs::create_dir_all(&dest_dir)?;

        let mut copied = Vec::with_capacity(recipe.generated_libraries.len());
        for artifact in &recipe.generated_libraries {
            let source = built.artifact_dir.join(artifact);
            if !source.is_file() {
                return Err(Error::ArtifactMissing {
                    recipe: recipe.name.clone(),
                    arch: arch.name.clone(),
                    missing: vec![artifact.clone()],
                    dir: built.artifact_dir.clone(),
                });
            }

            let dest = dest_dir.join(artifact);
            let tmp = dest_dir.join(format!(".{}.{}.tmp", artifact, recipe.name));
            fs::copy(&source, &tmp)?;
            fs::rename(&tmp, &dest)?;
            debug!("[{} {}] collected {}", recipe.name, arch, dest.display());
            copied.push(dest);
        }

        Ok(copied)
    }

    /// Merge a pair's install tree into `staging_dir(arch)`
    ///
    /// Returns the number of files staged. Later recipes overwrite files
    /// staged by earlier ones.
    pub fn stage(&self, recipe: &Recipe, arch: &Architecture) -> Result<u64> {
        let install = self.ctx.work_dirs(&recipe.name, arch).install;
        if !install.is_dir() {
            return Ok(0);
        }
        let staging = self.ctx.staging_dir(arch);
        let staged = copy_tree(&install, &staging)?;
        debug!(
            "[{} {}] staged {} file(s) into {}",
            recipe.name,
            arch,
            staged,
            staging.display()
        );
        Ok(staged)
    }

    fn claim(&self, recipe: &Recipe, arch: &Architecture) -> Result<()> {
        let mut claims = self.claims.lock();
        for artifact in &recipe.generated_libraries {
            let key = (arch.name.clone(), artifact.clone());
            if let Some(owner) = claims.get(&key)
                && owner != &recipe.name
            {
                return Err(Error::ArtifactCollision {
                    arch: arch.name.clone(),
                    artifact: artifact.clone(),
                    first: owner.clone(),
                    second: recipe.name.clone(),
                });
            }
        }
        for artifact in &recipe.generated_libraries {
            claims.insert(
                (arch.name.clone(), artifact.clone()),
                recipe.name.clone(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Registry;
    use crate::recipe::procedure::HeaderOnlyBuild;
    use crate::resolver::resolve;
    use tempfile::TempDir;

    fn recipe(name: &str, libs: &[&str]) -> Recipe {
        Recipe::new(name, HeaderOnlyBuild::default()).with_libraries(libs)
    }

    #[test]
    fn test_static_collision_check() {
        let registry = Registry::new()
            .with(recipe("openssl", &["libssl.so", "libcrypto.so"]))
            .unwrap()
            .with(recipe("boringssl", &["libcrypto.so"]))
            .unwrap();
        let plan = resolve(&registry, &["openssl", "boringssl"]).unwrap();
        let archs = vec![Architecture::android("x86", 21).unwrap()];

        match check_declared_collisions(&plan, &archs).unwrap_err() {
            Error::ArtifactCollision {
                artifact,
                first,
                second,
                arch,
            } => {
                assert_eq!(artifact, "libcrypto.so");
                assert_eq!(first, "boringssl");
                assert_eq!(second, "openssl");
                assert_eq!(arch, "x86");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_collect_copies_and_detects_runtime_collision() {
        let ndk = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let ctx = BuildContext::builder()
            .with_architecture(Architecture::android("x86_64", 21).unwrap())
            .with_ndk_dir(ndk.path())
            .with_build_root(root.path())
            .finish()
            .unwrap();
        let arch = &ctx.architectures()[0];

        let out = root.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("libz.so"), "z").unwrap();
        let built = PairBuild {
            cached: false,
            artifact_dir: out.clone(),
            artifacts: vec![out.join("libz.so")],
        };

        let aggregator = ArtifactAggregator::new(&ctx);
        let zlib = recipe("zlib", &["libz.so"]);
        let copied = aggregator.collect(&zlib, arch, &built).unwrap();
        assert_eq!(copied, vec![ctx.arch_libs_dir(arch).join("libz.so")]);
        assert_eq!(fs::read_to_string(&copied[0]).unwrap(), "z");

        // Same recipe again is not a collision.
        aggregator.collect(&zlib, arch, &built).unwrap();

        let other = recipe("zlib-ng", &["libz.so"]);
        assert!(matches!(
            aggregator.collect(&other, arch, &built),
            Err(Error::ArtifactCollision { .. })
        ));
    }

    #[test]
    fn test_stage_merges_install_tree() {
        let ndk = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let ctx = BuildContext::builder()
            .with_architecture(Architecture::android("x86", 21).unwrap())
            .with_ndk_dir(ndk.path())
            .with_build_root(root.path())
            .finish()
            .unwrap();
        let arch = &ctx.architectures()[0];
        let aggregator = ArtifactAggregator::new(&ctx);

        let libffi = recipe("libffi", &[]);
        assert_eq!(aggregator.stage(&libffi, arch).unwrap(), 0);

        let install = ctx.work_dirs("libffi", arch).install;
        fs::create_dir_all(install.join("include")).unwrap();
        fs::create_dir_all(install.join("lib/pkgconfig")).unwrap();
        fs::write(install.join("include/ffi.h"), "typedef int ffi_type;").unwrap();
        fs::write(install.join("lib/pkgconfig/libffi.pc"), "Name: libffi").unwrap();

        assert_eq!(aggregator.stage(&libffi, arch).unwrap(), 2);
        let staging = ctx.staging_dir(arch);
        assert!(staging.join("include/ffi.h").is_file());
        assert!(staging.join("lib/pkgconfig/libffi.pc").is_file());
    }
}
