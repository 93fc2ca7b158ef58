// src/source.rs

//! Source preparation
//!
//! Downloading and extracting archives is outside this crate. A
//! [`SourceProvider`] places a recipe's sources into a pair's `src/`
//! directory; [`PreparedSources`] handles local trees and archives that were
//! already extracted under `<build_root>/packages/<recipe>/`.

use crate::arch::Architecture;
use crate::error::{Error, Result};
use crate::recipe::{Recipe, Source};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Fills a pair's source directory
pub trait SourceProvider: Send + Sync {
    /// Populate `dest`, which exists and is empty
    fn prepare(&self, recipe: &Recipe, arch: &Architecture, dest: &Path) -> Result<()>;
}

/// Copies local or pre-extracted sources
#[derive(Debug, Clone)]
pub struct PreparedSources {
    packages_dir: PathBuf,
}

impl PreparedSources {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    /// Where the extracted tree for `recipe` is expected
    pub fn package_dir(&self, recipe: &str) -> PathBuf {
        self.packages_dir.join(recipe)
    }
}

impl SourceProvider for PreparedSources {
    fn prepare(&self, recipe: &Recipe, arch: &Architecture, dest: &Path) -> Result<()> {
        let tree = match &recipe.source {
            Source::None => return Ok(()),
            Source::Path(path) => {
                if !path.is_dir() {
                    return Err(Error::SourceUnavailable {
                        recipe: recipe.name.clone(),
                        reason: format!("local source {} does not exist", path.display()),
                    });
                }
                path.clone()
            }
            Source::Url(_) => {
                let extracted = self.package_dir(&recipe.name);
                if !extracted.is_dir() {
                    return Err(Error::SourceUnavailable {
                        recipe: recipe.name.clone(),
                        reason: format!(
                            "{} has not been fetched; extract it into {}",
                            recipe.url().unwrap_or_default(),
                            extracted.display()
                        ),
                    });
                }
                extracted
            }
        };

        let copied = copy_tree(&tree, dest)?;
        debug!(
            "[{} {}] prepared {} source files from {}",
            recipe.name,
            arch,
            copied,
            tree.display()
        );
        Ok(())
    }
}

/// Recursively copy `src` into `dest`, keeping symlinks as symlinks
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
    let mut count = 0;
    fs::create_dir_all(dest)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
            count += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::procedure::HeaderOnlyBuild;
    use tempfile::TempDir;

    fn arch() -> Architecture {
        Architecture::android("x86", 21).unwrap()
    }

    #[test]
    fn test_copy_tree() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("a/b/file.c"), "int x;").unwrap();
        fs::write(src.path().join("top.h"), "#pragma once").unwrap();
        std::os::unix::fs::symlink("top.h", src.path().join("alias.h")).unwrap();

        let count = copy_tree(src.path(), dest.path()).unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            fs::read_to_string(dest.path().join("a/b/file.c")).unwrap(),
            "int x;"
        );
        assert!(dest.path().join("alias.h").symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_prepare_local_path() {
        let local = TempDir::new().unwrap();
        fs::write(local.path().join("setup.py"), "").unwrap();
        let dest = TempDir::new().unwrap();
        let packages = TempDir::new().unwrap();

        let recipe = Recipe::new("android", HeaderOnlyBuild::default()).with_path(local.path());
        PreparedSources::new(packages.path())
            .prepare(&recipe, &arch(), dest.path())
            .unwrap();
        assert!(dest.path().join("setup.py").exists());
    }

    #[test]
    fn test_prepare_url_requires_extracted_tree() {
        let dest = TempDir::new().unwrap();
        let packages = TempDir::new().unwrap();
        let recipe = Recipe::new("grpc", HeaderOnlyBuild::default())
            .with_version("v1.20.1")
            .with_url("https://github.com/grpc/grpc/archive/{version}.zip");
        let provider = PreparedSources::new(packages.path());

        let err = provider.prepare(&recipe, &arch(), dest.path()).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        assert!(err.to_string().contains("v1.20.1.zip"));

        fs::create_dir_all(packages.path().join("grpc")).unwrap();
        fs::write(packages.path().join("grpc/CMakeLists.txt"), "").unwrap();
        provider.prepare(&recipe, &arch(), dest.path()).unwrap();
        assert!(dest.path().join("CMakeLists.txt").exists());
    }

    #[test]
    fn test_prepare_no_source_is_noop() {
        let dest = TempDir::new().unwrap();
        let recipe = Recipe::new("meta", HeaderOnlyBuild::default());
        PreparedSources::new("/nonexistent")
            .prepare(&recipe, &arch(), dest.path())
            .unwrap();
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
