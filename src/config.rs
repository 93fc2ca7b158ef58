// src/config.rs

//! `crossbake.toml` configuration
//!
//! Every key is optional. Values from the file are overridden by command
//! line flags; unset toolchain paths are discovered from the environment
//! when the build context is assembled.
//!
//! ```toml
//! build_root = "build"
//! recipes_dir = "recipes"
//! ndk_api = 24
//! archs = ["arm64-v8a", "armeabi-v7a"]
//! runtime = "python3"
//! jobs = 8
//! step_timeout_secs = 3600
//! ```

use crate::arch::{Architecture, DEFAULT_API_LEVEL};
use crate::context::BuildContextBuilder;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "crossbake.toml";

/// Architectures built when none are configured
pub const DEFAULT_ARCHS: &[&str] = &["armeabi-v7a", "arm64-v8a"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub build_root: Option<PathBuf>,
    pub libs_dir: Option<PathBuf>,
    pub install_prefix: Option<PathBuf>,
    pub ndk_dir: Option<PathBuf>,
    pub sdk_dir: Option<PathBuf>,
    pub ndk_api: Option<u32>,
    pub archs: Vec<String>,
    pub runtime: Option<String>,
    pub host_runtime: Option<PathBuf>,
    pub recipes_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub step_timeout_secs: Option<u64>,
}

impl Config {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Load `path`, or `./crossbake.toml` if present, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Make relative paths relative to the config file's directory
    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.build_root,
            &mut self.libs_dir,
            &mut self.install_prefix,
            &mut self.ndk_dir,
            &mut self.sdk_dir,
            &mut self.recipes_dir,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() && !base.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn api_level(&self) -> u32 {
        self.ndk_api.unwrap_or(DEFAULT_API_LEVEL)
    }

    pub fn recipes_dir(&self) -> PathBuf {
        self.recipes_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("recipes"))
    }

    /// Architecture descriptors, in configured order
    ///
    /// `overrides` replaces the configured list when non-empty.
    pub fn architectures(&self, overrides: &[String]) -> Result<Vec<Architecture>> {
        let names: Vec<&str> = if !overrides.is_empty() {
            overrides.iter().map(String::as_str).collect()
        } else if !self.archs.is_empty() {
            self.archs.iter().map(String::as_str).collect()
        } else {
            DEFAULT_ARCHS.to_vec()
        };

        names
            .into_iter()
            .map(|name| {
                Architecture::android(name, self.api_level())
                    .ok_or_else(|| Error::Config(format!("Unknown architecture '{}'", name)))
            })
            .collect()
    }

    /// Context builder preloaded with this configuration
    pub fn context_builder(&self, arch_overrides: &[String]) -> Result<BuildContextBuilder> {
        let mut builder =
            BuildContextBuilder::new().with_architectures(self.architectures(arch_overrides)?);

        if let Some(path) = &self.build_root {
            builder = builder.with_build_root(path);
        }
        if let Some(path) = &self.libs_dir {
            builder = builder.with_libs_dir(path);
        }
        if let Some(path) = &self.install_prefix {
            builder = builder.with_install_prefix(path);
        }
        if let Some(path) = &self.ndk_dir {
            builder = builder.with_ndk_dir(path);
        }
        if let Some(path) = &self.sdk_dir {
            builder = builder.with_sdk_dir(path);
        }
        if let Some(name) = &self.runtime {
            builder = builder.with_runtime_recipe(name);
        }
        if let Some(path) = &self.host_runtime {
            builder = builder.with_host_runtime(path);
        }
        if let Some(jobs) = self.jobs {
            builder = builder.with_jobs(jobs);
        }
        if let Some(secs) = self.step_timeout_secs {
            builder = builder.with_step_timeout(Duration::from_secs(secs));
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
build_root = "/tmp/cb"
ndk_api = 24
archs = ["arm64-v8a", "x86_64"]
runtime = "python3"
jobs = 6
step_timeout_secs = 600
"#,
        )
        .unwrap();
        assert_eq!(config.api_level(), 24);
        let archs = config.architectures(&[]).unwrap();
        assert_eq!(archs.len(), 2);
        assert_eq!(archs[1].name, "x86_64");
        assert_eq!(archs[1].api_level, 24);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("bogus = 1").is_err());
    }

    #[test]
    fn test_default_and_override_archs() {
        let config = Config::default();
        let names: Vec<_> = config
            .architectures(&[])
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["armeabi-v7a", "arm64-v8a"]);

        let archs = config.architectures(&["x86".to_string()]).unwrap();
        assert_eq!(archs[0].name, "x86");
        assert!(config.architectures(&["mips".to_string()]).is_err());
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "build_root = \"out\"\nrecipes_dir = \"/abs/recipes\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.build_root, Some(dir.path().join("out")));
        assert_eq!(config.recipes_dir(), PathBuf::from("/abs/recipes"));
    }

    #[test]
    fn test_context_builder_applies_values() {
        let ndk = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let config = Config {
            build_root: Some(root.path().to_path_buf()),
            ndk_dir: Some(ndk.path().to_path_buf()),
            jobs: Some(3),
            runtime: Some("python3".to_string()),
            host_runtime: Some(PathBuf::from("/usr/bin/python3")),
            ..Default::default()
        };
        let ctx = config.context_builder(&[]).unwrap().finish().unwrap();
        assert_eq!(ctx.jobs(), 3);
        assert_eq!(ctx.runtime_recipe(), Some("python3"));
        assert_eq!(ctx.build_root(), root.path());
    }
}
