// src/env.rs

//! Per-pair build environments
//!
//! A [`RecipeEnv`] is computed fresh for every `(recipe, architecture)` pair
//! from the frozen [`BuildContext`]. It is never shared between pairs or
//! mutated after construction, which keeps concurrent architecture workers
//! from seeing each other's toolchain settings.
//!
//! Besides the process environment handed to build tools, a `RecipeEnv`
//! carries the template variables used to render `%(name)s` placeholders in
//! recipe declarations:
//!
//! | variable | value |
//! |----------|-------|
//! | `name`, `version` | recipe name and version |
//! | `arch`, `triple`, `clang_target`, `api_level`, `cpu_family` | architecture |
//! | `ndk_dir`, `sdk_dir`, `toolchain_bin`, `sysroot`, `cmake_toolchain` | toolchain |
//! | `work_dir`, `source_dir`, `build_dir`, `install_dir` | pair directories |
//! | `staging_dir`, `libs_dir`, `build_root` | shared directories |
//! | `jobs`, `host_runtime` | build settings |
//! | `runtime_include`, `runtime_link`, `runtime_version` | runtime roots |

use crate::arch::Architecture;
use crate::context::BuildContext;
use crate::recipe::{Recipe, substitute};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Immutable environment for one `(recipe, architecture)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeEnv {
    vars: BTreeMap<String, String>,
    template_vars: BTreeMap<String, String>,
    artifact_dir: PathBuf,
    available_opt_depends: BTreeSet<String>,
}

impl RecipeEnv {
    /// Process environment for build tools
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn template_vars(&self) -> &BTreeMap<String, String> {
        &self.template_vars
    }

    /// Render a recipe template against this pair
    pub fn render(&self, template: &str) -> String {
        substitute(template, &self.template_vars)
    }

    /// Directory where declared artifacts are expected after the build
    pub fn artifact_dir(&self) -> &PathBuf {
        &self.artifact_dir
    }

    /// Optional dependencies that were built successfully for this architecture
    pub fn available_opt_depends(&self) -> &BTreeSet<String> {
        &self.available_opt_depends
    }

    pub fn has_opt_depend(&self, name: &str) -> bool {
        self.available_opt_depends.contains(name)
    }
}

/// Computes [`RecipeEnv`]s from a read-only context
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentBuilder<'a> {
    ctx: &'a BuildContext,
    runtime: Option<&'a Recipe>,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx, runtime: None }
    }

    /// Recipe providing include/link roots to recipes that depend on it
    pub fn with_runtime(mut self, runtime: Option<&'a Recipe>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn build(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        available_opt_depends: &BTreeSet<String>,
    ) -> RecipeEnv {
        let ctx = self.ctx;
        let mut template_vars = base_template_vars(ctx, recipe, arch);

        let available: BTreeSet<String> = recipe
            .opt_depends
            .intersection(available_opt_depends)
            .cloned()
            .collect();

        let runtime = self.runtime_roots(recipe, arch, &available);
        if let Some(roots) = &runtime {
            template_vars.insert("runtime_include".to_string(), roots.include.clone());
            template_vars.insert("runtime_link".to_string(), roots.link.clone());
            template_vars.insert("runtime_version".to_string(), roots.version.clone());
        }

        let bin = ctx.toolchain_bin();
        let target = arch.compiler_target();
        let tool = |name: &str| bin.join(name).to_string_lossy().to_string();
        let staging = ctx.staging_dir(arch);
        let dirs = ctx.work_dirs(&recipe.name, arch);

        let mut vars = BTreeMap::new();
        for (key, value) in ctx.host_env() {
            if key != "PATH" {
                vars.insert(key.clone(), value.clone());
            }
        }

        vars.insert("CC".to_string(), tool(&format!("{}-clang", target)));
        vars.insert("CXX".to_string(), tool(&format!("{}-clang++", target)));
        vars.insert("AR".to_string(), tool("llvm-ar"));
        vars.insert("AS".to_string(), tool("llvm-as"));
        vars.insert("LD".to_string(), tool("ld.lld"));
        vars.insert("NM".to_string(), tool("llvm-nm"));
        vars.insert("RANLIB".to_string(), tool("llvm-ranlib"));
        vars.insert("STRIP".to_string(), tool("llvm-strip"));
        vars.insert("READELF".to_string(), tool("llvm-readelf"));

        let mut cflags = vec![
            arch.cflags(),
            "-DANDROID".to_string(),
            format!("-I{}", staging.join("include").display()),
        ];
        let mut ldflags = vec![
            format!("-L{}", ctx.arch_libs_dir(arch).display()),
            format!("-L{}", staging.join("lib").display()),
        ];
        if let Some(roots) = &runtime {
            cflags.push(format!("-I{}", roots.include));
            ldflags.push(format!("-L{}", roots.link));
            vars.insert("RUNTIME_INCLUDE_ROOT".to_string(), roots.include.clone());
            vars.insert("RUNTIME_LINK_ROOT".to_string(), roots.link.clone());
            vars.insert("RUNTIME_VERSION".to_string(), roots.version.clone());
        }
        let cflags = cflags.join(" ");
        vars.insert("CFLAGS".to_string(), cflags.clone());
        vars.insert("CXXFLAGS".to_string(), cflags);
        vars.insert("LDFLAGS".to_string(), ldflags.join(" "));

        vars.insert("ANDROID_NDK".to_string(), path_str(ctx.ndk_dir()));
        if let Some(sdk) = ctx.sdk_dir() {
            vars.insert("ANDROID_SDK".to_string(), path_str(sdk));
        }
        vars.insert("ANDROID_API".to_string(), arch.api_level.to_string());
        vars.insert("ANDROID_ABI".to_string(), arch.name.clone());
        vars.insert("ARCH".to_string(), arch.name.clone());
        vars.insert("TARGET".to_string(), arch.toolchain_prefix.clone());
        vars.insert("SYSROOT".to_string(), path_str(&ctx.sysroot()));
        vars.insert("PREFIX".to_string(), path_str(&dirs.install));
        vars.insert("STAGING_PREFIX".to_string(), path_str(&staging));
        vars.insert("MAKEFLAGS".to_string(), format!("-j{}", ctx.jobs()));
        if let Some(host) = ctx.host_runtime() {
            vars.insert("HOST_RUNTIME".to_string(), path_str(host));
        }

        let path = match ctx.host_env().get("PATH") {
            Some(host_path) if !host_path.is_empty() => {
                format!("{}:{}", bin.display(), host_path)
            }
            _ => path_str(&bin),
        };
        vars.insert("PATH".to_string(), path);

        vars.insert(
            "CROSSBAKE_OPT_DEPENDS".to_string(),
            available.iter().cloned().collect::<Vec<_>>().join(" "),
        );

        for (key, value) in &recipe.env {
            vars.insert(key.clone(), substitute(value, &template_vars));
        }

        let artifact_dir = match &recipe.lib_dir {
            Some(template) => PathBuf::from(substitute(template, &template_vars)),
            None => dirs.install.join("lib"),
        };

        RecipeEnv {
            vars,
            template_vars,
            artifact_dir,
            available_opt_depends: available,
        }
    }

    fn runtime_roots(
        &self,
        recipe: &Recipe,
        arch: &Architecture,
        available: &BTreeSet<String>,
    ) -> Option<RuntimeRoots> {
        let runtime = self.runtime?;
        let capability = runtime.runtime.as_ref()?;
        if runtime.name == recipe.name
            || !(recipe.depends.contains(&runtime.name) || available.contains(&runtime.name))
        {
            return None;
        }

        let vars = base_template_vars(self.ctx, runtime, arch);
        let version = match &capability.version {
            Some(template) => substitute(template, &vars),
            None => runtime.version.clone().unwrap_or_default(),
        };
        Some(RuntimeRoots {
            include: substitute(&capability.include_root, &vars),
            link: substitute(&capability.link_root, &vars),
            version,
        })
    }
}

struct RuntimeRoots {
    include: String,
    link: String,
    version: String,
}

fn base_template_vars(
    ctx: &BuildContext,
    recipe: &Recipe,
    arch: &Architecture,
) -> BTreeMap<String, String> {
    let dirs = ctx.work_dirs(&recipe.name, arch);
    let mut vars = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        vars.insert(key.to_string(), value);
    };

    set("name", recipe.name.clone());
    set("version", recipe.version.clone().unwrap_or_default());
    set("arch", arch.name.clone());
    set("triple", arch.toolchain_prefix.clone());
    set("clang_target", arch.compiler_target());
    set("api_level", arch.api_level.to_string());
    set("cpu_family", arch.cpu_family.clone());
    set("ndk_dir", path_str(ctx.ndk_dir()));
    set(
        "sdk_dir",
        ctx.sdk_dir().map(path_str).unwrap_or_default(),
    );
    set("toolchain_bin", path_str(&ctx.toolchain_bin()));
    set("sysroot", path_str(&ctx.sysroot()));
    set("cmake_toolchain", path_str(&ctx.cmake_toolchain_file()));
    set("work_dir", path_str(&dirs.root));
    set("source_dir", path_str(&dirs.source));
    set("build_dir", path_str(&dirs.build));
    set("install_dir", path_str(&dirs.install));
    set("staging_dir", path_str(&ctx.staging_dir(arch)));
    set("libs_dir", path_str(&ctx.arch_libs_dir(arch)));
    set("build_root", path_str(ctx.build_root()));
    set("jobs", ctx.jobs().to_string());
    set(
        "host_runtime",
        ctx.host_runtime().map(path_str).unwrap_or_default(),
    );
    vars
}

fn path_str(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::RuntimeCapability;
    use crate::recipe::procedure::HeaderOnlyBuild;
    use tempfile::TempDir;

    struct Fixture {
        _ndk: TempDir,
        _root: TempDir,
        ctx: BuildContext,
    }

    fn fixture() -> Fixture {
        let ndk = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let ctx = BuildContext::builder()
            .with_architecture(Architecture::android("arm64-v8a", 24).unwrap())
            .with_architecture(Architecture::android("x86_64", 24).unwrap())
            .with_ndk_dir(ndk.path())
            .with_ndk_host_tag("linux-x86_64")
            .with_build_root(root.path())
            .with_jobs(4)
            .finish()
            .unwrap();
        Fixture {
            _ndk: ndk,
            _root: root,
            ctx,
        }
    }

    fn python3() -> Recipe {
        Recipe::new("python3", HeaderOnlyBuild::default())
            .with_version("3.11.5")
            .with_runtime(RuntimeCapability {
                include_root: "%(install_dir)s/include/python3.11".to_string(),
                link_root: "%(install_dir)s/lib".to_string(),
                version: Some("3.11".to_string()),
            })
    }

    #[test]
    fn test_toolchain_vars_per_arch() {
        let fx = fixture();
        let recipe = Recipe::new("zlib", HeaderOnlyBuild::default());
        let builder = EnvironmentBuilder::new(&fx.ctx);

        let arm = builder.build(&recipe, &fx.ctx.architectures()[0], &BTreeSet::new());
        let x64 = builder.build(&recipe, &fx.ctx.architectures()[1], &BTreeSet::new());

        assert!(arm.get("CC").unwrap().ends_with("bin/aarch64-linux-android24-clang"));
        assert!(x64.get("CC").unwrap().ends_with("bin/x86_64-linux-android24-clang"));
        assert_eq!(arm.get("ANDROID_ABI"), Some("arm64-v8a"));
        assert_eq!(arm.get("MAKEFLAGS"), Some("-j4"));
        assert!(arm.get("CFLAGS").unwrap().contains("-march=armv8-a"));
        assert!(!arm.get("CFLAGS").unwrap().contains("-m64"));
        assert!(arm.get("PREFIX").unwrap().ends_with("other_builds/zlib/arm64-v8a/install"));
        assert_ne!(arm.artifact_dir(), x64.artifact_dir());
    }

    #[test]
    fn test_runtime_roots_only_for_dependents() {
        let fx = fixture();
        let runtime = python3();
        let builder = EnvironmentBuilder::new(&fx.ctx).with_runtime(Some(&runtime));
        let arch = &fx.ctx.architectures()[0];

        let dependent = Recipe::new("grpc", HeaderOnlyBuild::default()).with_depends(&["python3"]);
        let env = builder.build(&dependent, arch, &BTreeSet::new());
        let include = env.get("RUNTIME_INCLUDE_ROOT").unwrap();
        assert!(include.ends_with("other_builds/python3/arm64-v8a/install/include/python3.11"));
        assert_eq!(env.get("RUNTIME_VERSION"), Some("3.11"));
        assert!(env.get("CFLAGS").unwrap().contains(include));

        let unrelated = Recipe::new("zlib", HeaderOnlyBuild::default());
        let env = builder.build(&unrelated, arch, &BTreeSet::new());
        assert!(env.get("RUNTIME_INCLUDE_ROOT").is_none());
    }

    #[test]
    fn test_recipe_env_and_lib_dir_templates() {
        let fx = fixture();
        let recipe = Recipe::new("grpc", HeaderOnlyBuild::default())
            .with_env("ANDROID_NDK_HOME", "%(ndk_dir)s")
            .with_lib_dir("%(build_dir)s/lib/%(arch)s");
        let arch = &fx.ctx.architectures()[1];
        let env = EnvironmentBuilder::new(&fx.ctx).build(&recipe, arch, &BTreeSet::new());

        assert_eq!(
            env.get("ANDROID_NDK_HOME"),
            Some(fx.ctx.ndk_dir().to_str().unwrap())
        );
        assert_eq!(
            env.artifact_dir(),
            &fx.ctx.work_dirs("grpc", arch).build.join("lib/x86_64")
        );
    }

    #[test]
    fn test_opt_depends_exposed_when_available() {
        let fx = fixture();
        let recipe =
            Recipe::new("pygame", HeaderOnlyBuild::default()).with_opt_depends(&["libpng", "jpeg"]);
        let arch = &fx.ctx.architectures()[0];
        let available = BTreeSet::from(["libpng".to_string(), "sqlite3".to_string()]);
        let env = EnvironmentBuilder::new(&fx.ctx).build(&recipe, arch, &available);

        assert_eq!(env.get("CROSSBAKE_OPT_DEPENDS"), Some("libpng"));
        assert!(env.has_opt_depend("libpng"));
        assert!(!env.has_opt_depend("jpeg"));
    }

    #[test]
    fn test_path_prepends_toolchain() {
        let fx = fixture();
        let recipe = Recipe::new("zlib", HeaderOnlyBuild::default());
        let env = EnvironmentBuilder::new(&fx.ctx).build(
            &recipe,
            &fx.ctx.architectures()[0],
            &BTreeSet::new(),
        );
        let bin = fx.ctx.toolchain_bin();
        assert!(env.get("PATH").unwrap().starts_with(bin.to_str().unwrap()));
    }
}
