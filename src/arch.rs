// src/arch.rs

//! Target architecture descriptors
//!
//! An `Architecture` is one Android ABI as seen by the NDK's LLVM toolchain.
//! Descriptors are immutable for the duration of an invocation; the build
//! order of architectures follows the order they were added to the context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ABI names with a built-in descriptor, in default build order
pub const KNOWN_ABIS: &[&str] = &["armeabi-v7a", "arm64-v8a", "x86", "x86_64"];

/// Default Android API level when none is configured
pub const DEFAULT_API_LEVEL: u32 = 21;

/// One target ABI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// ABI identifier, also used as the per-arch directory name
    pub name: String,
    /// GNU triple used by binutils-style tool names and `--host`
    pub toolchain_prefix: String,
    /// Prefix of the NDK clang wrapper (`<clang_target><api>-clang`)
    pub clang_target: String,
    /// CPU family as understood by cmake/meson (`arm`, `aarch64`, ...)
    pub cpu_family: String,
    /// Minimum Android API level targeted
    pub api_level: u32,
    /// Architecture-specific compiler flags
    pub compiler_flags: Vec<String>,
}

impl Architecture {
    pub fn new(
        name: impl Into<String>,
        toolchain_prefix: impl Into<String>,
        clang_target: impl Into<String>,
        cpu_family: impl Into<String>,
        api_level: u32,
        compiler_flags: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            toolchain_prefix: toolchain_prefix.into(),
            clang_target: clang_target.into(),
            cpu_family: cpu_family.into(),
            api_level,
            compiler_flags: compiler_flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Built-in descriptor for an Android ABI
    ///
    /// Accepts the canonical ABI name or a common alias (`arm64`, `armv7`, ...).
    pub fn android(abi: &str, api_level: u32) -> Option<Self> {
        let arch = match abi.to_lowercase().as_str() {
            "armeabi-v7a" | "armv7" | "armv7a" | "arm" => Self::new(
                "armeabi-v7a",
                "arm-linux-androideabi",
                "armv7a-linux-androideabi",
                "arm",
                api_level,
                &["-march=armv7-a", "-mfloat-abi=softfp", "-mfpu=vfp", "-mthumb", "-fPIC"],
            ),
            "arm64-v8a" | "arm64" | "aarch64" => Self::new(
                "arm64-v8a",
                "aarch64-linux-android",
                "aarch64-linux-android",
                "aarch64",
                api_level,
                &["-march=armv8-a", "-fPIC"],
            ),
            "x86" | "i686" => Self::new(
                "x86",
                "i686-linux-android",
                "i686-linux-android",
                "x86",
                api_level,
                &["-march=i686", "-mtune=intel", "-mssse3", "-mfpmath=sse", "-m32", "-fPIC"],
            ),
            "x86_64" | "amd64" | "x64" => Self::new(
                "x86_64",
                "x86_64-linux-android",
                "x86_64-linux-android",
                "x86_64",
                api_level,
                &["-march=x86-64", "-msse4.2", "-mpopcnt", "-m64", "-mtune=intel", "-fPIC"],
            ),
            _ => return None,
        };
        Some(arch)
    }

    /// Clang target including the API level, e.g. `aarch64-linux-android21`
    pub fn compiler_target(&self) -> String {
        format!("{}{}", self.clang_target, self.api_level)
    }

    /// Compiler flags as a single space-separated string
    pub fn cflags(&self) -> String {
        self.compiler_flags.join(" ")
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_abis_resolve() {
        for abi in KNOWN_ABIS {
            let arch = Architecture::android(abi, DEFAULT_API_LEVEL).unwrap();
            assert_eq!(arch.name, *abi);
            assert!(!arch.compiler_flags.is_empty());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Architecture::android("arm64", 24).unwrap().name, "arm64-v8a");
        assert_eq!(Architecture::android("ARMV7", 24).unwrap().name, "armeabi-v7a");
        assert!(Architecture::android("mips", 24).is_none());
    }

    #[test]
    fn test_compiler_target() {
        let arch = Architecture::android("armeabi-v7a", 21).unwrap();
        assert_eq!(arch.compiler_target(), "armv7a-linux-androideabi21");
        assert_eq!(arch.toolchain_prefix, "arm-linux-androideabi");
        assert_eq!(arch.to_string(), "armeabi-v7a");
    }
}
