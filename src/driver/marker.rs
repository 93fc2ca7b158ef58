// src/driver/marker.rs

//! Completion markers and failure records
//!
//! A marker is written into a pair's work directory only after the build
//! procedure succeeded and every declared artifact was found. Its presence
//! alone means the pair is `done`; the contents are informational and let
//! `status` detect recipes that changed since they were built.
//!
//! A [`FailureRecord`] is written when a pair fails. While it exists the pair
//! stays `failed` across invocations; removing the pair directory (`clean`)
//! clears it.

use crate::arch::Architecture;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub recipe: String,
    pub version: Option<String>,
    pub arch: String,
    /// Recipe fingerprint at build time
    pub fingerprint: String,
    pub artifacts: Vec<PathBuf>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock build time in seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl Marker {
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Read a marker; `Ok(None)` if there is none
    pub fn read(path: &Path) -> Result<Option<Self>> {
        read_json(path, "marker")
    }

    /// Write atomically via a temporary file and rename
    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(self, path, "marker")
    }

    /// Remove a marker if present
    pub fn clear(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Persisted failure of one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub recipe: String,
    pub arch: String,
    /// Recipe fingerprint at the time of the failure
    pub fingerprint: String,
    pub step: String,
    pub status: Option<i32>,
    pub output_tail: String,
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(recipe: &str, arch: &Architecture, fingerprint: String, err: &Error) -> Self {
        let (step, status, output_tail) = match err {
            Error::BuildFailure {
                step,
                status,
                output_tail,
                ..
            } => (step.clone(), *status, output_tail.clone()),
            Error::ArtifactMissing { .. } => ("verify".to_string(), None, err.to_string()),
            Error::SourceUnavailable { .. } => ("sources".to_string(), None, err.to_string()),
            other => ("build".to_string(), None, other.to_string()),
        };
        Self {
            recipe: recipe.to_string(),
            arch: arch.name.clone(),
            fingerprint,
            step,
            status,
            output_tail,
            failed_at: Utc::now(),
        }
    }

    pub fn read(path: &Path) -> Result<Option<Self>> {
        read_json(path, "failure record")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(self, path, "failure record")
    }

    /// The recorded failure as a build error
    pub fn into_error(self) -> Error {
        Error::BuildFailure {
            recipe: self.recipe,
            arch: self.arch,
            step: self.step,
            status: self.status,
            output_tail: self.output_tail,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::ParseError(format!("Invalid {} {}: {}", what, path.display(), e)))
}

fn write_json<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::ParseError(format!("Failed to serialize {}: {}", what, e)))?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn marker() -> Marker {
        Marker {
            recipe: "grpc".to_string(),
            version: Some("v1.20.1".to_string()),
            arch: "arm64-v8a".to_string(),
            fingerprint: "abc".to_string(),
            artifacts: vec![PathBuf::from("libgrpc.a")],
            completed_at: Utc::now(),
            duration_secs: Some(12),
        }
    }

    #[test]
    fn test_write_read_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".crossbake-done.json");
        assert!(!Marker::exists(&path));
        assert_eq!(Marker::read(&path).unwrap(), None);

        let m = marker();
        m.write(&path).unwrap();
        assert!(Marker::exists(&path));
        assert_eq!(Marker::read(&path).unwrap(), Some(m));
        assert!(!dir.path().join(".crossbake-done.json.tmp").exists());

        assert!(Marker::clear(&path).unwrap());
        assert!(!Marker::clear(&path).unwrap());
    }

    #[test]
    fn test_corrupt_marker_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".crossbake-done.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Marker::read(&path), Err(Error::ParseError(_))));
        assert!(Marker::exists(&path));
    }

    #[test]
    fn test_failure_record_keeps_step_and_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".crossbake-failed.json");
        let arch = Architecture::android("x86", 21).unwrap();
        let err = Error::BuildFailure {
            recipe: "zlib".to_string(),
            arch: "x86".to_string(),
            step: "make".to_string(),
            status: Some(2),
            output_tail: "zlib.c:1: error".to_string(),
        };

        FailureRecord::new("zlib", &arch, "abc".to_string(), &err)
            .write(&path)
            .unwrap();
        let record = FailureRecord::read(&path).unwrap().unwrap();
        assert_eq!(record.step, "make");
        assert_eq!(record.status, Some(2));

        match record.into_error() {
            Error::BuildFailure {
                recipe,
                output_tail,
                ..
            } => {
                assert_eq!(recipe, "zlib");
                assert_eq!(output_tail, "zlib.c:1: error");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_failure_record_from_missing_artifact() {
        let arch = Architecture::android("x86", 21).unwrap();
        let err = Error::ArtifactMissing {
            recipe: "foo".to_string(),
            arch: "x86".to_string(),
            missing: vec!["libfoo.so".to_string()],
            dir: PathBuf::from("/tmp/out"),
        };
        let record = FailureRecord::new("foo", &arch, "abc".to_string(), &err);
        assert_eq!(record.step, "verify");
        assert!(record.output_tail.contains("libfoo.so"));
    }
}
