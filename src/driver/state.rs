// src/driver/state.rs

//! In-memory build states for `(recipe, architecture)` pairs

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lifecycle of one pair within an invocation
///
/// `pending -> building -> done | failed`. There is no transition out of
/// `failed`; retrying means clearing the pair and starting a new invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    #[default]
    Pending,
    Building,
    Done,
    Failed,
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared state table, safe to use from every architecture worker
#[derive(Debug, Default)]
pub struct StateTable {
    states: Mutex<HashMap<(String, String), BuildState>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, recipe: &str, arch: &str) -> BuildState {
        self.states
            .lock()
            .get(&(recipe.to_string(), arch.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Move a pending pair to `building`
    ///
    /// Returns the current state unchanged if the pair is not pending.
    pub fn begin(&self, recipe: &str, arch: &str) -> Result<(), BuildState> {
        let mut states = self.states.lock();
        let state = states
            .entry((recipe.to_string(), arch.to_string()))
            .or_default();
        match *state {
            BuildState::Pending => {
                *state = BuildState::Building;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Record a pair found complete on disk
    pub fn mark_done(&self, recipe: &str, arch: &str) {
        self.set(recipe, arch, BuildState::Done);
    }

    /// Record a pair whose failure is already on disk, or whose completed
    /// build could not be collected
    pub fn mark_failed(&self, recipe: &str, arch: &str) {
        self.set(recipe, arch, BuildState::Failed);
    }

    /// Finish a building pair
    pub fn finish(&self, recipe: &str, arch: &str, success: bool) {
        let state = if success {
            BuildState::Done
        } else {
            BuildState::Failed
        };
        self.set(recipe, arch, state);
    }

    fn set(&self, recipe: &str, arch: &str, state: BuildState) {
        self.states
            .lock()
            .insert((recipe.to_string(), arch.to_string()), state);
    }

    /// Sorted copy of all recorded states
    pub fn snapshot(&self) -> BTreeMap<(String, String), BuildState> {
        self.states
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
