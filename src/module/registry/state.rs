//! Module state registry
//!
//! Single authoritative map from module name to lifecycle state plus failure
//! detail. Every component reads and writes through one shared handle, so
//! "is this module loaded" always reflects the latest attempt.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::module::traits::{ModuleError, ModuleState};

/// State of one module with the error that put it there, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: ModuleState,
    pub detail: Option<ModuleError>,
    /// Non-fatal notes, e.g. security checks bypassed by force
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Fingerprint of the file a security rejection was decided on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_fingerprint: Option<String>,
}

impl StateEntry {
    fn unloaded() -> Self {
        Self {
            state: ModuleState::Unloaded,
            detail: None,
            warnings: Vec::new(),
            rejected_fingerprint: None,
        }
    }
}

/// Shared module state registry
#[derive(Debug, Default)]
pub struct StateRegistry {
    entries: RwLock<HashMap<String, StateEntry>>,
}

impl StateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a module (`Unloaded` if never seen)
    pub async fn state(&self, name: &str) -> ModuleState {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .map(|e| e.state)
            .unwrap_or(ModuleState::Unloaded)
    }

    /// Full entry for a module
    pub async fn entry(&self, name: &str) -> StateEntry {
        let entries = self.entries.read().await;
        entries.get(name).cloned().unwrap_or_else(StateEntry::unloaded)
    }

    /// Failure detail recorded for a module
    pub async fn failure(&self, name: &str) -> Option<ModuleError> {
        let entries = self.entries.read().await;
        entries.get(name).and_then(|e| e.detail.clone())
    }

    /// Whether a module is loaded
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.state(name).await == ModuleState::Loaded
    }

    /// Make sure every name has an entry, leaving existing entries untouched
    pub async fn register<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = self.entries.write().await;
        for name in names {
            entries.entry(name.into()).or_insert_with(StateEntry::unloaded);
        }
    }

    /// Reset the given modules to `Unloaded` for a fresh batch run
    pub async fn reset<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = self.entries.write().await;
        for name in names {
            entries.insert(name.into(), StateEntry::unloaded());
        }
    }

    /// Atomically move a module into `Loading`
    ///
    /// Fails with `CyclicDependency` when the module is already `Loading`;
    /// that re-entry is how dependency cycles show up during recursive
    /// resolution. `chain` is the resolution path that led here.
    pub async fn begin_loading(&self, name: &str, chain: &[String]) -> Result<(), ModuleError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(StateEntry::unloaded);

        if entry.state == ModuleState::Loading {
            let mut cycle: Vec<String> = match chain.iter().position(|n| n == name) {
                Some(start) => chain[start..].to_vec(),
                None => chain.to_vec(),
            };
            cycle.push(name.to_string());
            return Err(ModuleError::CyclicDependency(cycle));
        }

        debug!("Module {} -> loading", name);
        *entry = StateEntry {
            state: ModuleState::Loading,
            ..StateEntry::unloaded()
        };
        Ok(())
    }

    /// Mark a module loaded, keeping any warnings recorded on the way
    pub async fn mark_loaded(&self, name: &str, warnings: Vec<String>) {
        self.set(name, ModuleState::Loaded, None, warnings).await;
    }

    /// Mark a module failed with the given reason
    pub async fn mark_failed(&self, name: &str, reason: ModuleError) {
        self.set(name, ModuleState::Failed, Some(reason), Vec::new()).await;
    }

    /// Mark a module rejected by the security gate
    ///
    /// `fingerprint` identifies the file state that was rejected, so a later
    /// attempt can tell whether the file was fixed since.
    pub async fn mark_rejected(&self, name: &str, reason: ModuleError, fingerprint: String) {
        let mut entries = self.entries.write().await;
        debug!("Module {} -> rejected ({})", name, reason);
        entries.insert(
            name.to_string(),
            StateEntry {
                state: ModuleState::Rejected,
                detail: Some(reason),
                rejected_fingerprint: Some(fingerprint),
                ..StateEntry::unloaded()
            },
        );
    }

    /// Fingerprint recorded with a module's rejection, if it is rejected
    pub async fn rejected_fingerprint(&self, name: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .filter(|e| e.state == ModuleState::Rejected)
            .and_then(|e| e.rejected_fingerprint.clone())
    }

    /// Mark a module skipped, unless it already reached a terminal state
    ///
    /// Returns `true` if the entry changed.
    pub async fn mark_skipped(&self, name: &str, reason: ModuleError) -> bool {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(StateEntry::unloaded);
        if entry.state != ModuleState::Unloaded {
            return false;
        }
        debug!("Module {} -> skipped ({})", name, reason);
        *entry = StateEntry {
            state: ModuleState::Skipped,
            detail: Some(reason),
            ..StateEntry::unloaded()
        };
        true
    }

    /// Drop a module back to `Unloaded`
    pub async fn unload(&self, name: &str) {
        self.set(name, ModuleState::Unloaded, None, Vec::new()).await;
    }

    /// Drop entries for modules that are no longer in the catalog
    ///
    /// Modules currently `Loading` are kept. Returns the dropped names.
    pub async fn retain<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let live: HashSet<&str> = names.into_iter().collect();
        let mut entries = self.entries.write().await;
        let gone: Vec<String> = entries
            .iter()
            .filter(|(name, entry)| {
                !live.contains(name.as_str()) && entry.state != ModuleState::Loading
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &gone {
            debug!("Module {} no longer in catalog, dropping state", name);
            entries.remove(name);
        }
        gone
    }

    /// Copy of every entry, ordered by name
    pub async fn snapshot(&self) -> BTreeMap<String, StateEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    async fn set(
        &self,
        name: &str,
        state: ModuleState,
        detail: Option<ModuleError>,
        warnings: Vec<String>,
    ) {
        let mut entries = self.entries.write().await;
        debug!("Module {} -> {}", name, state);
        entries.insert(
            name.to_string(),
            StateEntry {
                state,
                detail,
                warnings,
                rejected_fingerprint: None,
            },
        );
    }
}
