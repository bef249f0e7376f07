//! Camera usage probe
//!
//! Decides whether any application currently holds the camera by walking the
//! host's capability consent ledger. The ledger is a tree of keys (one per
//! capability, one per consumer, nested arbitrarily for unpackaged apps),
//! each optionally carrying a `LastUsedTimeStop` timestamp.
//!
//! ## Responsibilities
//! - Traverse the configured capability subtree and OR-combine the nodes:
//!   a stop value of 0 means that consumer is using the capability right now
//! - Treat missing keys and values as "not in use" without failing the probe
//! - Surface genuine ledger read failures to the caller so a tick can be
//!   skipped instead of reporting a wrong state

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::RegistryLedger;

/// Stop value that marks a capability as currently held
const IN_USE_SENTINEL: i64 = 0;

/// Hierarchical capability-access ledger
///
/// Paths are key segments relative to the consent-store root, starting with
/// the capability name (e.g. `["webcam", "NonPackaged", "C:#App#app.exe"]`).
pub trait ConsentLedger: Send + Sync {
    /// Read the node's `LastUsedTimeStop` value, `None` when the key or the
    /// value does not exist
    fn last_used_stop(&self, path: &[String]) -> Result<Option<i64>>;

    /// List the node's child keys, empty when the key does not exist
    fn child_keys(&self, path: &[String]) -> Result<Vec<String>>;
}

impl<L: ConsentLedger + ?Sized> ConsentLedger for Arc<L> {
    fn last_used_stop(&self, path: &[String]) -> Result<Option<i64>> {
        (**self).last_used_stop(path)
    }

    fn child_keys(&self, path: &[String]) -> Result<Vec<String>> {
        (**self).child_keys(path)
    }
}

/// Probes one capability subtree of a consent ledger
pub struct CapabilityProbe {
    ledger: Box<dyn ConsentLedger>,
    capability: String,
}

impl CapabilityProbe {
    /// Create a probe over the given ledger and capability subtree
    pub fn new(ledger: Box<dyn ConsentLedger>, capability: impl Into<String>) -> Self {
        Self {
            ledger,
            capability: capability.into(),
        }
    }

    /// Whether any consumer in the capability subtree holds the capability
    ///
    /// Visits nodes depth-first with an explicit stack and short-circuits on
    /// the first in-use hit. A read failure on any visited node aborts the
    /// whole probe; the caller decides what a failed sample means.
    pub fn is_in_use(&self) -> Result<bool> {
        let mut stack: Vec<Vec<String>> = vec![vec![self.capability.clone()]];

        while let Some(path) = stack.pop() {
            if self.ledger.last_used_stop(&path)? == Some(IN_USE_SENTINEL) {
                tracing::debug!(node = %path.join("/"), "capability currently in use");
                return Ok(true);
            }

            for child in self.ledger.child_keys(&path)? {
                let mut next = path.clone();
                next.push(child);
                stack.push(next);
            }
        }

        Ok(false)
    }
}

/// Build the consent ledger for this host
#[cfg(windows)]
pub fn platform_ledger() -> Result<Box<dyn ConsentLedger>> {
    Ok(Box::new(RegistryLedger::new()))
}

/// Build the consent ledger for this host
#[cfg(not(windows))]
pub fn platform_ledger() -> Result<Box<dyn ConsentLedger>> {
    Err(Error::Config(
        "no capability consent ledger on this platform (the daemon watches the Windows consent store)"
            .to_string(),
    ))
}

/// In-memory consent ledger for tests and simulation
///
/// Entries are keyed by full path; child keys are derived from the stored
/// paths. Individual nodes can be poisoned to return read errors.
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<Vec<String>, i64>>,
    failing: RwLock<HashSet<Vec<String>>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a node's stop value, creating intermediate nodes implicitly
    pub fn set(&self, path: &[&str], last_used_stop: i64) {
        self.entries
            .write()
            .unwrap()
            .insert(to_owned_path(path), last_used_stop);
    }

    /// Remove a node's stop value
    pub fn clear(&self, path: &[&str]) {
        self.entries.write().unwrap().remove(&to_owned_path(path));
    }

    /// Poison a node so reads of it fail
    pub fn fail_at(&self, path: &[&str]) {
        self.failing.write().unwrap().insert(to_owned_path(path));
    }
}

impl ConsentLedger for MemoryLedger {
    fn last_used_stop(&self, path: &[String]) -> Result<Option<i64>> {
        if self.failing.read().unwrap().contains(path) {
            return Err(Error::Probe(format!(
                "simulated ledger failure at {}",
                path.join("/")
            )));
        }
        Ok(self.entries.read().unwrap().get(path).copied())
    }

    fn child_keys(&self, path: &[String]) -> Result<Vec<String>> {
        if self.failing.read().unwrap().contains(path) {
            return Err(Error::Probe(format!(
                "simulated ledger failure at {}",
                path.join("/")
            )));
        }

        let entries = self.entries.read().unwrap();
        let failing = self.failing.read().unwrap();
        let children: BTreeSet<String> = entries
            .keys()
            .chain(failing.iter())
            .filter(|stored| stored.len() > path.len() && stored[..path.len()] == *path)
            .map(|stored| stored[path.len()].clone())
            .collect();

        Ok(children.into_iter().collect())
    }
}

fn to_owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}
