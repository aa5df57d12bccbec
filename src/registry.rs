//! The live set of folders under synchronization.
//!
//! [`FolderRegistry`] is a cheaply clonable handle around a mutex-guarded
//! set. Every clone observes the same set: the filters and handlers read it
//! on each event, and only the folder membership handler (plus the startup
//! seed) writes to it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default, Debug)]
pub struct FolderRegistry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl FolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated with `ids`.
    pub fn with_folders<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        registry.seed(ids);
        registry
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the whole set (startup discovery).
    pub fn seed<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.lock();
        set.clear();
        set.extend(ids.into_iter().map(Into::into));
    }

    /// Returns `true` if the folder was not tracked before.
    pub fn add(&self, id: &str) -> bool {
        self.lock().insert(id.to_string())
    }

    /// Returns `true` if the folder was tracked.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Sorted copy of the tracked ids.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// First entry of `hierarchy` (immediate parent first) that is tracked,
    /// i.e. the closest tracked ancestor.
    pub fn first_member_of<'a>(&self, hierarchy: &'a [String]) -> Option<&'a str> {
        let set = self.lock();
        hierarchy
            .iter()
            .find(|id| set.contains(id.as_str()))
            .map(String::as_str)
    }

    pub fn intersects(&self, hierarchy: &[String]) -> bool {
        self.first_member_of(hierarchy).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
