//! Pending-dependency cache.
//!
//! Holds configuration objects that are valid but cannot be realized yet
//! because a resource they reference is missing. Each entry waits on exactly
//! one [`Dependency`]; a reverse index finds every entry waiting on a given
//! dependency when it appears.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

/// A dependency on a named resource of some kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Dependency {
    /// Resource kind providing the dependency (e.g. `interface`)
    pub kind: String,
    /// Logical name within that kind
    pub name: String,
}

impl Dependency {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Entry in the pending cache.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry<C> {
    pub name: String,
    pub config: C,
    pub waiting_on: Dependency,
    seq: u64,
}

impl<C> PendingEntry<C> {
    /// Insertion order across the cache; later adds get larger values.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
struct PendingInner<C> {
    entries: HashMap<String, PendingEntry<C>>,
    /// Reverse index: dependency -> names waiting on it
    waiters: HashMap<Dependency, HashSet<String>>,
    next_seq: u64,
}

impl<C> PendingInner<C> {
    fn unlink(&mut self, name: &str, dependency: &Dependency) {
        if let Some(names) = self.waiters.get_mut(dependency) {
            names.remove(name);
            if names.is_empty() {
                self.waiters.remove(dependency);
            }
        }
    }
}

/// Cache of configuration objects waiting on a dependency.
///
/// A name appears at most once; adding it again replaces the payload and
/// the dependency it waits on.
#[derive(Debug)]
pub struct PendingCache<C> {
    inner: RwLock<PendingInner<C>>,
}

impl<C: Clone> PendingCache<C> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PendingInner {
                entries: HashMap::new(),
                waiters: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Adds or replaces the entry for `name`. Returns the replaced payload.
    pub fn add(&self, name: impl Into<String>, config: C, waiting_on: Dependency) -> Option<C> {
        let name = name.into();
        let mut inner = self.inner.write();

        let replaced = inner.entries.remove(&name);
        if let Some(old) = &replaced {
            inner.unlink(&name, &old.waiting_on);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .waiters
            .entry(waiting_on.clone())
            .or_default()
            .insert(name.clone());
        inner.entries.insert(
            name.clone(),
            PendingEntry {
                name,
                config,
                waiting_on,
                seq,
            },
        );

        replaced.map(|entry| entry.config)
    }

    /// Removes the entry for `name`.
    pub fn remove(&self, name: &str) -> Option<PendingEntry<C>> {
        let mut inner = self.inner.write();
        let entry = inner.entries.remove(name)?;
        inner.unlink(name, &entry.waiting_on);
        Some(entry)
    }

    /// Returns every entry waiting on `dependency`, oldest first.
    ///
    /// Entries stay in the cache; the caller removes each one only after it
    /// has been realized.
    pub fn resolve_by_dependency(&self, dependency: &Dependency) -> Vec<PendingEntry<C>> {
        let inner = self.inner.read();
        let Some(names) = inner.waiters.get(dependency) else {
            return Vec::new();
        };
        let mut entries: Vec<PendingEntry<C>> = names
            .iter()
            .filter_map(|name| inner.entries.get(name).cloned())
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// Returns the dependency `name` is waiting on.
    pub fn waiting_on(&self, name: &str) -> Option<Dependency> {
        self.inner
            .read()
            .entries
            .get(name)
            .map(|entry| entry.waiting_on.clone())
    }

    pub fn get(&self, name: &str) -> Option<PendingEntry<C>> {
        self.inner.read().entries.get(name).cloned()
    }

    /// Returns all entries, oldest first.
    pub fn snapshot(&self) -> Vec<PendingEntry<C>> {
        let mut entries: Vec<PendingEntry<C>> =
            self.inner.read().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.waiters.clear();
    }
}

impl<C: Clone> Default for PendingCache<C> {
    fn default() -> Self {
        Self::new()
    }
}
