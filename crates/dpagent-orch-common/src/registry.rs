//! Metadata registry.
//!
//! Maps logical names to device handles and kind-specific metadata for one
//! resource kind. A name maps to at most one handle and a handle to at most
//! one name. Every change except [`Registry::clear`] is published to the
//! registry's watchers, which is how dependent kinds learn that a resource
//! they wait on appeared or went away.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use dpagent_device::{Handle, ObjectKind, RawHandle};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Registry failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered with handle {handle}")]
    NameTaken {
        kind: &'static str,
        name: String,
        handle: RawHandle,
    },

    #[error("{kind} handle {handle} is already registered as '{name}'")]
    HandleTaken {
        kind: &'static str,
        handle: RawHandle,
        name: String,
    },
}

/// One registered resource.
pub struct RegistryEntry<K: ObjectKind, M> {
    pub name: String,
    pub handle: Handle<K>,
    /// Shared with lookups and watchers; replaced, never mutated
    pub metadata: Arc<M>,
}

impl<K: ObjectKind, M> Clone for RegistryEntry<K, M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handle: self.handle,
            metadata: Arc::clone(&self.metadata),
        }
    }
}

impl<K: ObjectKind, M: fmt::Debug> fmt::Debug for RegistryEntry<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Kind of registry change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Put,
    Delete,
}

/// Change published to watchers.
pub struct RegistryEvent<K: ObjectKind, M> {
    pub name: String,
    pub handle: Handle<K>,
    pub metadata: Arc<M>,
    pub kind: EventKind,
}

impl<K: ObjectKind, M> Clone for RegistryEvent<K, M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handle: self.handle,
            metadata: Arc::clone(&self.metadata),
            kind: self.kind,
        }
    }
}

impl<K: ObjectKind, M: fmt::Debug> fmt::Debug for RegistryEvent<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEvent")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<K: ObjectKind, M> RegistryEvent<K, M> {
    fn from_entry(entry: &RegistryEntry<K, M>, kind: EventKind) -> Self {
        Self {
            name: entry.name.clone(),
            handle: entry.handle,
            metadata: Arc::clone(&entry.metadata),
            kind,
        }
    }
}

/// Subscription returned by [`Registry::watch`].
///
/// Events arrive in the order the registry applied them. Dropping the watch
/// unsubscribes.
pub struct RegistryWatch<K: ObjectKind, M> {
    rx: mpsc::UnboundedReceiver<RegistryEvent<K, M>>,
}

impl<K: ObjectKind, M> RegistryWatch<K, M> {
    /// Next queued event, without waiting.
    pub fn try_next(&mut self) -> Option<RegistryEvent<K, M>> {
        self.rx.try_recv().ok()
    }

    /// All queued events.
    pub fn drain(&mut self) -> Vec<RegistryEvent<K, M>> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the next event. Returns `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<RegistryEvent<K, M>> {
        self.rx.recv().await
    }
}

struct RegistryInner<K: ObjectKind, M> {
    by_name: BTreeMap<String, RegistryEntry<K, M>>,
    by_handle: HashMap<RawHandle, String>,
}

/// Name to handle to metadata map for one resource kind.
pub struct Registry<K: ObjectKind, M> {
    kind: &'static str,
    inner: RwLock<RegistryInner<K, M>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<RegistryEvent<K, M>>>>,
}

impl<K: ObjectKind, M> fmt::Debug for Registry<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("entries", &self.len())
            .field("watchers", &self.watchers.lock().len())
            .finish()
    }
}

impl<K: ObjectKind, M> Registry<K, M> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: RwLock::new(RegistryInner {
                by_name: BTreeMap::new(),
                by_handle: HashMap::new(),
            }),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Resource kind this registry tracks.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Registers `name` at `handle`. Fails if either is already taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        handle: Handle<K>,
        metadata: M,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let event = {
            let mut inner = self.inner.write();
            if let Some(existing) = inner.by_name.get(&name) {
                return Err(RegistryError::NameTaken {
                    kind: self.kind,
                    name,
                    handle: existing.handle.as_raw(),
                });
            }
            if let Some(owner) = inner.by_handle.get(&handle.as_raw()) {
                return Err(RegistryError::HandleTaken {
                    kind: self.kind,
                    handle: handle.as_raw(),
                    name: owner.clone(),
                });
            }

            let entry = RegistryEntry {
                name: name.clone(),
                handle,
                metadata: Arc::new(metadata),
            };
            let event = RegistryEvent::from_entry(&entry, EventKind::Put);
            inner.by_handle.insert(handle.as_raw(), name.clone());
            inner.by_name.insert(name, entry);
            event
        };
        self.publish(event);
        Ok(())
    }

    /// Removes `name` and returns what it was registered with.
    pub fn unregister(&self, name: &str) -> Option<RegistryEntry<K, M>> {
        let entry = {
            let mut inner = self.inner.write();
            let entry = inner.by_name.remove(name)?;
            inner.by_handle.remove(&entry.handle.as_raw());
            entry
        };
        self.publish(RegistryEvent::from_entry(&entry, EventKind::Delete));
        Some(entry)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<RegistryEntry<K, M>> {
        self.inner.read().by_name.get(name).cloned()
    }

    pub fn lookup_by_handle(&self, handle: Handle<K>) -> Option<RegistryEntry<K, M>> {
        let inner = self.inner.read();
        let name = inner.by_handle.get(&handle.as_raw())?;
        inner.by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Replaces the metadata of `name`. Returns false if it is not registered.
    pub fn update_metadata(&self, name: &str, metadata: M) -> bool {
        let event = {
            let mut inner = self.inner.write();
            let Some(entry) = inner.by_name.get_mut(name) else {
                return false;
            };
            entry.metadata = Arc::new(metadata);
            RegistryEvent::from_entry(entry, EventKind::Put)
        };
        self.publish(event);
        true
    }

    /// Empties the registry without notifying watchers.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_name.clear();
        inner.by_handle.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().by_name.keys().cloned().collect()
    }

    /// All entries sorted by name.
    pub fn entries(&self) -> Vec<RegistryEntry<K, M>> {
        self.inner.read().by_name.values().cloned().collect()
    }

    /// Subscribes to future changes.
    pub fn watch(&self) -> RegistryWatch<K, M> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(tx);
        RegistryWatch { rx }
    }

    fn publish(&self, event: RegistryEvent<K, M>) {
        self.watchers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
