//! Identity → live connection handles.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use relay_core::{ConnectionId, Identity};
use tracing::debug;

use crate::websocket::connection::ClientConnection;

#[derive(Default)]
struct RegistryInner {
    /// Handles filed under each identity. Never holds an empty map.
    entries: HashMap<Identity, HashMap<ConnectionId, Weak<ClientConnection>>>,
    /// Reverse index so a handle is filed under at most one identity.
    owners: HashMap<ConnectionId, Identity>,
}

impl RegistryInner {
    fn remove(&mut self, identity: &Identity, id: &ConnectionId) -> bool {
        let Some(handles) = self.entries.get_mut(identity) else {
            return false;
        };
        if handles.remove(id).is_none() {
            return false;
        }
        if handles.is_empty() {
            let _ = self.entries.remove(identity);
        }
        let _ = self.owners.remove(id);
        true
    }
}

/// Directory of currently reachable identities.
///
/// All operations are short in-memory mutations; the lock is never held
/// across an `.await`.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// File `handle` under `identity`.
    ///
    /// Returns `false` if it was already filed there. A handle filed under a
    /// different identity is moved.
    pub fn register(&self, identity: &Identity, handle: &Arc<ClientConnection>) -> bool {
        let mut inner = self.inner.write();
        match inner.owners.get(&handle.id).cloned() {
            Some(current) if current == *identity => return false,
            Some(previous) => {
                let _ = inner.remove(&previous, &handle.id);
                debug!(conn_id = %handle.id, from = %previous, to = %identity, "handle moved");
            }
            None => {}
        }
        let _ = inner
            .entries
            .entry(identity.clone())
            .or_default()
            .insert(handle.id.clone(), Arc::downgrade(handle));
        let _ = inner.owners.insert(handle.id.clone(), identity.clone());
        true
    }

    /// Remove the handle `id` from `identity`. Returns `false` if it was not there.
    pub fn unregister(&self, identity: &Identity, id: &ConnectionId) -> bool {
        self.inner.write().remove(identity, id)
    }

    /// Snapshot of the live handles filed under `identity`.
    pub fn lookup(&self, identity: &Identity) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .entries
            .get(identity)
            .map(|handles| handles.values().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Whether any handle is filed under `identity`.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.inner.read().entries.contains_key(identity)
    }

    /// Number of identities with at least one handle.
    pub fn identity_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Number of registered handles across all identities.
    pub fn connection_count(&self) -> usize {
        self.inner.read().owners.len()
    }

    /// Identities with at least one handle, in no particular order.
    pub fn identities(&self) -> Vec<Identity> {
        self.inner.read().entries.keys().cloned().collect()
    }
}
