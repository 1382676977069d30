//! Registry of clients accepted by a [`ListenSocket`](super::ListenSocket).
//!
//! The registry stores lightweight [`ClientHandle`]s rather than the
//! transports themselves, which stay owned by whoever drives them. Entries
//! are only removed on request: a client that disconnects stays listed until
//! [`ClientRegistry::remove`] is called.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::transport::CloseHandle;

/// Identifier assigned to an accepted client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl From<u64> for ClientId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ClientId {
    /// Create a new [`ClientId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ClientId({})", self.0) }
}

/// Registry entry for one accepted client.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    id: ClientId,
    peer: String,
    closer: CloseHandle,
}

impl ClientHandle {
    pub(crate) fn new(id: ClientId, peer: String, closer: CloseHandle) -> Self {
        Self { id, peer, closer }
    }

    /// Registry identifier, also reported by
    /// [`Transport::client_id`](crate::Transport::client_id).
    #[must_use]
    pub fn id(&self) -> ClientId { self.id }

    /// Remote address, or the listener path for unix clients.
    #[must_use]
    pub fn peer(&self) -> &str { &self.peer }

    /// Close the client's transport from outside its task.
    pub fn close(&self) { self.closer.close(); }

    /// Whether the client's transport has been closed through a handle.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closer.is_closed() }
}

/// Concurrent map of accepted clients keyed by [`ClientId`].
///
/// Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct ClientRegistry(Arc<DashMap<ClientId, ClientHandle>>);

impl ClientRegistry {
    /// Record a newly accepted client.
    pub(crate) fn insert(&self, handle: ClientHandle) { self.0.insert(handle.id, handle); }

    /// Look up the handle for `id`.
    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<ClientHandle> {
        self.0.get(&id).map(|entry| entry.value().clone())
    }

    /// Remove the entry for `id` without closing its transport.
    pub fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.0.remove(&id).map(|(_, handle)| handle)
    }

    /// Handles of all registered clients, ordered by id.
    #[must_use]
    pub fn handles(&self) -> Vec<ClientHandle> {
        let mut handles: Vec<_> = self.0.iter().map(|entry| entry.value().clone()).collect();
        handles.sort_by_key(ClientHandle::id);
        handles
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
