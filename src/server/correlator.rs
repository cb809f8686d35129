//! Connection correlator for the dual-adapter deployment shape.
//!
//! When client-facing and backend-facing traffic are handled by
//! independently managed adapters instead of one owned socket pair per
//! session, this map is what routes a backend reply to the client that is
//! waiting for it. Both directions of the pairing are stored so either side
//! can be looked up or torn down; the mapping is the sole mechanism
//! preventing cross-talk between unrelated connections sharing the adapter
//! layer.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ProxyError, Result};

/// Identifier for one side of a correlated connection pair.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Mappings {
    client_to_backend: HashMap<ConnectionId, ConnectionId>,
    backend_to_client: HashMap<ConnectionId, ConnectionId>,
}

/// Concurrent, symmetric client↔backend connection mapping.
///
/// Scoped to the proxy's lifetime; safe for concurrent insert/lookup/remove
/// from arbitrary session tasks.
#[derive(Debug, Default)]
pub struct ConnectionCorrelator {
    inner: RwLock<Mappings>,
}

impl ConnectionCorrelator {
    /// Empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record both directions of a new pairing.
    ///
    /// Fails if the client already has a paired backend: at most one backend
    /// connection is associated with a given client connection at a time.
    pub async fn register(&self, client: ConnectionId, backend: ConnectionId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.client_to_backend.contains_key(&client) {
            return Err(ProxyError::Connection(format!(
                "client connection {} already has a paired backend",
                client
            )));
        }
        inner
            .client_to_backend
            .insert(client.clone(), backend.clone());
        inner.backend_to_client.insert(backend, client);
        Ok(())
    }

    /// The backend paired with a client connection, if any.
    pub async fn backend_for(&self, client: &ConnectionId) -> Option<ConnectionId> {
        self.inner.read().await.client_to_backend.get(client).cloned()
    }

    /// The client paired with a backend connection, if any.
    pub async fn client_for(&self, backend: &ConnectionId) -> Option<ConnectionId> {
        self.inner.read().await.backend_to_client.get(backend).cloned()
    }

    /// Remove a pairing by its client id; returns the paired backend id.
    pub async fn unregister_client(&self, client: &ConnectionId) -> Option<ConnectionId> {
        let mut inner = self.inner.write().await;
        let backend = inner.client_to_backend.remove(client)?;
        inner.backend_to_client.remove(&backend);
        Some(backend)
    }

    /// Remove a pairing by its backend id; returns the paired client id.
    pub async fn unregister_backend(&self, backend: &ConnectionId) -> Option<ConnectionId> {
        let mut inner = self.inner.write().await;
        let client = inner.backend_to_client.remove(backend)?;
        inner.client_to_backend.remove(&client);
        Some(client)
    }

    /// Number of live pairings.
    pub async fn active_pairs(&self) -> usize {
        self.inner.read().await.client_to_backend.len()
    }
}
