//! Process-wide map from connection identity to its conversation.

use crate::conversation::ConversationSession;
use dashmap::{DashMap, mapref::entry::Entry};
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Shared handle to the session of one connection.
///
/// Only the task serving that connection locks it, so the lock is never contended.
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Stable identifier assigned to a connection when it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no session registered for connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

/// Concurrent registry of open connections. Cloning shares the same map.
#[derive(Debug, Default, Clone)]
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<ConnectionId, SessionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh session for `id`.
    ///
    /// The returned guard unregisters the connection when dropped, so the
    /// entry goes away however the connection task ends.
    pub fn register(&self, id: ConnectionId) -> Result<Registration, RegistryError> {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(id)),
            Entry::Vacant(vacant) => {
                let session: SessionHandle = Arc::new(Mutex::new(ConversationSession::new()));
                vacant.insert(session.clone());
                debug!(connection_id = %id, "Connection registered");
                Ok(Registration {
                    id,
                    session,
                    registry: self.clone(),
                })
            }
        }
    }

    pub fn get(&self, id: ConnectionId) -> Result<SessionHandle, RegistryError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::UnknownConnection(id))
    }

    /// Removes the entry for `id`. Returns whether an entry was present.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "Connection unregistered");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Keeps a connection registered for as long as it is alive.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    session: SessionHandle,
    registry: ConnectionRegistry,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_get_returns_same_session() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let registration = registry.register(id).unwrap();

        let looked_up = registry.get(id).unwrap();
        assert!(Arc::ptr_eq(&looked_up, registration.session()));
        assert_eq!(registration.id(), id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let _registration = registry.register(id).unwrap();

        assert_eq!(
            registry.register(id).unwrap_err(),
            RegistryError::AlreadyRegistered(id)
        );
    }

    #[test]
    fn test_dropping_registration_unregisters() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let registration = registry.register(id).unwrap();
        assert!(registry.contains(id));

        drop(registration);

        assert!(!registry.contains(id));
        assert!(registry.is_empty());
        assert_eq!(
            registry.get(id).unwrap_err(),
            RegistryError::UnknownConnection(id)
        );
    }

    #[test]
    fn test_explicit_unregister_then_drop_is_harmless() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let registration = registry.register(id).unwrap();

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sessions_are_not_shared_between_connections() {
        let registry = ConnectionRegistry::new();
        let first = registry.register(ConnectionId::new()).unwrap();
        let second = registry.register(ConnectionId::new()).unwrap();

        first.session().try_lock().unwrap().start_live();

        assert!(first.session().try_lock().unwrap().is_active());
        assert!(!second.session().try_lock().unwrap().is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connection_lifecycles() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let registration = registry.register(ConnectionId::new()).unwrap();
                let handle = registry.get(registration.id()).unwrap();
                handle.lock().await.add_user_message("hello");
                tokio::task::yield_now().await;
                assert_eq!(handle.lock().await.messages().len(), 1);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
