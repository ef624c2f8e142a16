//! Which key each connection currently holds, for servers that only allow one
//! named lock per session.
//!
//! The registry is bookkeeping, not the source of truth: the server decides
//! who holds a lock. The registry only decides whether a request may be sent
//! at all on a legacy server.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use crate::connection::ConnectionIdentity;

/// Mutex-guarded map from connection identity to the held key.
///
/// Clones share the same map. [`SessionRegistry::global`] returns the
/// process-wide instance used when a client is not given its own.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<ConnectionIdentity, String>>>,
}

impl SessionRegistry {
    /// Create an isolated registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lazily created process-wide registry.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new).clone()
    }

    // Poison is ignored: every operation is a single map call.
    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionIdentity, String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, connection: ConnectionIdentity) -> Option<String> {
        self.sessions().get(&connection).cloned()
    }

    pub fn set(&self, connection: ConnectionIdentity, key: impl Into<String>) {
        self.sessions().insert(connection, key.into());
    }

    pub fn delete(&self, connection: ConnectionIdentity) {
        self.sessions().remove(&connection);
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    pub(crate) fn same_registry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sessions, &other.sessions)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::connection::SharedConnection;

    #[test]
    fn set_get_delete() {
        let registry = SessionRegistry::new();
        let handle = SharedConnection::new(());
        let conn = handle.identity();

        assert_eq!(registry.get(conn), None);
        registry.set(conn, "a");
        assert_eq!(registry.get(conn).as_deref(), Some("a"));

        registry.set(conn, "b");
        assert_eq!(registry.get(conn).as_deref(), Some("b"));
        assert_eq!(registry.len(), 1);

        registry.delete(conn);
        assert!(registry.is_empty());
    }

    #[test]
    fn delete_missing_entry_is_noop() {
        let registry = SessionRegistry::new();
        registry.delete(SharedConnection::new(()).identity());
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_state_but_new_registries_do_not() {
        let registry = SessionRegistry::new();
        let clone = registry.clone();
        let other = SessionRegistry::new();
        let handle = SharedConnection::new(());
        let conn = handle.identity();

        clone.set(conn, "shared");
        assert_eq!(registry.get(conn).as_deref(), Some("shared"));
        assert_eq!(other.get(conn), None);
    }

    #[test]
    fn global_is_one_instance() {
        let conn = SharedConnection::new(());
        SessionRegistry::global().set(conn.identity(), "global-key");
        assert_eq!(
            SessionRegistry::global().get(conn.identity()).as_deref(),
            Some("global-key")
        );
        SessionRegistry::global().delete(conn.identity());
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let registry = SessionRegistry::new();
        let connections: Vec<_> = (0..16)
            .map(|_| SharedConnection::new(()))
            .collect();

        thread::scope(|scope| {
            for (i, conn) in connections.iter().enumerate() {
                let registry = registry.clone();
                let id = conn.identity();
                scope.spawn(move || {
                    for round in 0..100 {
                        registry.set(id, format!("key-{i}-{round}"));
                    }
                });
            }
        });

        assert_eq!(registry.len(), connections.len());
        for (i, conn) in connections.iter().enumerate() {
            assert_eq!(
                registry.get(conn.identity()),
                Some(format!("key-{i}-99"))
            );
        }
    }
}
