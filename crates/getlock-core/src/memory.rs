//! In-process named-lock server.
//!
//! Implements the `GET_LOCK` family with the same observable semantics as a
//! MySQL server of the configured version, so the lock client can be
//! exercised without a database:
//!
//! - `>= 5.7.5`: a session may hold many locks; acquiring a lock it already
//!   holds nests, and each level needs its own `RELEASE_LOCK`.
//! - `< 5.7.5`: a session holds at most one lock; `GET_LOCK` on a new name
//!   silently releases the previous one.
//! - `< 5.5.8`: a negative timeout is not "forever"; the request gives up
//!   immediately.
//!
//! Dropping a [`MemoryConnection`] ends its session and releases its locks.

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::Notify, time::Instant};

use crate::{
    connection::Connection,
    error::BoxError,
    query::{LockQuery, Scalar},
    version::ServerVersion,
};

#[derive(Debug, Clone, Copy)]
struct Holder {
    connection_id: u64,
    depth: u32,
}

#[derive(Debug, Default)]
struct State {
    locks: HashMap<String, Holder>,
    statements: Vec<(u64, String)>,
    /// Canned replies by SQL text, answered without touching `locks`.
    scripted: HashMap<String, Scalar>,
}

#[derive(Debug)]
struct Shared {
    version: String,
    multiple_locks: bool,
    infinite_timeout: bool,
    next_connection_id: AtomicU64,
    offline: AtomicBool,
    state: Mutex<State>,
    released: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to an in-process server. Clones refer to the same server.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

impl MemoryServer {
    /// Start a server reporting `version` from `VERSION()`.
    ///
    /// Capabilities follow the parsed version; an unparsable version string
    /// behaves like a current server (the client is expected to reject it).
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let parsed = ServerVersion::parse(&version).ok();
        Self {
            shared: Arc::new(Shared {
                multiple_locks: parsed.map_or(true, ServerVersion::supports_multiple_locks),
                infinite_timeout: parsed.map_or(true, ServerVersion::supports_infinite_timeout),
                version,
                next_connection_id: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                state: Mutex::new(State::default()),
                released: Notify::new(),
            }),
        }
    }

    /// Open a new session.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            shared: Arc::clone(&self.shared),
            id: self.shared.next_connection_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Connection id currently holding `name` (escaped form), if any.
    pub fn holder(&self, name: &str) -> Option<u64> {
        self.shared
            .state()
            .locks
            .get(name)
            .map(|holder| holder.connection_id)
    }

    /// SQL text of every statement a session executed, oldest first.
    pub fn executed_by(&self, connection_id: u64) -> Vec<String> {
        self.shared
            .state()
            .statements
            .iter()
            .filter(|(id, _)| *id == connection_id)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// While offline every query fails with a broken-pipe I/O error.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every later `query` with `reply` instead of evaluating it.
    pub fn script_reply(&self, query: &LockQuery, reply: Scalar) {
        self.shared.state().scripted.insert(query.to_sql(), reply);
    }

    /// Evaluate `query` normally again.
    pub fn clear_scripted_reply(&self, query: &LockQuery) {
        self.shared.state().scripted.remove(&query.to_sql());
    }
}

/// One session on a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
    id: u64,
}

impl MemoryConnection {
    /// Server-side connection id, as returned by `CONNECTION_ID()`.
    pub const fn id(&self) -> u64 {
        self.id
    }

    fn try_get_lock(&self, name: &str) -> Option<Scalar> {
        let mut state = self.shared.state();
        match state.locks.get_mut(name) {
            None => {
                if !self.shared.multiple_locks {
                    self.release_all(&mut state);
                }
                state.locks.insert(
                    name.to_string(),
                    Holder {
                        connection_id: self.id,
                        depth: 1,
                    },
                );
                Some(Scalar::Integer(1))
            }
            Some(holder) if holder.connection_id == self.id => {
                if self.shared.multiple_locks {
                    holder.depth += 1;
                }
                Some(Scalar::Integer(1))
            }
            Some(_) => None,
        }
    }

    async fn get_lock(&self, name: &str, timeout: i64) -> Scalar {
        let deadline = if timeout < 0 {
            if !self.shared.infinite_timeout {
                return self.try_get_lock(name).unwrap_or(Scalar::Integer(0));
            }
            None
        } else {
            let secs = u64::try_from(timeout).unwrap_or(u64::MAX);
            Some(Instant::now() + Duration::from_secs(secs.min(u64::from(u32::MAX))))
        };

        loop {
            let released = self.shared.released.notified();
            if let Some(reply) = self.try_get_lock(name) {
                return reply;
            }
            match deadline {
                None => released.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        return Scalar::Integer(0);
                    }
                }
            }
        }
    }

    fn release_lock(&self, name: &str) -> Scalar {
        let mut state = self.shared.state();
        let reply = match state.locks.get_mut(name) {
            None => Scalar::Null,
            Some(holder) if holder.connection_id != self.id => Scalar::Integer(0),
            Some(holder) => {
                holder.depth -= 1;
                if holder.depth == 0 {
                    state.locks.remove(name);
                    self.shared.released.notify_waiters();
                }
                Scalar::Integer(1)
            }
        };
        drop(state);
        reply
    }

    fn release_all(&self, state: &mut State) {
        let before = state.locks.len();
        state
            .locks
            .retain(|_, holder| holder.connection_id != self.id);
        if state.locks.len() != before {
            self.shared.released.notify_waiters();
        }
    }

    fn is_used_lock(&self, name: &str) -> Scalar {
        self.shared
            .state()
            .locks
            .get(name)
            .map_or(Scalar::Null, |holder| Scalar::Unsigned(holder.connection_id))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&mut self, query: &LockQuery) -> Result<Scalar, BoxError> {
        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "server has gone away",
            )));
        }
        let sql = query.to_sql();
        let scripted = {
            let mut state = self.shared.state();
            let scripted = state.scripted.get(&sql).cloned();
            state.statements.push((self.id, sql));
            scripted
        };
        if let Some(reply) = scripted {
            return Ok(reply);
        }

        let reply = match query {
            LockQuery::GetLock { key, timeout } => self.get_lock(key.as_str(), *timeout).await,
            LockQuery::ReleaseLock { key } => self.release_lock(key.as_str()),
            LockQuery::IsUsedLock { key } => self.is_used_lock(key.as_str()),
            LockQuery::IsFreeLock { key } => {
                Scalar::Integer(i64::from(self.is_used_lock(key.as_str()).is_null()))
            }
            LockQuery::Version => Scalar::Text(self.shared.version.clone()),
            LockQuery::ConnectionId => Scalar::Unsigned(self.id),
        };
        Ok(reply)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        self.release_all(&mut state);
    }
}
