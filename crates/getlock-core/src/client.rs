//! The lock client state machine.
//!
//! A [`LockClient`] is bound to one shared connection and one key. Its state
//! is not stored: it is Unlocked, Held(key), or, on a server without
//! multi-lock support, HeldElsewhere(other key) when the session registry
//! shows another key claimed on the same connection.
//!
//! # Request flow
//!
//! Every operation takes the shared connection first and keeps it until the
//! reply is interpreted. The registry check, the request and the registry
//! update therefore happen as one step with respect to other clients on the
//! same connection.

use std::{future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use tracing::Span;

use crate::{
    connection::{Connection, ConnectionIdentity, SharedConnection},
    diagnostics::Diagnostics,
    error::{Error, LockOperation, Result},
    normalize::{LockKey, LockTimeout},
    query::{LockQuery, Scalar},
    registry::SessionRegistry,
    version::{CapabilityCache, Capabilities, ServerVersion},
};

/// Cooperative mutex over a server-side named lock.
///
/// # Example
///
/// ```no_run
/// use getlock_core::{memory::MemoryServer, LockClient, LockTimeout, SharedConnection};
///
/// # async fn demo() -> getlock_core::Result<()> {
/// let server = MemoryServer::new("5.6.51");
/// let connection = SharedConnection::new(server.connect());
///
/// let mut report = LockClient::new(connection.clone(), "report")?;
/// let mut import = LockClient::new(connection, "import")?
///     .with_timeout(LockTimeout::seconds(5));
///
/// assert!(report.lock().await?);
/// // Pre-5.7.5 sessions hold a single lock: refused without contacting the server.
/// assert!(import.lock().await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct LockClient<C> {
    connection: SharedConnection<C>,
    key: LockKey,
    timeout: LockTimeout,
    registry: SessionRegistry,
    diagnostics: Diagnostics,
    capabilities: CapabilityCache,
}

impl<C> LockClient<C> {
    /// Bind a client to `connection` and `key` with an infinite timeout and the
    /// process-wide session registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key is empty.
    pub fn new(connection: SharedConnection<C>, key: &str) -> Result<Self> {
        Ok(Self {
            connection,
            key: LockKey::new(key)?,
            timeout: LockTimeout::default(),
            registry: SessionRegistry::global(),
            diagnostics: Diagnostics::default(),
            capabilities: CapabilityCache::default(),
        })
    }

    /// Set the `GET_LOCK` timeout. Negative waits indefinitely.
    pub fn with_timeout(mut self, timeout: impl Into<LockTimeout>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Record diagnostic events inside `span`.
    pub fn with_logger(mut self, span: Span) -> Self {
        self.diagnostics = Diagnostics::new(Some(span));
        self
    }

    /// Use `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Rebind to another connection, for example after a reconnect.
    ///
    /// Cached server facts belong to the old connection and are discarded.
    pub fn set_connection(&mut self, connection: SharedConnection<C>) {
        self.connection = connection;
        self.capabilities.invalidate();
    }

    pub const fn connection(&self) -> &SharedConnection<C> {
        &self.connection
    }

    /// The escaped key.
    pub const fn key(&self) -> &LockKey {
        &self.key
    }

    pub const fn timeout(&self) -> LockTimeout {
        self.timeout
    }

    /// Server version, if it was fetched for the current connection.
    pub fn server_version(&self) -> Option<ServerVersion> {
        self.capabilities.server_version().known()
    }

    fn identity(&self) -> ConnectionIdentity {
        self.connection.identity()
    }

    fn check_conflict(&self, capabilities: Capabilities, operation: LockOperation) -> Result<()> {
        if capabilities.multiple_lockable {
            return Ok(());
        }
        match self.registry.get(self.identity()) {
            Some(held) if held != self.key.as_str() => Err(Error::SameConnectionConflict {
                operation,
                held,
                requested: self.key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn forget_session_key(&self, capabilities: Capabilities) {
        if !capabilities.multiple_lockable {
            self.registry.delete(self.identity());
        }
    }
}

async fn execute<C>(connection: &mut C, query: &LockQuery) -> Result<Scalar>
where
    C: Connection + ?Sized,
{
    connection.query(query).await.map_err(Error::Transport)
}

impl<C: Connection> LockClient<C> {
    /// Version and derived capabilities of the bound server, fetched once per
    /// connection binding.
    pub async fn capabilities(&mut self) -> Result<Capabilities> {
        let mut connection = self.connection.lock().await;
        self.capabilities.resolve(&mut *connection).await
    }

    /// Try to acquire the lock, waiting up to the configured timeout.
    ///
    /// Returns `true` when acquired, `false` when the timeout elapsed or the
    /// server gave no usable answer.
    ///
    /// # Errors
    ///
    /// - [`Error::SameConnectionConflict`] if the server allows one lock per
    ///   session and another key is claimed on this connection. Nothing is
    ///   sent to the server in that case.
    /// - [`Error::UnparsableVersion`] if the server version cannot be read.
    /// - [`Error::Transport`] if the connection fails.
    pub async fn lock(&mut self) -> Result<bool> {
        let mut connection = self.connection.lock().await;
        let capabilities = self.capabilities.resolve(&mut *connection).await?;
        self.check_conflict(capabilities, LockOperation::Lock)?;

        let timeout = self.timeout.normalize(capabilities.infinite_timeout_capable);
        self.diagnostics.waiting(&self.key, timeout);

        let query = LockQuery::GetLock {
            key: self.key.clone(),
            timeout,
        };
        let reply = execute(&mut *connection, &query).await?;

        match reply.as_integer() {
            Some(1) => {
                self.diagnostics.acquired(&self.key);
                if !capabilities.multiple_lockable {
                    self.connection.claim(&self.registry, self.key.as_str());
                }
                Ok(true)
            }
            Some(0) => {
                self.diagnostics.acquire_timed_out(&self.key);
                self.forget_session_key(capabilities);
                Ok(false)
            }
            _ => {
                self.diagnostics.acquire_unknown(&self.key, &reply);
                self.forget_session_key(capabilities);
                Ok(false)
            }
        }
    }

    /// Release the lock.
    ///
    /// Returns `true` when released by this call or when no such lock existed,
    /// `false` when another connection holds it.
    ///
    /// # Errors
    ///
    /// - [`Error::SameConnectionConflict`] if the server allows one lock per
    ///   session and a different key is claimed on this connection.
    /// - [`Error::Transport`] if the connection fails. The registry entry is
    ///   cleared before the error is returned.
    pub async fn unlock(&mut self) -> Result<bool> {
        let mut connection = self.connection.lock().await;
        let capabilities = self.capabilities.resolve(&mut *connection).await?;
        self.check_conflict(capabilities, LockOperation::Unlock)?;

        let query = LockQuery::ReleaseLock {
            key: self.key.clone(),
        };
        let reply = execute(&mut *connection, &query).await;
        self.forget_session_key(capabilities);

        match reply?.as_integer() {
            Some(1) => {
                self.diagnostics.released(&self.key);
                Ok(true)
            }
            Some(0) => {
                self.diagnostics.release_foreign(&self.key);
                Ok(false)
            }
            _ => {
                self.diagnostics.release_missing(&self.key);
                Ok(true)
            }
        }
    }

    /// Whether any connection holds the lock right now.
    pub async fn locked(&mut self) -> Result<bool> {
        let mut connection = self.connection.lock().await;
        let query = LockQuery::IsUsedLock {
            key: self.key.clone(),
        };
        Ok(!execute(&mut *connection, &query).await?.is_null())
    }

    /// Whether this connection holds the lock.
    ///
    /// `None` when nobody holds it, `Some(false)` when another connection does.
    /// Ownership is compared by server-side connection id, so every client
    /// sharing this connection sees the same answer.
    pub async fn self_locked(&mut self) -> Result<Option<bool>> {
        let mut connection = self.connection.lock().await;
        let query = LockQuery::IsUsedLock {
            key: self.key.clone(),
        };
        let holder = execute(&mut *connection, &query).await?;
        if holder.is_null() {
            return Ok(None);
        }

        let own = execute(&mut *connection, &LockQuery::ConnectionId).await?;
        let unexpected = |query: &LockQuery, reply: &Scalar| Error::UnexpectedReply {
            query: query.to_string(),
            reply: reply.to_string(),
        };
        let holder_id = holder
            .as_integer()
            .ok_or_else(|| unexpected(&query, &holder))?;
        let own_id = own
            .as_integer()
            .ok_or_else(|| unexpected(&LockQuery::ConnectionId, &own))?;
        Ok(Some(holder_id == own_id))
    }
}

impl<C> Clone for LockClient<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            key: self.key.clone(),
            timeout: self.timeout,
            registry: self.registry.clone(),
            diagnostics: self.diagnostics.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<C> std::fmt::Debug for LockClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockClient")
            .field("connection", &self.connection)
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .field("server_version", &self.server_version())
            .finish_non_exhaustive()
    }
}

impl<C: Connection + 'static> LockClient<C> {
    /// Run `critical_section` while holding the lock.
    ///
    /// The lock is released however the section ends:
    ///
    /// - on completion, before the value is returned;
    /// - on panic, before the panic is resumed;
    /// - on cancellation (the returned future is dropped), by a release task
    ///   spawned on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Locking`] if the lock was not acquired. The section does not
    ///   run.
    /// - Any error from [`LockClient::lock`] or [`LockClient::unlock`].
    pub async fn synchronize<F, Fut, T>(&mut self, critical_section: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.lock().await? {
            return Err(Error::Locking {
                key: self.key.to_string(),
            });
        }

        let mut guard = ReleaseOnDrop::arm(self.clone());
        let outcome = AssertUnwindSafe(async move { critical_section().await })
            .catch_unwind()
            .await;
        guard.disarm();

        let released = self.unlock().await;
        match outcome {
            Ok(value) => {
                released?;
                Ok(value)
            }
            Err(panic) => {
                if let Err(error) = released {
                    self.diagnostics.release_failed(&self.key, &error);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Releases the lock from a background task if `synchronize` is dropped while
/// the critical section is still running.
struct ReleaseOnDrop<C: Connection + 'static> {
    client: Option<LockClient<C>>,
}

impl<C: Connection + 'static> ReleaseOnDrop<C> {
    const fn arm(client: LockClient<C>) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn disarm(&mut self) {
        self.client = None;
    }
}

impl<C: Connection + 'static> Drop for ReleaseOnDrop<C> {
    fn drop(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        client.diagnostics.deferred_release(&client.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = client.unlock().await {
                        client.diagnostics.release_failed(&client.key, &error);
                    }
                });
            }
            Err(error) => client.diagnostics.release_failed(&client.key, &error),
        }
    }
}
