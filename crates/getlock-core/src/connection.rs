//! Connection seam between the lock client and a database driver.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    error::BoxError,
    query::{LockQuery, Scalar},
    registry::SessionRegistry,
};

/// A single physical database session able to answer [`LockQuery`] requests.
///
/// Implementations return the first column of the first row of the reply
/// ([`Scalar::Null`] when the server returned no row). Driver errors are
/// returned as-is; the client wraps them without retrying.
#[async_trait]
pub trait Connection: Send {
    async fn query(&mut self, query: &LockQuery) -> Result<Scalar, BoxError>;
}

#[async_trait]
impl<C> Connection for Box<C>
where
    C: Connection + ?Sized,
{
    async fn query(&mut self, query: &LockQuery) -> Result<Scalar, BoxError> {
        (**self).query(query).await
    }
}

/// Process-local identity of a shared connection.
///
/// Allocated from a counter when the [`SharedConnection`] is created and
/// never reused within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionIdentity(u64);

impl ConnectionIdentity {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Shared<C> {
    identity: ConnectionIdentity,
    /// Registries holding a claim for this connection.
    claims: StdMutex<Vec<SessionRegistry>>,
    connection: Mutex<C>,
}

impl<C> Drop for Shared<C> {
    fn drop(&mut self) {
        let claims = self.claims.get_mut().unwrap_or_else(PoisonError::into_inner);
        for registry in claims.drain(..) {
            registry.delete(self.identity);
        }
    }
}

/// Handle to a connection that several lock clients may share.
///
/// The mutex enforces one in-flight request per physical session. When the
/// last handle is dropped, every registry claim made for the connection is
/// removed.
pub struct SharedConnection<C> {
    inner: Arc<Shared<C>>,
}

impl<C> SharedConnection<C> {
    pub fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(Shared {
                identity: ConnectionIdentity::next(),
                claims: StdMutex::new(Vec::new()),
                connection: Mutex::new(connection),
            }),
        }
    }

    pub fn identity(&self) -> ConnectionIdentity {
        self.inner.identity
    }

    /// Wait for exclusive use of the connection.
    pub async fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.connection.lock().await
    }

    /// Whether both handles refer to the same physical connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Record a claim for this connection in `registry` and remember to
    /// remove it when the connection goes away.
    pub(crate) fn claim(&self, registry: &SessionRegistry, key: &str) {
        registry.set(self.identity(), key);
        let mut claims = self
            .inner
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claims.iter().any(|known| known.same_registry(registry)) {
            claims.push(registry.clone());
        }
    }
}

impl<C> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> From<C> for SharedConnection<C> {
    fn from(connection: C) -> Self {
        Self::new(connection)
    }
}

impl<C> fmt::Debug for SharedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}
