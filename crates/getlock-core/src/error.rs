//! Error types for getlock-core
//!
//! Boolean return values report lock outcomes (acquired, timed out, released).
//! Errors are reserved for conditions the caller has to fix or propagate:
//!
//! - **Configuration**: the server version cannot be interpreted
//! - **Conflict**: a legacy server session already holds another key
//! - **Locking**: `synchronize` could not acquire the lock
//! - **Transport**: the connection failed; the driver error is kept as source

use std::fmt;

use thiserror::Error;

/// Boxed driver error carried through [`Error::Transport`] untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which client operation ran into a same-connection conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    Lock,
    Unlock,
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
        }
    }
}

/// Core error type for lock client operations
#[derive(Debug, Error)]
pub enum Error {
    /// `VERSION()` did not yield three integers
    #[error("cannot parse server version '{version}' into major.minor.patch")]
    UnparsableVersion { version: String },

    /// A server without multi-lock support already has another key claimed on
    /// this connection
    #[error("{}", conflict_message(.operation, .held, .requested))]
    SameConnectionConflict {
        operation: LockOperation,
        held: String,
        requested: String,
    },

    /// `synchronize` did not obtain the lock; the critical section was not run
    #[error("failed to acquire lock '{key}'")]
    Locking { key: String },

    /// The underlying connection failed while executing a query
    #[error("connection error: {0}")]
    Transport(#[source] BoxError),

    /// The server answered a query with a value the client cannot use
    #[error("unexpected reply to {query}: {reply}")]
    UnexpectedReply { query: String, reply: String },

    /// The lock key was rejected at construction
    #[error("invalid lock key: {reason}")]
    InvalidKey { reason: String },
}

fn conflict_message(operation: &LockOperation, held: &str, requested: &str) -> String {
    match operation {
        LockOperation::Lock => format!(
            "get_lock() is already issued in the same connection for '{held}' (requested '{requested}')"
        ),
        LockOperation::Unlock => format!(
            "get_lock() was issued for another key '{held}', unlock it before '{requested}'"
        ),
    }
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnparsableVersion { .. } => "CONFIGURATION",
            Self::SameConnectionConflict { .. } => "SAME_CONNECTION_CONFLICT",
            Self::Locking { .. } => "LOCKING",
            Self::Transport(_) => "TRANSPORT",
            Self::UnexpectedReply { .. } => "UNEXPECTED_REPLY",
            Self::InvalidKey { .. } => "INVALID_KEY",
        }
    }

    /// Process exit code used by the command line front-end.
    ///
    /// - 1: caller error (conflicting keys, bad key)
    /// - 2: environment error (unusable server version or reply)
    /// - 3: lock not acquired
    /// - 4: transport failure
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::SameConnectionConflict { .. } | Self::InvalidKey { .. } => 1,
            Self::UnparsableVersion { .. } | Self::UnexpectedReply { .. } => 2,
            Self::Locking { .. } => 3,
            Self::Transport(_) => 4,
        }
    }

    /// Whether this error was raised before any request reached the server
    /// because of a same-connection conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::SameConnectionConflict { .. })
    }
}

/// Result type alias for getlock-core operations
pub type Result<T> = std::result::Result<T, Error>;
