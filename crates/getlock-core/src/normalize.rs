//! Lock key escaping and timeout normalization.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lock name, escaped once for embedding in a single-quoted SQL literal.
///
/// The escaped form is the only form kept; it is what every request carries
/// and what the server sees as the lock name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Escape and validate a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an empty key, which the server rejects
    /// as an incorrect user-level lock name.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidKey {
                reason: "lock key cannot be empty".to_string(),
            });
        }
        Ok(Self(escape_literal(raw)))
    }

    /// The escaped key, ready to be placed between single quotes.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape a string the way the MySQL client library escapes string literals.
pub fn escape_literal(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\x1a' => escaped.push_str("\\Z"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `GET_LOCK` timeout in seconds. Negative means wait indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockTimeout(i64);

impl LockTimeout {
    /// Conventional "wait forever" value.
    pub const INFINITE: Self = Self(-1);

    /// Finite stand-in for "forever" on servers that reject negative timeouts
    /// (2^32 - 1 seconds, roughly 136 years).
    pub const SENTINEL_SECS: i64 = 4_294_967_295;

    #[must_use]
    pub const fn seconds(secs: i64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_infinite(self) -> bool {
        self.0 < 0
    }

    /// The value to send to a server with the given infinite-timeout support.
    #[must_use]
    pub const fn normalize(self, infinite_timeout_capable: bool) -> i64 {
        if self.is_infinite() && !infinite_timeout_capable {
            Self::SENTINEL_SECS
        } else {
            self.0
        }
    }
}

impl Default for LockTimeout {
    fn default() -> Self {
        Self::INFINITE
    }
}

impl From<Duration> for LockTimeout {
    fn from(duration: Duration) -> Self {
        Self(i64::try_from(duration.as_secs()).unwrap_or(Self::SENTINEL_SECS))
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "infinite")
        } else {
            write!(f, "{}s", self.0)
        }
    }
}
