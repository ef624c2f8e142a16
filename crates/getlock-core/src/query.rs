//! Requests understood by the named-lock server and the replies they produce.

use std::fmt;

use crate::normalize::LockKey;

/// One request to the server. Each renders to a single-column `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockQuery {
    /// `GET_LOCK(key, timeout)`: 1 acquired, 0 timed out, NULL on error.
    GetLock { key: LockKey, timeout: i64 },
    /// `RELEASE_LOCK(key)`: 1 released, 0 held by another session, NULL if no
    /// such lock exists.
    ReleaseLock { key: LockKey },
    /// `IS_USED_LOCK(key)`: connection id of the holder, or NULL.
    IsUsedLock { key: LockKey },
    /// `IS_FREE_LOCK(key)`: 1 free, 0 in use.
    ///
    /// Inverted relative to [`LockQuery::IsUsedLock`]; the client never sends
    /// it, it exists for backends and tooling that want the raw function.
    IsFreeLock { key: LockKey },
    /// `VERSION()`
    Version,
    /// `CONNECTION_ID()`
    ConnectionId,
}

impl LockQuery {
    /// SQL text for this request. Keys are already escaped.
    pub fn to_sql(&self) -> String {
        match self {
            Self::GetLock { key, timeout } => format!("SELECT GET_LOCK('{key}', {timeout})"),
            Self::ReleaseLock { key } => format!("SELECT RELEASE_LOCK('{key}')"),
            Self::IsUsedLock { key } => format!("SELECT IS_USED_LOCK('{key}')"),
            Self::IsFreeLock { key } => format!("SELECT IS_FREE_LOCK('{key}')"),
            Self::Version => "SELECT VERSION()".to_string(),
            Self::ConnectionId => "SELECT CONNECTION_ID()".to_string(),
        }
    }
}

impl fmt::Display for LockQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// First column of the first row of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scalar {
    /// SQL NULL, or no row at all.
    #[default]
    Null,
    Integer(i64),
    Unsigned(u64),
    Text(String),
}

impl Scalar {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer value, accepting numeric text (some drivers return every
    /// column as a string).
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Null => None,
            Self::Integer(n) => Some(i128::from(*n)),
            Self::Unsigned(n) => Some(i128::from(*n)),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Unsigned(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn renders_named_lock_functions() -> Result<()> {
        let key = LockKey::new("job-42")?;
        assert_eq!(
            LockQuery::GetLock {
                key: key.clone(),
                timeout: 5
            }
            .to_sql(),
            "SELECT GET_LOCK('job-42', 5)"
        );
        assert_eq!(
            LockQuery::ReleaseLock { key: key.clone() }.to_sql(),
            "SELECT RELEASE_LOCK('job-42')"
        );
        assert_eq!(
            LockQuery::IsUsedLock { key: key.clone() }.to_sql(),
            "SELECT IS_USED_LOCK('job-42')"
        );
        assert_eq!(
            LockQuery::IsFreeLock { key }.to_sql(),
            "SELECT IS_FREE_LOCK('job-42')"
        );
        assert_eq!(LockQuery::Version.to_sql(), "SELECT VERSION()");
        assert_eq!(LockQuery::ConnectionId.to_sql(), "SELECT CONNECTION_ID()");
        Ok(())
    }

    #[test]
    fn escaped_key_stays_inside_the_literal() -> Result<()> {
        let key = LockKey::new("x'); DROP TABLE t; --")?;
        assert_eq!(
            LockQuery::ReleaseLock { key }.to_sql(),
            "SELECT RELEASE_LOCK('x\\'); DROP TABLE t; --')"
        );
        Ok(())
    }

    #[test]
    fn scalar_integer_views() {
        assert_eq!(Scalar::Integer(1).as_integer(), Some(1));
        assert_eq!(Scalar::Unsigned(u64::MAX).as_integer(), Some(i128::from(u64::MAX)));
        assert_eq!(Scalar::Text(" 17 ".to_string()).as_integer(), Some(17));
        assert_eq!(Scalar::Text("abc".to_string()).as_integer(), None);
        assert_eq!(Scalar::Null.as_integer(), None);
        assert!(Scalar::default().is_null());
    }
}
