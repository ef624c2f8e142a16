//! MySQL backend: one dedicated `sqlx` connection per session.
//!
//! Named locks belong to the server-side session, so a pool would hand the
//! release to a different session than the acquire. Each [`MySqlSession`]
//! owns exactly one connection for its whole life.

use std::{io, time::Duration};

use async_trait::async_trait;
use getlock_core::{BoxError, Connection, Error, LockQuery, Result, Scalar};
use sqlx::{mysql::MySqlRow, Connection as _, MySqlConnection, Row, ValueRef};

pub struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    /// Open a session, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the URL is invalid, the server refuses
    /// the connection or the timeout elapses.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let conn = tokio::time::timeout(timeout, MySqlConnection::connect(url))
            .await
            .map_err(|_| {
                Error::Transport(Box::new(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to MySQL timed out after {}s", timeout.as_secs()),
                )))
            })?
            .map_err(|e| Error::Transport(Box::new(e)))?;

        tracing::debug!("Connected to MySQL");
        Ok(Self { conn })
    }

    /// Close the session. Any named locks still held are released by the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the goodbye exchange fails.
    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::Transport(Box::new(e)))
    }
}

impl std::fmt::Debug for MySqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for MySqlSession {
    async fn query(&mut self, query: &LockQuery) -> std::result::Result<Scalar, BoxError> {
        let sql = query.to_sql();
        tracing::trace!(%sql, "Executing lock query");

        let row = sqlx::query(&sql).fetch_optional(&mut self.conn).await?;
        match row {
            Some(row) => Ok(first_column(&row)?),
            None => Ok(Scalar::Null),
        }
    }
}

/// Decode the first column: NULL, then signed, then unsigned, then text.
fn first_column(row: &MySqlRow) -> std::result::Result<Scalar, sqlx::Error> {
    if row.try_get_raw(0)?.is_null() {
        return Ok(Scalar::Null);
    }
    if let Ok(value) = row.try_get::<i64, _>(0) {
        return Ok(Scalar::Integer(value));
    }
    if let Ok(value) = row.try_get::<u64, _>(0) {
        return Ok(Scalar::Unsigned(value));
    }
    row.try_get::<String, _>(0).map(Scalar::Text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_is_a_transport_error() {
        let result = MySqlSession::connect("not a url", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_a_transport_error() {
        let result =
            MySqlSession::connect("postgres://localhost/db", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
