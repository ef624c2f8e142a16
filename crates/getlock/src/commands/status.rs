//! `getlock status <KEY>`

use anyhow::Result;
use getlock_core::{Connection, Error, LockKey, LockQuery, Scalar};
use serde::Serialize;

use super::connect;
use crate::config::GetlockConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub key: String,
    pub locked: bool,
    /// Server-side connection id of the holder.
    pub holder: Option<u64>,
}

impl StatusReport {
    /// Build a report from an `IS_USED_LOCK` reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedReply`] if the reply is not NULL or a
    /// connection id.
    pub fn from_reply(key: &str, query: &LockQuery, reply: &Scalar) -> Result<Self, Error> {
        let holder = if reply.is_null() {
            None
        } else {
            let id = reply
                .as_integer()
                .and_then(|id| u64::try_from(id).ok())
                .ok_or_else(|| Error::UnexpectedReply {
                    query: query.to_string(),
                    reply: reply.to_string(),
                })?;
            Some(id)
        };
        Ok(Self {
            key: key.to_string(),
            locked: holder.is_some(),
            holder,
        })
    }

    pub fn render(&self) -> String {
        match self.holder {
            Some(id) => format!("{}: locked by connection {id}", self.key),
            None => format!("{}: free", self.key),
        }
    }
}

/// # Errors
///
/// Returns an error if the key is empty, the database cannot be reached or
/// the server reply is not understood.
pub async fn run(config: &GetlockConfig, key: &str, json: bool) -> Result<i32> {
    let query = LockQuery::IsUsedLock {
        key: LockKey::new(key)?,
    };

    let mut session = connect(config).await?;
    let reply = session.query(&query).await.map_err(Error::Transport)?;
    session.close().await?;

    let report = StatusReport::from_reply(key, &query, &reply)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(0)
}
