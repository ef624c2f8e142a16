//! # getlock-core
//!
//! Cooperative mutex built on top of a database server's named locks
//! (`GET_LOCK` / `RELEASE_LOCK` / `IS_USED_LOCK`).
//!
//! A [`LockClient`] is bound to one connection and one key. It hides the
//! differences between server versions:
//!
//! - Before 5.7.5 a session holds at most one named lock; a second
//!   `GET_LOCK` silently drops the first. The [`SessionRegistry`] records
//!   which key each connection holds so the client can refuse such a request
//!   instead of corrupting the caller's view.
//! - Before 5.5.8 a negative timeout is not "wait forever"; the client sends
//!   [`LockTimeout::SENTINEL_SECS`] instead.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` / `expect()` / `panic!()` outside tests
//! - No `unsafe`
//!
//! ## Example
//!
//! ```no_run
//! use getlock_core::{memory::MemoryServer, LockClient, LockTimeout, SharedConnection};
//!
//! # async fn demo() -> getlock_core::Result<()> {
//! let server = MemoryServer::new("8.0.36");
//! let mut client = LockClient::new(SharedConnection::new(server.connect()), "job-42")?
//!     .with_timeout(LockTimeout::seconds(5));
//!
//! let answer = client.synchronize(|| async { 42 }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod connection;
mod diagnostics;
pub mod error;
pub mod memory;
pub mod normalize;
pub mod query;
pub mod registry;
pub mod version;

pub use client::LockClient;
pub use connection::{Connection, ConnectionIdentity, SharedConnection};
pub use error::{BoxError, Error, LockOperation, Result};
pub use normalize::{LockKey, LockTimeout};
pub use query::{LockQuery, Scalar};
pub use registry::SessionRegistry;
pub use version::{Capabilities, Probe, ServerVersion};
