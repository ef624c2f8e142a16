//! getlock - run commands under a MySQL named lock
//!
//! The binary wraps [`getlock_core::LockClient`] around a dedicated
//! [`mysql::MySqlSession`].

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mysql;

pub use error::{Error, Result};
