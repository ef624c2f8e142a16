//! `getlock run <KEY> -- <command>...`
//!
//! Holds the named lock for the lifetime of a child process.

use anyhow::{Context, Result};
use getlock_core::{Connection, LockClient, SharedConnection};
use tokio::process::Command;

use super::connect;
use crate::config::GetlockConfig;

/// Exit code reported when the child was terminated by a signal.
const SIGNALLED: i32 = 1;

/// Run `command` while holding `key`.
///
/// Returns the child's exit code.
///
/// # Errors
///
/// Returns an error if:
/// - No command was given
/// - The database cannot be reached
/// - The lock was not acquired within the timeout (`LOCKING`, exit code 3)
/// - The child cannot be spawned
pub async fn run(config: &GetlockConfig, key: &str, command: &[String]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("No command given - pass it after --")?;

    let session = connect(config).await?;
    let mut client = LockClient::new(SharedConnection::new(session), key)?
        .with_timeout(config.timeout)
        .with_logger(tracing::info_span!("getlock", command = %program));

    run_locked(&mut client, program, args).await
}

/// Run `program` inside `client`'s critical section.
///
/// The child is killed if this future is dropped, so it never outlives the
/// lock.
///
/// # Errors
///
/// Returns an error if the lock is not acquired or the child cannot be
/// spawned.
pub async fn run_locked<C: Connection + 'static>(
    client: &mut LockClient<C>,
    program: &str,
    args: &[String],
) -> Result<i32> {
    let status = client
        .synchronize(move || async move {
            Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .status()
                .await
        })
        .await?
        .with_context(|| format!("Failed to run '{program}'"))?;

    Ok(status.code().unwrap_or(SIGNALLED))
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use getlock_core::memory::MemoryServer;
    use tempfile::TempDir;

    use super::*;

    const MODERN: &str = "8.0.36";

    fn shell(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_child_exit_code_is_returned_and_lock_released() -> Result<()> {
        let server = MemoryServer::new(MODERN);
        let mut client = LockClient::new(SharedConnection::new(server.connect()), "job")?;

        let code = run_locked(&mut client, "sh", &shell("exit 7")).await?;

        assert_eq!(code, 7);
        assert_eq!(server.holder("job"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_run_kills_child() -> Result<()> {
        let server = MemoryServer::new(MODERN);
        let temp = TempDir::new()?;
        let marker = temp.path().join("finished");
        let script = format!("sleep 1 && touch '{}'", marker.display());
        let mut client = LockClient::new(SharedConnection::new(server.connect()), "job")?;

        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            run_locked(&mut client, "sh", &shell(&script)),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
        assert_eq!(server.holder("job"), None);
        Ok(())
    }
}
