//! Server version detection and the capabilities derived from it.
//!
//! Two behaviours of the named-lock functions changed across server releases:
//!
//! - From 5.7.5 a session may hold several named locks at once. Before that a
//!   second `GET_LOCK` on the same session releases the first one.
//! - From 5.5.8 a negative `GET_LOCK` timeout means "wait forever".
//!
//! The version is queried once per connection binding and cached in a
//! [`CapabilityCache`] until the connection is replaced.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    connection::Connection,
    error::{Error, Result},
    query::{LockQuery, Scalar},
};

/// First release that allows multiple simultaneous named locks per session.
pub const MULTIPLE_LOCKS_SINCE: ServerVersion = ServerVersion::new(5, 7, 5);

/// First release that treats a negative `GET_LOCK` timeout as infinite.
pub const INFINITE_TIMEOUT_SINCE: ServerVersion = ServerVersion::new(5, 5, 8);

/// `major.minor.patch` triple reported by `VERSION()`.
///
/// Ordering is lexicographic over the triple, which is the ordering the
/// capability thresholds are defined in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a server version string such as `5.7.5-log` or `10.4.12-MariaDB`.
    ///
    /// Only the leading digits of each of the first three dot-separated
    /// components are read; vendor suffixes are ignored. Anything that does not
    /// produce three integers is rejected rather than guessed.
    pub fn parse(raw: &str) -> Result<Self> {
        let unparsable = || Error::UnparsableVersion {
            version: raw.to_string(),
        };

        let mut parts = raw.trim().splitn(3, '.').map(leading_number);
        let mut next = || parts.next().flatten().ok_or_else(unparsable);

        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(Self::new(major, minor, patch))
    }

    /// Whether a session may hold more than one named lock at a time.
    #[must_use]
    pub fn supports_multiple_locks(self) -> bool {
        self >= MULTIPLE_LOCKS_SINCE
    }

    /// Whether a negative timeout is honored as an infinite wait.
    #[must_use]
    pub fn supports_infinite_timeout(self) -> bool {
        self >= INFINITE_TIMEOUT_SINCE
    }
}

fn leading_number(component: &str) -> Option<u32> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].parse().ok()
}

impl FromStr for ServerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Facts derived from the server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub version: ServerVersion,
    pub multiple_lockable: bool,
    pub infinite_timeout_capable: bool,
}

impl From<ServerVersion> for Capabilities {
    fn from(version: ServerVersion) -> Self {
        Self {
            version,
            multiple_lockable: version.supports_multiple_locks(),
            infinite_timeout_capable: version.supports_infinite_timeout(),
        }
    }
}

/// Lazily fetched fact: not asked yet, or known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Probe<T> {
    #[default]
    Unknown,
    Known(T),
}

impl<T: Copy> Probe<T> {
    /// The cached value, if it was fetched already.
    pub const fn known(&self) -> Option<T> {
        match self {
            Self::Unknown => None,
            Self::Known(value) => Some(*value),
        }
    }
}

/// Per-binding cache of the server version and both derived flags.
///
/// The three fields move together: they are filled by one `VERSION()` query
/// and cleared together by [`CapabilityCache::invalidate`].
#[derive(Debug, Clone, Default)]
pub(crate) struct CapabilityCache {
    server_version: Probe<ServerVersion>,
    multiple_lockable: Probe<bool>,
    infinite_timeout_capable: Probe<bool>,
}

impl CapabilityCache {
    /// Return cached capabilities, querying the server on first use.
    pub(crate) async fn resolve<C>(&mut self, connection: &mut C) -> Result<Capabilities>
    where
        C: Connection + ?Sized,
    {
        if let (Some(version), Some(multiple_lockable), Some(infinite_timeout_capable)) = (
            self.server_version.known(),
            self.multiple_lockable.known(),
            self.infinite_timeout_capable.known(),
        ) {
            return Ok(Capabilities {
                version,
                multiple_lockable,
                infinite_timeout_capable,
            });
        }

        let capabilities = Capabilities::from(detect_version(connection).await?);
        self.server_version = Probe::Known(capabilities.version);
        self.multiple_lockable = Probe::Known(capabilities.multiple_lockable);
        self.infinite_timeout_capable = Probe::Known(capabilities.infinite_timeout_capable);
        Ok(capabilities)
    }

    pub(crate) fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub(crate) const fn server_version(&self) -> Probe<ServerVersion> {
        self.server_version
    }
}

/// Ask the server for its version and parse it.
pub async fn detect_version<C>(connection: &mut C) -> Result<ServerVersion>
where
    C: Connection + ?Sized,
{
    let reply = connection
        .query(&LockQuery::Version)
        .await
        .map_err(Error::Transport)?;

    match reply {
        Scalar::Text(raw) => ServerVersion::parse(&raw),
        other => Err(Error::UnparsableVersion {
            version: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_plain_and_suffixed_versions() -> Result<()> {
        assert_eq!(ServerVersion::parse("5.7.5")?, ServerVersion::new(5, 7, 5));
        assert_eq!(
            ServerVersion::parse("5.7.5-log")?,
            ServerVersion::new(5, 7, 5)
        );
        assert_eq!(
            ServerVersion::parse("8.0.36-0ubuntu0.22.04.1")?,
            ServerVersion::new(8, 0, 36)
        );
        assert_eq!(
            ServerVersion::parse("10.4.12-MariaDB")?,
            ServerVersion::new(10, 4, 12)
        );
        Ok(())
    }

    #[test]
    fn rejects_versions_without_three_numbers() {
        for raw in ["", "5.7", "abc", "5.x.1", "five.seven.five", "5..5"] {
            assert!(
                matches!(
                    ServerVersion::parse(raw),
                    Err(Error::UnparsableVersion { .. })
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn capability_thresholds() -> Result<()> {
        let old: Capabilities = ServerVersion::parse("5.5.7")?.into();
        assert!(!old.multiple_lockable);
        assert!(!old.infinite_timeout_capable);

        let mid: Capabilities = ServerVersion::parse("5.6.51")?.into();
        assert!(!mid.multiple_lockable);
        assert!(mid.infinite_timeout_capable);

        let edge: Capabilities = ServerVersion::parse("5.7.5")?.into();
        assert!(edge.multiple_lockable);
        assert!(edge.infinite_timeout_capable);

        let before_edge: Capabilities = ServerVersion::parse("5.7.4")?.into();
        assert!(!before_edge.multiple_lockable);
        Ok(())
    }

    #[test]
    fn probe_starts_unknown() {
        let probe: Probe<bool> = Probe::default();
        assert_eq!(probe.known(), None);
        assert_eq!(Probe::Known(true).known(), Some(true));
    }

    proptest! {
        #[test]
        fn multiple_locks_matches_tuple_order(major in 0u32..12, minor in 0u32..12, patch in 0u32..40) {
            let version = ServerVersion::new(major, minor, patch);
            prop_assert_eq!(version.supports_multiple_locks(), (major, minor, patch) >= (5, 7, 5));
            prop_assert_eq!(version.supports_infinite_timeout(), (major, minor, patch) >= (5, 5, 8));
        }

        #[test]
        fn display_round_trips_through_parse(major in 0u32..100, minor in 0u32..100, patch in 0u32..100) {
            let version = ServerVersion::new(major, minor, patch);
            prop_assert_eq!(ServerVersion::parse(&version.to_string()).ok(), Some(version));
        }
    }
}
