//! `getlock probe`

use anyhow::Result;
use getlock_core::{version::detect_version, Capabilities};
use serde::Serialize;

use super::connect;
use crate::config::GetlockConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub version: String,
    pub multiple_lockable: bool,
    pub infinite_timeout_capable: bool,
}

impl From<Capabilities> for ProbeReport {
    fn from(capabilities: Capabilities) -> Self {
        Self {
            version: capabilities.version.to_string(),
            multiple_lockable: capabilities.multiple_lockable,
            infinite_timeout_capable: capabilities.infinite_timeout_capable,
        }
    }
}

impl ProbeReport {
    pub fn render(&self) -> String {
        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        format!(
            "MySQL {}\n  several locks per connection: {}\n  negative timeout waits forever: {}",
            self.version,
            yes_no(self.multiple_lockable),
            yes_no(self.infinite_timeout_capable),
        )
    }
}

/// # Errors
///
/// Returns an error if the database cannot be reached or its version string
/// cannot be parsed.
pub async fn run(config: &GetlockConfig, json: bool) -> Result<i32> {
    let mut session = connect(config).await?;
    let version = detect_version(&mut session).await?;
    session.close().await?;

    let report = ProbeReport::from(Capabilities::from(version));
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(0)
}
