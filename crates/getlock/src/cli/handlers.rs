use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::{
    commands,
    config::{load_config, GetlockConfig},
};

/// Run the selected subcommand and return the process exit code.
pub async fn dispatch(matches: &ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        Some(("run", sub)) => {
            let config = config_for(sub, sub.get_one::<i64>("timeout").copied())?;
            let command: Vec<String> = sub
                .get_many::<String>("command")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            commands::run::run(&config, required(sub, "key")?, &command).await
        }
        Some(("status", sub)) => {
            let config = config_for(sub, None)?;
            commands::status::run(&config, required(sub, "key")?, sub.get_flag("json")).await
        }
        Some(("probe", sub)) => {
            let config = config_for(sub, None)?;
            commands::probe::run(&config, sub.get_flag("json")).await
        }
        Some((name, _)) => anyhow::bail!("Unknown command: {name}"),
        None => anyhow::bail!("A subcommand is required (run, status, probe)"),
    }
}

/// Map an error to the process exit code.
///
/// Lock and configuration errors carry their own codes; anything else is 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<getlock_core::Error>()
        .map(getlock_core::Error::exit_code)
        .or_else(|| err.downcast_ref::<crate::Error>().map(crate::Error::exit_code))
        .unwrap_or(1)
}

fn config_for(sub: &ArgMatches, timeout: Option<i64>) -> Result<GetlockConfig> {
    let explicit = sub.get_one::<PathBuf>("config");
    let config = load_config(explicit.map(PathBuf::as_path)).context("Failed to load config")?;
    let config = config.apply_overrides(sub.get_one::<String>("database-url").cloned(), timeout);
    config.validate()?;
    Ok(config)
}

fn required<'a>(sub: &'a ArgMatches, name: &str) -> Result<&'a str> {
    sub.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("Missing required argument <{}>", name.to_uppercase()))
}
