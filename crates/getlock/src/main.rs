//! getlock CLI
//!
//! Binary name: `getlock`

use std::process;

use getlock::cli::{
    build_cli,
    handlers::{dispatch, exit_code},
};

/// Conventional exit code after SIGINT.
const INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    // Dropping the command closes its MySQL session; the server then frees
    // any lock the session held.
    let result = tokio::select! {
        result = dispatch(&matches) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down...");
            Ok(INTERRUPTED)
        }
    };

    match result {
        Ok(code) => {
            #[allow(clippy::exit)]
            process::exit(code);
        }
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {err:#}");
            }
            #[allow(clippy::exit)]
            process::exit(exit_code(&err));
        }
    }
}
