use std::time::Duration;

use anyhow::{Context, Result};
use human_panic::setup_panic;
use log::{debug, warn};

use crate::helpers::logging;

/// Spawned probes are killed on drop, so there is little left to wait for at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Shared entry point for binaries: panic handler, `.env` loading, logging, and a Tokio
/// runtime that `fn_run` is entered into. The logger is flushed after `fn_run` returns.
pub fn run<CliType>(
    fn_cli_parse: fn() -> CliType,
    fn_extract_logging: fn(&CliType) -> &logging::Params,
    fn_run: fn(CliType) -> Result<()>,
) -> Result<()> {
    setup_panic!();
    let env_result = dotenvy::dotenv();

    let cli = fn_cli_parse();
    let logger_handle = logging::configure_from(fn_extract_logging(&cli))?;

    // Logged only now since the logger wasn't up before
    if let Err(env_err) = env_result {
        if env_err.not_found() {
            debug!("No `.env` file found, using environment and CLI arguments only.");
        } else {
            warn!("Ignoring unreadable `.env` file: {}", env_err);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to start Tokio runtime")?;
    let guard = runtime.enter();

    let command_result = fn_run(cli);

    debug!(
        "Waiting up to {:?} for remaining tasks to finish",
        SHUTDOWN_GRACE
    );
    drop(guard);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    // Important with non-direct write mode
    // Handle needs to be kept alive until end of program
    logger_handle.flush();

    command_result
}
