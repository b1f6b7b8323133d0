pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

use anyhow::Result;
use tracing::warn;

/// Parse the command line, install telemetry and run the collector.
///
/// # Errors
///
/// Returns an error if telemetry cannot be installed, the arguments are
/// invalid, or the collector fails.
pub async fn start() -> Result<()> {
    let matches = commands::new().get_matches();

    let verbosity = matches.get_count("verbose");
    let provider = telemetry::init(telemetry::verbosity_level(verbosity))?;

    let result = match dispatch::handler(&matches) {
        Ok(action) => actions::run::handle(action).await,
        Err(e) => Err(e),
    };

    if let Some(provider) = provider
        && let Err(e) = provider.shutdown()
    {
        warn!(error = %e, "failed to flush traces");
    }

    result
}
