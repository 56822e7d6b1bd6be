use std::io::IsTerminal;

use anyhow::anyhow;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "warn";

/// Installs the fmt subscriber. `RUST_LOG` wins over `level`; a second call
/// keeps the subscriber that is already installed.
pub fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let default_level = level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LEVEL);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
