use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Initialize logging to the terminal. `verbosity` is the number of `-v`
/// flags minus the number of `-q` flags; `RUST_LOG` overrides it.
pub fn init(verbosity: i8) -> Result<()> {
    let level = match verbosity {
        i8::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
