use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// `level` comes from `LOG_LEVEL`; `RUST_LOG` overrides it when set.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "warn,stb={level},stb_core={level},stb_telegram={level},{service_name}={level}"
        ))
    });
    let filter = filter.map_err(|e| Error::Config(format!("invalid LOG_LEVEL `{level}`: {e}")))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Unexpected(format!("logging already initialized: {e}")))?;

    Ok(())
}
