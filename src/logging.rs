#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` wins over the configured
/// level; an invalid configured level is an error.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    EnvFilter::try_new(format!("{level},libsql=warn,ureq=warn"))
        .map_err(|err| anyhow!("invalid log level {level:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_levels_and_directives() {
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("trendboard=trace").is_ok());
        assert!(build_filter("   ").is_ok());
    }

    #[test]
    fn rejects_garbage_levels() {
        let err = build_filter("trendboard=notalevel").unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }
}
