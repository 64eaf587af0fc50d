//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` / `ENGINE_LOG` (if provided)
//! 2. `RUST_LOG` environment variable (full `EnvFilter` syntax)
//! 3. default to `info`

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Resolve the filter the subscriber will use.
pub fn build_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(level.as_filter()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Initialise the global logging subscriber.
///
/// Call once at startup; a second call is ignored.
pub fn init_logging(cli_level: Option<LogLevel>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(cli_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_drives_the_filter() {
        use crate::config::{Cli, Config};
        use clap::Parser;

        let cli = Cli::try_parse_from(["engine-server", "engine", "--log-level", "warn"]).unwrap();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(build_filter(config.log_level).to_string(), "warn");
    }

    #[test]
    fn explicit_level_wins() {
        let filter = build_filter(Some(LogLevel::Trace));
        assert_eq!(filter.to_string(), "trace");
    }
}
