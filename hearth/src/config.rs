//! Event loop configuration.
//!
//! # Configuration Precedence
//!
//! 1. **Programmatic**: [`RunnerBuilder::debug`](crate::RunnerBuilder::debug)
//!    or [`EventLoop::set_debug`](crate::EventLoop::set_debug)
//! 2. **Environment variables**: `HEARTH_*`
//! 3. **Defaults**: [`LoopConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `HEARTH_DEBUG` | `bool` | `debug` |
//! | `HEARTH_SLOW_POLL_MS` | `u64` | `slow_poll_threshold` |

use std::time::Duration;

use thiserror::Error;

/// Environment variable toggling debug mode on new loops.
pub const ENV_DEBUG: &str = "HEARTH_DEBUG";
/// Environment variable for the debug-mode slow poll threshold, in milliseconds.
pub const ENV_SLOW_POLL_MS: &str = "HEARTH_SLOW_POLL_MS";

const DEFAULT_SLOW_POLL: Duration = Duration::from_millis(100);

/// An environment variable was set to a value that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Settings an [`EventLoop`](crate::EventLoop) starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Debug mode: slow task polls are logged.
    pub debug: bool,

    /// A single task poll taking at least this long is logged in debug mode.
    pub slow_poll_threshold: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            debug: false,
            slow_poll_threshold: DEFAULT_SLOW_POLL,
        }
    }
}

impl LoopConfig {
    /// Builds a configuration from defaults plus `HEARTH_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a configuration from defaults plus overrides read through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_DEBUG) {
            config.debug = parse_bool(ENV_DEBUG, &val)?;
        }
        if let Some(val) = lookup(ENV_SLOW_POLL_MS) {
            let ms = val.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: ENV_SLOW_POLL_MS,
                value: val.clone(),
                expected: "a number of milliseconds",
            })?;
            config.slow_poll_threshold = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_owned(),
            expected: "a boolean",
        }),
    }
}
