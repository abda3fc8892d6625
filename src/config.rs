//! Timing and response-reading settings for a pump session.
//!
//! Defaults are the values the pump firmware has always been driven with;
//! a TOML file can override any subset of them.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::recipe::FieldMatching;

/// Baud rate of the pump's serial interface. Not configurable.
pub const BAUD_RATE: u32 = 19_200;

/// Per-read timeout on the serial port.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PumpConfig {
    pub timing: TimingConfig,
    pub response: ResponseConfig,
    pub recipe: RecipeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Wait after opening the port, while the pump finishes its own boot.
    pub settle_secs: f64,
    /// Wait after `*RESET`, which re-initialises the pump.
    pub reset_delay_secs: f64,
    /// Wait after every other command before reading the reply.
    pub command_delay_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_secs: 1.0,
            reset_delay_secs: 1.0,
            command_delay_secs: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Quiet,
    Deadline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseConfig {
    pub mode: ResponseMode,
    /// Upper bound on reading one response in deadline mode.
    pub timeout_secs: f64,
    /// Silence after the first byte that ends a response in deadline mode.
    pub timeout_delay_secs: f64,
    /// Byte that ends a response in deadline mode.
    pub terminator: Option<u8>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            mode: ResponseMode::Quiet,
            timeout_secs: 8.0,
            timeout_delay_secs: 2.0,
            terminator: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeConfig {
    pub field_matching: FieldMatching,
}

/// How a response is read once the post-command delay has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// Take the bytes already buffered and stop at the first empty poll.
    Quiet,
    /// Keep polling until the terminator arrives, the line has been quiet
    /// for `quiet_period` after the first byte, or `timeout` has elapsed.
    Deadline {
        timeout: Duration,
        quiet_period: Duration,
        terminator: Option<u8>,
    },
}

/// [`TimingConfig`] with its durations checked and converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub settle: Duration,
    pub reset_delay: Duration,
    pub command_delay: Duration,
}

impl Timing {
    /// No waiting at all; for simulated channels.
    pub const ZERO: Timing = Timing {
        settle: Duration::ZERO,
        reset_delay: Duration::ZERO,
        command_delay: Duration::ZERO,
    };
}

impl PumpConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded pump config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.timing()?;
        config.response_policy()?;
        Ok(config)
    }

    pub fn timing(&self) -> Result<Timing, ConfigError> {
        Ok(Timing {
            settle: seconds("timing.settle_secs", self.timing.settle_secs)?,
            reset_delay: seconds("timing.reset_delay_secs", self.timing.reset_delay_secs)?,
            command_delay: seconds("timing.command_delay_secs", self.timing.command_delay_secs)?,
        })
    }

    pub fn response_policy(&self) -> Result<ResponsePolicy, ConfigError> {
        let response = &self.response;
        let timeout = seconds("response.timeout_secs", response.timeout_secs)?;
        let quiet_period = seconds("response.timeout_delay_secs", response.timeout_delay_secs)?;
        Ok(match response.mode {
            ResponseMode::Quiet => ResponsePolicy::Quiet,
            ResponseMode::Deadline => ResponsePolicy::Deadline {
                timeout,
                quiet_period,
                terminator: response.terminator,
            },
        })
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative number of seconds, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pump_constants() {
        let config = PumpConfig::default();
        let timing = config.timing().unwrap();
        assert_eq!(timing.settle, Duration::from_secs(1));
        assert_eq!(timing.reset_delay, Duration::from_secs(1));
        assert_eq!(timing.command_delay, Duration::from_millis(200));
        assert_eq!(config.response_policy().unwrap(), ResponsePolicy::Quiet);
        assert_eq!(config.recipe.field_matching, FieldMatching::Anchored);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = PumpConfig::from_toml("").unwrap();
        assert_eq!(config.timing().unwrap(), PumpConfig::default().timing().unwrap());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = PumpConfig::from_toml(
            r#"
            [timing]
            command_delay_secs = 0.5

            [response]
            mode = "deadline"
            terminator = 3

            [recipe]
            field_matching = "substring"
            "#,
        )
        .unwrap();

        let timing = config.timing().unwrap();
        assert_eq!(timing.command_delay, Duration::from_millis(500));
        assert_eq!(timing.settle, Duration::from_secs(1));
        assert_eq!(
            config.response_policy().unwrap(),
            ResponsePolicy::Deadline {
                timeout: Duration::from_secs(8),
                quiet_period: Duration::from_secs(2),
                terminator: Some(3),
            }
        );
        assert_eq!(config.recipe.field_matching, FieldMatching::Substring);
    }

    #[test]
    fn negative_delay_is_rejected() {
        let err = PumpConfig::from_toml("[timing]\nreset_delay_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("reset_delay_secs")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PumpConfig::from_toml("[timing]\nbaud = 9600\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
