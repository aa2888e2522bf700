//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables for placeholders, validation limits, notification retry
//!   and default command timeouts.
//! - Parse configuration from JSON with every field optional.
//!
//! # Invariants
//! - A validated config has non-blank placeholders, `max_label_chars > 0`,
//!   `notify_max_attempts > 0` and `notify_backlog_limit > 0`.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_UNKNOWN_ROOM_LABEL: &str = "Unknown Room";
pub const DEFAULT_UNKNOWN_BIN_LABEL: &str = "Unknown Bin";
pub const DEFAULT_MAX_LABEL_CHARS: usize = 120;
pub const DEFAULT_NOTIFY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_NOTIFY_BACKLOG_LIMIT: usize = 10_000;

/// Configuration parse/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "failed to parse engine config: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Matrix engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name stored when the room directory does not know a room.
    pub unknown_room_label: String,
    /// Display label stored when the bin directory does not know a bound bin.
    pub unknown_bin_label: String,
    /// Upper bound for labels and names, in characters.
    pub max_label_chars: usize,
    /// Immediate delivery attempts per notification before it is deferred
    /// to the sink's backlog for later redelivery.
    pub notify_max_attempts: u32,
    /// Events a failing sink may accumulate before the oldest are dropped.
    pub notify_backlog_limit: usize,
    /// Timeout applied to commands that do not pass their own.
    pub default_command_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unknown_room_label: DEFAULT_UNKNOWN_ROOM_LABEL.to_string(),
            unknown_bin_label: DEFAULT_UNKNOWN_BIN_LABEL.to_string(),
            max_label_chars: DEFAULT_MAX_LABEL_CHARS,
            notify_max_attempts: DEFAULT_NOTIFY_MAX_ATTEMPTS,
            notify_backlog_limit: DEFAULT_NOTIFY_BACKLOG_LIMIT,
            default_command_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unknown_room_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "unknown_room_label must not be blank".to_string(),
            ));
        }
        if self.unknown_bin_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "unknown_bin_label must not be blank".to_string(),
            ));
        }
        if self.max_label_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_label_chars must be greater than zero".to_string(),
            ));
        }
        if self.notify_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "notify_max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.notify_backlog_limit == 0 {
            return Err(ConfigError::Invalid(
                "notify_backlog_limit must be greater than zero".to_string(),
            ));
        }
        if self.default_command_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "default_command_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_command_timeout(&self) -> Option<Duration> {
        self.default_command_timeout_ms.map(Duration::from_millis)
    }
}
