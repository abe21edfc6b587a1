//! Logging infrastructure for nextgsim
//!
//! Configurable logging on top of the `tracing` crate. The scheduler crates only
//! emit events; the binary installs the subscriber once at startup.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::error::Error;

/// Verbosity of the `logging.level` setting and the `--log-level` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// `EnvFilter` directive of this level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "warning" {
            return Ok(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level for every target
    pub level: LogLevel,
    /// Extra directives appended to the level, e.g. `nextgsim_sched::ue=debug`
    pub filter: Option<String>,
    /// Emit span enter/exit events (noisy, one pair per slot and cell)
    pub span_events: bool,
}

impl LogConfig {
    /// Builds the `EnvFilter` directive string for this configuration.
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(extra) if !extra.is_empty() => format!("{},{}", self.level, extra),
            _ => self.level.to_string(),
        }
    }
}

/// Installs the global subscriber at `level`, ignoring a subscriber that is
/// already installed.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Example
///
/// ```
/// use nextgsim_common::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) {
    let config = LogConfig {
        level,
        ..LogConfig::default()
    };
    let _ = init_logging_from_config(&config);
}

/// Installs the global subscriber described by the `logging` section.
///
/// `RUST_LOG` takes precedence over `level` and `filter`. Fails on a
/// malformed filter or if a global subscriber is already installed.
pub fn init_logging_from_config(config: &LogConfig) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives()).map_err(|e| Error::Logging(e.to_string()))?,
    };
    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_span_events(span_events)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_round_trips_through_display() {
        for level in LogLevel::ALL {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
    }

    #[test]
    fn test_log_config_directives() {
        let mut config = LogConfig::default();
        assert_eq!(config.directives(), "info");

        config.level = LogLevel::Warn;
        config.filter = Some("nextgsim_sched=debug".to_string());
        assert_eq!(config.directives(), "warn,nextgsim_sched=debug");
    }

    #[test]
    fn test_log_config_yaml() {
        let config: LogConfig = serde_yaml::from_str("level: debug").unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.filter.is_none());
        assert!(!config.span_events);
    }
}
