//! crates/logging/src/levels.rs
//! Syslog-style priorities accepted by `UDS_LOG_LEVEL`.

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;

/// Log priority, ordered from most to least severe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// System is unusable.
    Emergency,
    /// Action must be taken immediately.
    Alert,
    /// Critical conditions.
    Critical,
    /// Error conditions.
    Error,
    /// Warning conditions.
    Warning,
    /// Normal but significant condition.
    Notice,
    /// Informational messages.
    Info,
    /// Debug-level messages.
    Debug,
}

impl LogLevel {
    /// All priorities in severity order.
    pub const ALL: [Self; 8] = [
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Alert => "ALERT",
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Maps the priority onto the closest tracing level filter.
    ///
    /// Tracing has no equivalent of the four most severe syslog priorities
    /// or of NOTICE, so those collapse onto ERROR and INFO respectively.
    #[must_use]
    pub const fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Emergency | Self::Alert | Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Notice | Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a priority name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("LOG_").unwrap_or(&upper);

        let level = match name {
            "EMERG" | "EMERGENCY" | "PANIC" => Self::Emergency,
            "ALERT" => Self::Alert,
            "CRIT" | "CRITICAL" => Self::Critical,
            "ERR" | "ERROR" => Self::Error,
            "WARN" | "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "INFO" => Self::Info,
            "DEBUG" => Self::Debug,
            _ => {
                // Numeric syslog priorities 0..=7 are accepted too.
                return name
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| Self::ALL.get(n).copied())
                    .ok_or_else(|| ParseLevelError(trimmed.to_owned()));
            }
        };
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        for level in LogLevel::ALL {
            assert_eq!(level.name().parse::<LogLevel>(), Ok(level));
        }
    }

    #[test]
    fn parses_aliases_and_prefix() {
        assert_eq!("warn".parse(), Ok(LogLevel::Warning));
        assert_eq!("LOG_ERR".parse(), Ok(LogLevel::Error));
        assert_eq!(" crit ".parse(), Ok(LogLevel::Critical));
        assert_eq!("panic".parse(), Ok(LogLevel::Emergency));
    }

    #[test]
    fn parses_numeric_priorities() {
        assert_eq!("0".parse(), Ok(LogLevel::Emergency));
        assert_eq!("7".parse(), Ok(LogLevel::Debug));
        assert!("8".parse::<LogLevel>().is_err());
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "chatty".parse::<LogLevel>().unwrap_err();
        assert_eq!(err, ParseLevelError("chatty".to_owned()));
        assert!(err.to_string().contains("chatty"));
    }

    #[test]
    fn severity_ordering() {
        assert!(LogLevel::Emergency < LogLevel::Debug);
        assert!(LogLevel::Warning < LogLevel::Info);
    }

    #[test]
    fn level_filter_mapping() {
        assert_eq!(LogLevel::Critical.to_level_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Notice.to_level_filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Debug.to_level_filter(), LevelFilter::DEBUG);
    }
}
