//! crates/logging/src/config.rs
//! Logger configuration read from the `UDS_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use super::levels::LogLevel;

/// Path of the log file; stderr is used when unset.
pub const ENV_LOGFILE: &str = "UDS_LOGFILE";
/// Maximum priority that is emitted.
pub const ENV_LOG_LEVEL: &str = "UDS_LOG_LEVEL";
/// Whether each line carries a timestamp.
pub const ENV_LOG_TIMESTAMPS: &str = "UDS_LOG_TIMESTAMPS";
/// Whether each line carries the emitting thread id.
pub const ENV_LOG_IDS: &str = "UDS_LOG_IDS";
/// Kind of mutex the synchronization shims are asked to build.
pub const ENV_MUTEX_KIND: &str = "UDS_MUTEX_KIND";

/// Mutex flavour requested through `UDS_MUTEX_KIND`.
///
/// The logging layer only records the request; the synchronization
/// primitives read it back through [`LogConfig::mutex_kind`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MutexKind {
    /// Plain non-checking mutex.
    #[default]
    Fast,
    /// Mutex that reports recursive locking and foreign unlocks.
    ErrorChecking,
    /// Spin briefly before sleeping.
    Adaptive,
}

impl FromStr for MutexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "normal" | "default" => Ok(Self::Fast),
            "error-checking" | "errorcheck" | "error_checking" => Ok(Self::ErrorChecking),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!("unknown mutex kind '{other}'")),
        }
    }
}

/// Process-wide logger settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogConfig {
    /// Destination file, or `None` for stderr.
    pub log_file: Option<PathBuf>,
    /// Maximum priority emitted.
    pub level: LogLevel,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Prefix lines with the thread id.
    pub thread_ids: bool,
    /// Requested mutex flavour.
    pub mutex_kind: MutexKind,
    /// Problems found while parsing, reported once the logger is up.
    pub warnings: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            level: LogLevel::Info,
            timestamps: true,
            thread_ids: true,
            mutex_kind: MutexKind::Fast,
            warnings: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Malformed values never fail: they fall back to the default and leave
    /// a note in [`warnings`](Self::warnings).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_LOGFILE).filter(|p| !p.trim().is_empty()) {
            config.log_file = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            match value.parse::<LogLevel>() {
                Ok(level) => config.level = level,
                Err(err) => config.warnings.push(format!("{ENV_LOG_LEVEL}: {err}")),
            }
        }

        if let Some(value) = lookup(ENV_LOG_TIMESTAMPS) {
            config.timestamps = parse_flag(&value);
        }
        if let Some(value) = lookup(ENV_LOG_IDS) {
            config.thread_ids = parse_flag(&value);
        }

        if let Some(value) = lookup(ENV_MUTEX_KIND) {
            match value.parse::<MutexKind>() {
                Ok(kind) => config.mutex_kind = kind,
                Err(err) => config.warnings.push(format!("{ENV_MUTEX_KIND}: {err}")),
            }
        }

        config
    }

    /// Returns the requested mutex flavour.
    #[must_use]
    pub const fn mutex_kind(&self) -> MutexKind {
        self.mutex_kind
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = LogConfig::from_lookup(|_| None);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = LogConfig::from_lookup(lookup_from(&[
            (ENV_LOGFILE, "/tmp/uds.log"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_TIMESTAMPS, "0"),
            (ENV_LOG_IDS, "off"),
            (ENV_MUTEX_KIND, "error-checking"),
        ]));

        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/uds.log")));
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.timestamps);
        assert!(!config.thread_ids);
        assert_eq!(config.mutex_kind(), MutexKind::ErrorChecking);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn blank_logfile_means_stderr() {
        let config = LogConfig::from_lookup(lookup_from(&[(ENV_LOGFILE, "  ")]));
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn malformed_values_fall_back_with_warnings() {
        let config = LogConfig::from_lookup(lookup_from(&[
            (ENV_LOG_LEVEL, "loud"),
            (ENV_MUTEX_KIND, "recursive"),
        ]));

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.mutex_kind(), MutexKind::Fast);
        assert_eq!(config.warnings.len(), 2);
        assert!(config.warnings[0].contains(ENV_LOG_LEVEL));
        assert!(config.warnings[1].contains("recursive"));
    }

    #[test]
    fn flags_accept_any_non_false_value() {
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(parse_flag(""));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(" no "));
    }
}
