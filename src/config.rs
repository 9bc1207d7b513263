//! Runtime configuration and logging setup.
//!
//! The scheduler recognises a single option, `poll_interval_seconds`: how
//! often the reminder loop wakes when nothing is about to become due. Lower
//! values pick up changes made by other processes sooner at the cost of more
//! wakeups. The value is resolved from the command line, then the `config`
//! table, then [`DEFAULT_POLL_INTERVAL_SECS`].

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::database::SqliteStore;
use crate::error::TaskError;

pub const POLL_INTERVAL_KEY: &str = "poll_interval_seconds";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;

const KNOWN_KEYS: [(&str, &str); 1] = [(
    POLL_INTERVAL_KEY,
    "How often the reminder loop wakes, in seconds (1-3600)",
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn from_secs(secs: u64) -> Result<Self, TaskError> {
        if secs == 0 || secs > MAX_POLL_INTERVAL_SECS {
            return Err(TaskError::Validation(format!(
                "{} must be between 1 and {}, got {}",
                POLL_INTERVAL_KEY, MAX_POLL_INTERVAL_SECS, secs
            )));
        }
        Ok(SchedulerConfig {
            poll_interval: Duration::from_secs(secs),
        })
    }

    /// Command-line override first, then the stored value, then the default.
    pub fn resolve(store: &SqliteStore, cli_override: Option<u64>) -> Result<Self, TaskError> {
        if let Some(secs) = cli_override {
            return Self::from_secs(secs);
        }
        match store.get_config(POLL_INTERVAL_KEY)? {
            Some(raw) => Self::from_secs(parse_secs(&raw)?),
            None => Ok(Self::default()),
        }
    }
}

fn parse_secs(raw: &str) -> Result<u64, TaskError> {
    raw.trim().parse::<u64>().map_err(|_| {
        TaskError::Validation(format!(
            "{} must be a whole number of seconds, got '{}'",
            POLL_INTERVAL_KEY, raw
        ))
    })
}

/// Validates a `config set` request and returns the key's description.
pub fn validate_setting(key: &str, value: &str) -> Result<&'static str, TaskError> {
    let Some((_, description)) = KNOWN_KEYS.iter().find(|(name, _)| *name == key) else {
        let known: Vec<&str> = KNOWN_KEYS.iter().map(|(name, _)| *name).collect();
        return Err(TaskError::Validation(format!(
            "unknown config key '{}', known keys: {}",
            key,
            known.join(", ")
        )));
    };

    if key == POLL_INTERVAL_KEY {
        SchedulerConfig::from_secs(parse_secs(value)?)?;
    }
    Ok(description)
}

pub fn default_log_path() -> PathBuf {
    let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home_dir).join(".tasktick.log")
}

fn log_builder() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}

/// Logs to stderr; used by the one-shot commands and `watch`.
pub fn init_stderr_logging() {
    let _ = log_builder().try_init();
}

/// Logs to a file so the TUI keeps the terminal to itself.
pub fn init_file_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    let _ = log_builder()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_thirty_seconds() {
        assert_eq!(
            SchedulerConfig::default().poll_interval,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn interval_bounds_are_enforced() {
        assert!(SchedulerConfig::from_secs(0).is_err());
        assert!(SchedulerConfig::from_secs(3601).is_err());
        assert_eq!(
            SchedulerConfig::from_secs(60).unwrap().poll_interval,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn resolve_prefers_cli_then_store_then_default() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            SchedulerConfig::resolve(&store, None).unwrap(),
            SchedulerConfig::default()
        );

        store.set_config(POLL_INTERVAL_KEY, "45", None).unwrap();
        assert_eq!(
            SchedulerConfig::resolve(&store, None).unwrap().poll_interval,
            Duration::from_secs(45)
        );
        assert_eq!(
            SchedulerConfig::resolve(&store, Some(5)).unwrap().poll_interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn garbage_stored_interval_is_a_validation_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_config(POLL_INTERVAL_KEY, "soon", None).unwrap();
        assert!(matches!(
            SchedulerConfig::resolve(&store, None),
            Err(TaskError::Validation(_))
        ));
    }

    #[test]
    fn only_known_keys_can_be_set() {
        assert!(validate_setting(POLL_INTERVAL_KEY, "60").is_ok());
        assert!(validate_setting(POLL_INTERVAL_KEY, "0").is_err());
        assert!(validate_setting("theme", "dark").is_err());
    }

    #[test]
    fn file_logging_creates_log_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("tasktick.log");
        init_file_logging(&path).expect("log file opens");
        assert!(path.exists());

        let missing = dir.path().join("no-such-dir").join("tasktick.log");
        assert!(init_file_logging(&missing).is_err());
    }
}
