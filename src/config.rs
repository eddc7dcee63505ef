use std::path::PathBuf;
use std::time::Duration;

use crate::db::default_db_path;
use crate::watcher::POLL_INTERVAL;

/// Environment variable overriding the database location.
pub const DB_ENV_VAR: &str = "SCRATCH_NOTES_DB";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub poll_interval: Duration,
}

impl Config {
    /// `--db` wins over `SCRATCH_NOTES_DB`, which wins over the platform default.
    pub fn resolve(db_flag: Option<PathBuf>) -> Self {
        Self::resolve_with(db_flag, std::env::var(DB_ENV_VAR).ok())
    }

    fn resolve_with(db_flag: Option<PathBuf>, env_db: Option<String>) -> Self {
        let db_path = db_flag
            .or_else(|| env_db.filter(|v| !v.trim().is_empty()).map(PathBuf::from))
            .unwrap_or_else(default_db_path);
        tracing::debug!("Using note database at {}", db_path.display());
        Self {
            db_path,
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_environment() {
        let config = Config::resolve_with(Some("/tmp/a.sqlite".into()), Some("/tmp/b.sqlite".into()));
        assert_eq!(config.db_path, PathBuf::from("/tmp/a.sqlite"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn environment_beats_default() {
        let config = Config::resolve_with(None, Some("/tmp/b.sqlite".into()));
        assert_eq!(config.db_path, PathBuf::from("/tmp/b.sqlite"));
    }

    #[test]
    fn blank_environment_falls_back_to_default() {
        let config = Config::resolve_with(None, Some("  ".into()));
        assert_eq!(config.db_path, default_db_path());
    }
}
