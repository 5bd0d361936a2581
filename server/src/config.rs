//! Server settings, read from environment variables (a `.env` file is honored).

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use shared::constants::DEFAULT_PORT;

const DEFAULT_STORAGE_DIR: &str = "storage";
const DEFAULT_DB_FILE: &str = "ftplite.sqlite";
const DEFAULT_MAX_SESSIONS: usize = 256;
const DEFAULT_LIST_LIMIT: u32 = 1000;
const DEFAULT_CHECKPOINT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub db_path: PathBuf,
    /// Maximum number of sessions running at the same time.
    pub max_sessions: usize,
    /// Closes a session that doesn't start a new message within this time.
    pub idle_timeout: Option<Duration>,
    pub list_limit: u32,
    /// Resume checkpoints older than this are removed at startup.
    pub checkpoint_max_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let storage_dir = PathBuf::from(DEFAULT_STORAGE_DIR);
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            db_path: storage_dir.join(DEFAULT_DB_FILE),
            storage_dir,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: None,
            list_limit: DEFAULT_LIST_LIMIT,
            checkpoint_max_age: DEFAULT_CHECKPOINT_MAX_AGE,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let storage_dir = lookup("STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from);
        let db_path = lookup("DB_PATH").map_or_else(|| storage_dir.join(DEFAULT_DB_FILE), PathBuf::from);

        let max_sessions = parse_var(&lookup, "MAX_SESSIONS")?.unwrap_or(defaults.max_sessions);
        if max_sessions == 0 {
            return Err(anyhow!("MAX_SESSIONS must be at least 1"));
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            storage_dir,
            db_path,
            max_sessions,
            idle_timeout: parse_var(&lookup, "IDLE_TIMEOUT_SECS")?.map(Duration::from_secs),
            list_limit: parse_var(&lookup, "LIST_LIMIT")?.unwrap_or(defaults.list_limit),
            checkpoint_max_age: parse_var(&lookup, "CHECKPOINT_MAX_AGE_SECS")?
                .map_or(defaults.checkpoint_max_age, Duration::from_secs),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("invalid value {value:?} for {key}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8021");
        assert_eq!(config.db_path, PathBuf::from("storage").join("ftplite.sqlite"));
        assert_eq!(config.max_sessions, 256);
        assert_eq!(config.list_limit, 1000);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.checkpoint_max_age, Duration::from_secs(604_800));
    }

    #[test]
    fn database_follows_storage_dir() {
        let config = from_pairs(&[("STORAGE_DIR", "/srv/files")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/files/ftplite.sqlite"));

        let config = from_pairs(&[("STORAGE_DIR", "/srv/files"), ("DB_PATH", "/var/meta.db")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/meta.db"));
    }

    #[test]
    fn numeric_overrides() {
        let config = from_pairs(&[
            ("MAX_SESSIONS", "8"),
            ("IDLE_TIMEOUT_SECS", "30"),
            ("LIST_LIMIT", "5"),
            ("CHECKPOINT_MAX_AGE_SECS", "3600"),
        ])
        .unwrap();
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.list_limit, 5);
        assert_eq!(config.checkpoint_max_age, Duration::from_secs(3600));
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = from_pairs(&[("MAX_SESSIONS", "many")]).unwrap_err();
        assert!(err.to_string().contains("MAX_SESSIONS"));

        assert!(from_pairs(&[("MAX_SESSIONS", "0")]).is_err());
        assert!(from_pairs(&[("LIST_LIMIT", "-1")]).is_err());
    }
}
