//! Application configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. TOML file (`--config` path, else ~/.local/share/uvgestor/config.toml);
//!    a missing file means defaults
//! 2. Environment overrides (`UVGESTOR_DB`, `UVGESTOR_REMOTE_URL`,
//!    `UVGESTOR_REMOTE_API_KEY`, `UVGESTOR_IDENTITY_URL`)
//!
//! No `[remote]` or `[identity]` section means offline mode for that side.
//!
//! ```toml
//! [database]
//! path = "/home/ana/.local/share/uvgestor/uvgestor.db"
//! encrypt = true
//!
//! [remote]
//! url = "https://docs.example.com/v1"
//! api_key = "..."
//! timeout_secs = 10
//! poll_interval_secs = 30
//!
//! [identity]
//! url = "https://auth.example.com"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

pub const DB_PATH_ENV: &str = "UVGESTOR_DB";
pub const REMOTE_URL_ENV: &str = "UVGESTOR_REMOTE_URL";
pub const REMOTE_API_KEY_ENV: &str = "UVGESTOR_REMOTE_API_KEY";
pub const IDENTITY_URL_ENV: &str = "UVGESTOR_IDENTITY_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Resolved application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: Option<RemoteConfig>,
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Require `UVGESTOR_DB_KEY` and open the database with SQLCipher
    pub encrypt: bool,
}

/// Remote document store settings
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl RemoteConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// Identity provider settings
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl IdentityConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: default_db_path(),
                encrypt: true,
            },
            remote: None,
            identity: None,
        }
    }
}

impl AppConfig {
    /// Load the config file (if any) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load only the file layer
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        match path {
            Some(p) if p.exists() => {
                debug!(path = %p.display(), "Loading config file");
                let content = fs::read_to_string(&p)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
                parse_config(&content)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(DB_PATH_ENV) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = get(REMOTE_URL_ENV) {
            match &mut self.remote {
                Some(remote) => remote.url = url,
                None => self.remote = Some(RemoteConfig::new(&url)),
            }
        }
        if let Some(key) = get(REMOTE_API_KEY_ENV) {
            if let Some(remote) = &mut self.remote {
                remote.api_key = Some(key);
            }
        }
        if let Some(url) = get(IDENTITY_URL_ENV) {
            match &mut self.identity {
                Some(identity) => identity.url = url,
                None => self.identity = Some(IdentityConfig::new(&url)),
            }
        }
    }
}

/// Default data directory (~/.local/share/uvgestor on Linux)
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("uvgestor"))
}

/// Default config file path
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|d| d.join("config.toml"))
}

/// Default database path, falling back to the working directory
pub fn default_db_path() -> PathBuf {
    default_data_dir()
        .map(|d| d.join("uvgestor.db"))
        .unwrap_or_else(|| PathBuf::from("uvgestor.db"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    database: Option<RawDatabase>,
    remote: Option<RawRemote>,
    identity: Option<RawIdentity>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    path: Option<PathBuf>,
    encrypt: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawRemote {
    url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawIdentity {
    url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

fn positive_secs(key: &str, value: Option<u64>, default: u64) -> Result<u64> {
    match value {
        Some(0) => Err(Error::Config(format!("{} must be at least 1", key))),
        Some(secs) => Ok(secs),
        None => Ok(default),
    }
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = AppConfig::default();

    if let Some(database) = raw.database {
        if let Some(path) = database.path {
            config.database.path = path;
        }
        if let Some(encrypt) = database.encrypt {
            config.database.encrypt = encrypt;
        }
    }

    // A section without a url is treated as absent
    if let Some(remote) = raw.remote {
        config.remote = match remote.url {
            Some(url) => Some(RemoteConfig {
                url,
                api_key: remote.api_key,
                timeout_secs: positive_secs(
                    "remote.timeout_secs",
                    remote.timeout_secs,
                    DEFAULT_TIMEOUT_SECS,
                )?,
                poll_interval_secs: positive_secs(
                    "remote.poll_interval_secs",
                    remote.poll_interval_secs,
                    DEFAULT_POLL_INTERVAL_SECS,
                )?,
            }),
            None => None,
        };
    }

    if let Some(identity) = raw.identity {
        config.identity = match identity.url {
            Some(url) => Some(IdentityConfig {
                url,
                api_key: identity.api_key,
                timeout_secs: positive_secs(
                    "identity.timeout_secs",
                    identity.timeout_secs,
                    DEFAULT_TIMEOUT_SECS,
                )?,
            }),
            None => None,
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [database]
            path = "/tmp/u.db"
            encrypt = false

            [remote]
            url = "http://localhost:9000"
            api_key = "k"
            poll_interval_secs = 5

            [identity]
            url = "http://localhost:9100"
            timeout_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/u.db"));
        assert!(!config.database.encrypt);

        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "http://localhost:9000");
        assert_eq!(remote.api_key.as_deref(), Some("k"));
        assert_eq!(remote.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(remote.poll_interval_secs, 5);

        assert_eq!(config.identity.unwrap().timeout_secs, 3);
    }

    #[test]
    fn test_empty_config_is_offline() {
        let config = parse_config("").unwrap();
        assert!(config.remote.is_none());
        assert!(config.identity.is_none());
        assert!(config.database.encrypt);
    }

    #[test]
    fn test_remote_section_without_url_is_ignored() {
        let config = parse_config("[remote]\napi_key = \"k\"\n").unwrap();
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let err = parse_config("[remote]\nurl = \"http://r\"\npoll_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("poll_interval_secs")));

        let err = parse_config("[identity]\nurl = \"http://i\"\ntimeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("identity.timeout_secs")));

        let config = parse_config("[remote]\nurl = \"http://r\"\npoll_interval_secs = 1\n").unwrap();
        assert_eq!(config.remote.unwrap().poll_interval_secs, 1);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_config("[database\npath = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (DB_PATH_ENV, "/data/env.db"),
            (REMOTE_URL_ENV, "http://remote"),
            (REMOTE_API_KEY_ENV, "secret"),
            (IDENTITY_URL_ENV, ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/env.db"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "http://remote");
        assert_eq!(remote.api_key.as_deref(), Some("secret"));
        // Blank values are ignored
        assert!(config.identity.is_none());
    }

    #[test]
    fn test_from_file_missing_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(Some(&dir.path().join("nope.toml"))).unwrap();
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[remote]\nurl = \"mock://\"\n").unwrap();

        let config = AppConfig::from_file(Some(&path)).unwrap();
        assert_eq!(config.remote.unwrap().url, "mock://");
    }
}
