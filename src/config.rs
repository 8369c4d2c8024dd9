//! Application configuration.
//!
//! Precedence: CLI > env (`TOURLITE_*`) > config files > defaults. Files are tried in order:
//! `--config`, `TOURLITE_CONFIG`, `<config dir>/tourlite.toml`, `./tourlite.toml`; earlier files
//! win per field.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::DbError;

pub const CONFIG_FILE_NAME: &str = "tourlite.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Directory holding `<collection>.ndjson`; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
    /// Route `dev6!` lines to their own log file.
    pub dev6: Option<bool>,
    /// Upper bound applied to client `limit` by the catalog. `None` leaves it uncapped.
    pub max_limit: Option<usize>,
}

impl AppConfig {
    /// Fills every unset field from `other`.
    pub fn merge_missing(&mut self, other: Self) {
        self.data_dir = self.data_dir.take().or(other.data_dir);
        self.log_dir = self.log_dir.take().or(other.log_dir);
        self.log_level = self.log_level.take().or(other.log_level);
        self.log_retention = self.log_retention.or(other.log_retention);
        self.dev6 = self.dev6.or(other.dev6);
        self.max_limit = self.max_limit.or(other.max_limit);
    }

    /// # Errors
    /// `Io` when the file cannot be read, `Config` when it is not valid TOML for this struct.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let s = std::fs::read_to_string(path)?;
        toml::from_str(&s).map_err(|e| DbError::Config(format!("{}: {e}", path.display())))
    }

    /// Reads `TOURLITE_*` variables through `lookup`.
    ///
    /// # Errors
    /// `Config` when a numeric or boolean variable does not parse.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num(name: &str, v: Option<String>) -> Result<Option<usize>, DbError> {
            v.map(|s| s.trim().parse::<usize>().map_err(|e| DbError::Config(format!("{name}: {e}")))).transpose()
        }
        let dev6 = lookup("TOURLITE_DEV6").map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        Ok(Self {
            data_dir: lookup("TOURLITE_DATA_DIR").map(PathBuf::from),
            log_dir: lookup("TOURLITE_LOG_DIR").map(PathBuf::from),
            log_level: lookup("TOURLITE_LOG_LEVEL"),
            log_retention: num("TOURLITE_LOG_RETENTION", lookup("TOURLITE_LOG_RETENTION"))?,
            dev6,
            max_limit: num("TOURLITE_MAX_LIMIT", lookup("TOURLITE_MAX_LIMIT"))?,
        })
    }

    /// # Errors
    /// See [`AppConfig::from_env_with`].
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Candidate config files, highest precedence first.
    #[must_use]
    pub fn candidate_paths(explicit: Option<&Path>, env_path: Option<PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        if let Some(p) = env_path {
            paths.push(p);
        }
        if let Some(dir) = dirs_next::config_dir() {
            paths.push(dir.join(CONFIG_FILE_NAME));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Layers `cli` over `env` over the files in `paths`.
    ///
    /// # Errors
    /// `Config` when `explicit` names a missing file, or when any existing file fails to parse.
    pub fn layered(cli: Self, env: Self, paths: &[PathBuf], explicit: Option<&Path>) -> Result<Self, DbError> {
        if let Some(p) = explicit
            && !p.exists()
        {
            return Err(DbError::Config(format!("config file not found: {}", p.display())));
        }
        let mut cfg = cli;
        cfg.merge_missing(env);
        for p in paths.iter().filter(|p| p.is_file()) {
            log::debug!("reading config file {}", p.display());
            cfg.merge_missing(Self::from_file(p)?);
        }
        Ok(cfg)
    }

    /// Resolves the process configuration from CLI values, the environment and config files.
    ///
    /// # Errors
    /// See [`AppConfig::layered`] and [`AppConfig::from_env`].
    pub fn load(cli: Self, explicit: Option<&Path>) -> Result<Self, DbError> {
        let env_path = std::env::var("TOURLITE_CONFIG").ok().map(PathBuf::from);
        let paths = Self::candidate_paths(explicit, env_path);
        Self::layered(cli, Self::from_env()?, &paths, explicit)
    }
}
