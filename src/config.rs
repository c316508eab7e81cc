//! Store configuration loaded from the environment.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

const APP_NAME: &str = "rocket-launches";
const DB_FILE: &str = "launches.db";

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "ROCKET_LAUNCHES_DB";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `ROCKET_LAUNCHES_DB` wins when set and non-empty; otherwise the database lives in
    /// the per-user data directory.
    pub fn from_env() -> Result<Self> {
        Self::resolve(std::env::var(DB_PATH_ENV).ok())
    }

    fn resolve(override_path: Option<String>) -> Result<Self> {
        let database_path = match override_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };
        Ok(Self { database_path })
    }
}

fn default_database_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", APP_NAME).ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        ))
    })?;
    Ok(dirs.data_dir().join(DB_FILE))
}
