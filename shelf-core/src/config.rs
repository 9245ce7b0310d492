//! Database configuration.
//!
//! Configuration is loaded once by the embedding application and passed explicitly to the
//! code that builds a connector. Sources, lowest to highest precedence: built-in defaults,
//! a TOML document, environment variables.
//!
//! ```toml
//! engine = "mongodb"
//! uri = "mongodb://db.internal:27017"
//! database = "shelf"
//! connect_timeout_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};

use crate::error::{StoreError, StoreResult};

pub const ENV_URI: &str = "MONGODB_URI";
pub const ENV_ENGINE: &str = "SHELF_DB_ENGINE";
pub const ENV_DATABASE: &str = "SHELF_DB_NAME";

/// Document store behind the façade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Process-local store, for tests and development.
    #[default]
    Memory,
    #[serde(alias = "mongoDB")]
    MongoDb,
}

impl FromStr for Engine {
    type Err = StoreError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Engine::Memory),
            "mongodb" => Ok(Engine::MongoDb),
            other => Err(StoreError::Configuration(format!("unknown database engine {other:?}"))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Memory => f.write_str("memory"),
            Engine::MongoDb => f.write_str("mongodb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: Engine,
    /// Connection string of the store.
    pub uri: String,
    /// Name of the database holding every entity.
    pub database: String,
    /// Application name reported to the store, if any.
    pub app_name: Option<String>,
    /// Bound on connection establishment and server selection.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Memory,
            uri: "mongodb://localhost:27017".to_string(),
            database: "shelf".to_string(),
            app_name: None,
            connect_timeout_secs: None,
        }
    }
}

impl DatabaseConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn mongodb(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            engine: Engine::MongoDb,
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> StoreResult<Self> {
        toml::from_str(contents).map_err(|e| StoreError::Configuration(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Configuration(format!("cannot read {}: {e}", path.display())))?;

        Self::from_toml_str(&contents)
    }

    /// Overrides settings from `MONGODB_URI`, `SHELF_DB_ENGINE` and `SHELF_DB_NAME`.
    pub fn with_env_overrides(self) -> StoreResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides settings from an arbitrary variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        if let Some(uri) = lookup(ENV_URI) {
            self.uri = uri;
        }
        if let Some(engine) = lookup(ENV_ENGINE) {
            self.engine = engine.parse()?;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }

        Ok(self)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}
