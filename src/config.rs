use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use redis::aio::MultiplexedConnection;
use sqlx::postgres::PgPoolOptions;

use crate::{
    constants::{DEFAULT_DATABASE_URL, DEFAULT_DATA_DIR, DEFAULT_MAX_CONNECTIONS, DEFAULT_REDIS_URL},
    database::{
        error::{CacheError, ConfigError, DomainError, QueryError},
        postgres::PgStore,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub max_connections: u32,
    pub data_dir: PathBuf,
}

impl Config {
    /// Reads the environment, after a `.env` file when one is present.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_err() {
            log::debug!("No .env file found");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: try_load(&lookup, "DATABASE_URL", DEFAULT_DATABASE_URL)?,
            redis_url: try_load(&lookup, "REDIS_URL", DEFAULT_REDIS_URL)?,
            max_connections: try_load(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                &DEFAULT_MAX_CONNECTIONS.to_string(),
            )?,
            data_dir: try_load(&lookup, "FOODGRAM_DATA_DIR", DEFAULT_DATA_DIR)?,
        })
    }

    pub async fn connect_database(&self) -> Result<PgStore, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .map_err(QueryError::from)?;
        log::info!("Connected to database ({} connections)", self.max_connections);

        Ok(PgStore::new(pool))
    }

    pub async fn connect_cache(&self) -> Result<MultiplexedConnection, DomainError> {
        let client = redis::Client::open(self.redis_url.as_str()).map_err(CacheError::from)?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(CacheError::from)?;
        log::info!("Connected to cache");

        Ok(connection)
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::info!("{}", default_notice(key, default));
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            log::warn!("Invalid {key} value: {e}");
            ConfigError::new(format!("Invalid {key} value: {e}"))
        })
}

/// URL defaults may carry credentials, so only their key is named.
fn default_notice(key: &str, default: &str) -> String {
    if default.contains("://") {
        format!("{key} not set, using the built-in default")
    } else {
        format!("{key} not set, using default: {default}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();

        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn set_variables_override_defaults() {
        let vars = HashMap::from([
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("FOODGRAM_DATA_DIR", "/srv/foodgram/data"),
        ]);

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.max_connections, 12);
        assert_eq!(config.data_dir, PathBuf::from("/srv/foodgram/data"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = Config::from_lookup(|key| {
            (key == "DATABASE_MAX_CONNECTIONS").then(|| String::from("many"))
        });

        assert!(result.is_err());
    }

    #[test]
    fn url_defaults_are_not_logged() {
        let notice = default_notice("DATABASE_URL", DEFAULT_DATABASE_URL);

        assert!(notice.contains("DATABASE_URL"));
        assert!(!notice.contains("postgres:postgres"));
        assert_eq!(
            default_notice("FOODGRAM_DATA_DIR", "data"),
            "FOODGRAM_DATA_DIR not set, using default: data"
        );
    }
}
