use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{CacheError, DomainError},
    schema::Id,
};

/// Holds the current reference generation. Entries stamped with any other
/// generation are stale.
const REFERENCE_GENERATION_KEY: &str = "reference-generation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKey {
    Tags,
    Tag(Id),
    IngredientSearch(String),
}

impl ReferenceKey {
    /// Searches differing only in case or surrounding whitespace share an entry.
    pub fn ingredient_search(name: &str) -> Self {
        Self::IngredientSearch(name.trim().to_lowercase())
    }

    pub fn redis_key(&self) -> String {
        match self {
            ReferenceKey::Tags => String::from("reference:tags"),
            ReferenceKey::Tag(id) => format!("reference:tag:{id}"),
            ReferenceKey::IngredientSearch(name) => format!("reference:ingredients:{name}"),
        }
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct CachedValue<T: Serialize + Send + Sync + Clone> {
    pub value: T,
    generation: Option<String>,
}

impl<T: Serialize + Send + Sync + Clone> CachedValue<T> {
    fn is_current(&self, generation: &Option<String>) -> bool {
        &self.generation == generation
    }
}

pub async fn reference_generation(
    cache: &mut MultiplexedConnection,
) -> Result<Option<String>, DomainError> {
    read_entry(REFERENCE_GENERATION_KEY, cache).await
}

/// Returns the cached value under `key` when it belongs to the current
/// generation, otherwise runs `fetch` and caches its result.
pub async fn cached_or_fetch<T, F, Fut>(
    key: &ReferenceKey,
    cache: &mut MultiplexedConnection,
    fetch: F,
) -> Result<T, DomainError>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let redis_key = key.redis_key();
    let generation = reference_generation(cache).await?;

    let cached = match read_entry::<_, CachedValue<T>>(&redis_key, cache).await {
        Ok(cached) => cached,
        Err(e) => {
            log::error!("Unreadable cache entry {redis_key}, evicting: {e}");
            if let Err(e) = drop_entry(&redis_key, cache).await {
                log::error!("Failed to evict {redis_key}: {e}");
            }
            None
        }
    };

    match cached {
        Some(cached) if cached.is_current(&generation) => {
            log::trace!("> Cache hit {redis_key}");
            return Ok(cached.value);
        }
        Some(_) => log::trace!("> Stale {redis_key}"),
        None => log::trace!("> Cache miss {redis_key}"),
    }

    let value = fetch().await?;
    let entry = CachedValue {
        value: value.clone(),
        generation,
    };
    // The value is still served when the write fails
    if let Err(e) = write_entry(&redis_key, entry, cache).await {
        log::error!("Failed to cache {redis_key}: {e}");
    }

    Ok(value)
}

/// Starts a new reference generation, which invalidates every cached lookup.
pub async fn invalidate_reference_cache(
    cache: &mut MultiplexedConnection,
) -> Result<(), DomainError> {
    let generation = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string();
    log::debug!("Reference cache generation is now {generation}");

    write_entry(REFERENCE_GENERATION_KEY, generation, cache).await
}

async fn write_entry<K, V>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), DomainError>
where
    K: ToRedisArgs + Send + Sync,
    V: ToRedisArgs + Send + Sync,
{
    cache
        .set::<K, V, ()>(key, value)
        .await
        .map_err(|e| CacheError::from(e).into())
}

async fn read_entry<K, V>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, DomainError>
where
    K: ToRedisArgs + Send + Sync,
    V: FromRedisValue,
{
    cache
        .get::<K, Option<V>>(key)
        .await
        .map_err(|e| CacheError::from(e).into())
}

async fn drop_entry<K>(key: K, cache: &mut MultiplexedConnection) -> Result<(), DomainError>
where
    K: ToRedisArgs + Send + Sync,
{
    cache
        .del::<K, ()>(key)
        .await
        .map_err(|e| CacheError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_under_reference() {
        assert_eq!(ReferenceKey::Tags.redis_key(), "reference:tags");
        assert_eq!(ReferenceKey::Tag(7).redis_key(), "reference:tag:7");
        assert_eq!(
            ReferenceKey::ingredient_search("  SaL ").redis_key(),
            "reference:ingredients:sal"
        );
    }

    #[test]
    fn entries_are_current_only_for_their_generation() {
        let entry = CachedValue {
            value: vec![1, 2, 3],
            generation: Some(String::from("1700000000")),
        };

        assert!(entry.is_current(&Some(String::from("1700000000"))));
        assert!(!entry.is_current(&Some(String::from("1800000000"))));
        assert!(!entry.is_current(&None));
    }
}
