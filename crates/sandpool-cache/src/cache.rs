//! Get-or-compute helpers over a [`CacheStore`].
//!
//! ```text
//! remember(key)
//!   → disable_cache  → slow()                       (store untouched)
//!   → use_fresh_data → slow() → store → value
//!   → hit            → decoded value
//!   → miss           → slow() → store → value       (store failures logged)
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;

/// Per-call switches for the cache helpers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Skip the cache entirely. Usually for debugging.
    pub disable_cache: bool,
    /// Ignore what is cached and compute a fresh value, which is then stored.
    pub use_fresh_data: bool,
    /// Trace hits, misses and store failures at info level.
    pub log: bool,
}

impl CacheOptions {
    pub fn disabled() -> Self {
        Self {
            disable_cache: true,
            ..Self::default()
        }
    }

    pub fn fresh() -> Self {
        Self {
            use_fresh_data: true,
            ..Self::default()
        }
    }

    pub fn logged(self) -> Self {
        Self { log: true, ..self }
    }
}

/// Return the value cached under `key`, computing and caching it with
/// `slow` when absent.
///
/// Errors from `slow` are returned as is. Cache failures never are: a value
/// that cannot be read back is recomputed, and one that cannot be written is
/// still returned.
pub async fn remember<T, E, F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    expiration: Duration,
    slow: F,
    options: CacheOptions,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if options.disable_cache {
        return slow().await;
    }

    if options.use_fresh_data {
        if options.log {
            tracing::info!(key, "fetching fresh value");
        }
    } else {
        match retrieve_json::<T>(store, key, CacheOptions::default()) {
            Ok(value) => {
                if options.log {
                    tracing::info!(key, "cache hit");
                }
                return Ok(value);
            }
            Err(e) => {
                if options.log {
                    tracing::info!(key, error = %e, "cache miss, fetching value");
                }
            }
        }
    }

    let value = slow().await?;
    if let Err(e) = store_json(store, key, expiration, &value, CacheOptions::default()) {
        if options.log {
            tracing::info!(key, error = %e, "could not store value in cache");
        }
    }
    Ok(value)
}

/// Store `value` under `key`, encoded as JSON.
pub fn store_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    expiration: Duration,
    value: &T,
    options: CacheOptions,
) -> CacheResult<()> {
    if options.log {
        tracing::info!(key, "storing in cache");
    }
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes, expiration).inspect_err(|e| {
        if options.log {
            tracing::info!(key, error = %e, "could not store value in cache");
        }
    })
}

/// Fetch and decode a JSON value stored with [`store_json`].
pub fn retrieve_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
    options: CacheOptions,
) -> CacheResult<T> {
    if options.log {
        tracing::info!(key, "retrieving from cache");
    }
    let decoded: CacheResult<T> = store
        .get(key)
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from));
    match &decoded {
        Ok(_) if options.log => tracing::info!(key, "found in cache"),
        Err(e) if options.log => tracing::info!(key, error = %e, "unable to retrieve from cache"),
        _ => {}
    }
    decoded
}

/// Store the display text of `value` under `key`.
pub fn store(
    store: &dyn CacheStore,
    key: &str,
    expiration: Duration,
    value: impl Display,
    options: CacheOptions,
) -> CacheResult<()> {
    let text = value.to_string();
    store.set(key, text.clone().into_bytes(), expiration).inspect_err(|e| {
        if options.log {
            tracing::info!(key, value = %text, error = %e, "could not store value in cache");
        }
    })
}

/// Fetch text stored with [`store`].
pub fn retrieve(store: &dyn CacheStore, key: &str, options: CacheOptions) -> CacheResult<String> {
    if options.log {
        tracing::info!(key, "retrieving from cache");
    }
    let bytes = store.get(key).inspect_err(|e| {
        if options.log {
            tracing::info!(key, error = %e, "unable to retrieve from cache");
        }
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Add `delta` to the counter under `key`.
///
/// When the counter does not exist yet, `init` supplies its starting value
/// and expiration; the starting value is stored as is, without `delta`, and
/// returned.
pub async fn increment_or_set<E, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    delta: i64,
    init: F,
    options: CacheOptions,
) -> Result<u64, E>
where
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(u64, Duration), E>>,
{
    match cache.increment_existing(key, delta) {
        Ok(value) => {
            if options.log {
                tracing::info!(key, value, "incremented counter");
            }
            return Ok(value);
        }
        Err(e) if !e.is_miss() => return Err(e.into()),
        Err(_) => {}
    }

    let (initial, expiration) = init().await.inspect_err(|_| {
        if options.log {
            tracing::info!(key, "unable to compute initial counter value");
        }
    })?;
    store(cache, key, expiration, initial, options)?;
    Ok(initial)
}

/// Add `delta` to the counter under `key`, creating it as `initial` first.
pub fn increment(cache: &dyn CacheStore, key: &str, delta: i64, initial: u64) -> CacheResult<u64> {
    cache.increment(key, delta, initial)
}

/// Add `delta` to an existing counter.
pub fn increment_existing(cache: &dyn CacheStore, key: &str, delta: i64) -> CacheResult<u64> {
    cache.increment_existing(key, delta)
}

pub fn delete(cache: &dyn CacheStore, key: &str) -> CacheResult<()> {
    cache.delete(key)
}

pub fn delete_multi(cache: &dyn CacheStore, keys: &[&str]) -> CacheResult<()> {
    cache.delete_multi(keys)
}
