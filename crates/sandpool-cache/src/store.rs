//! Key/value stores the cache helpers run against.
//!
//! Values are opaque bytes with an optional expiration. Counters are kept as
//! decimal text so a counter written by `increment` reads back through
//! `retrieve` unchanged.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{CacheError, CacheResult};

/// A shared key/value store with expiring items and atomic counters.
pub trait CacheStore: Send + Sync {
    /// Fetch the bytes stored under `key`, or [`CacheError::Miss`].
    fn get(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Store `value` under `key`. A zero `expiration` never expires.
    fn set(&self, key: &str, value: Vec<u8>, expiration: Duration) -> CacheResult<()>;

    /// Add `delta` to an existing counter and return the new value.
    /// Fails with [`CacheError::Miss`] when the key is absent.
    fn increment_existing(&self, key: &str, delta: i64) -> CacheResult<u64>;

    /// Add `delta` to a counter, first creating it as `initial` when absent.
    fn increment(&self, key: &str, delta: i64, initial: u64) -> CacheResult<u64>;

    /// Remove `key`, or [`CacheError::Miss`] when it was not present.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remove every key. Keys that were absent are reported together in
    /// [`CacheError::MissingKeys`] after the others are removed.
    fn delete_multi(&self, keys: &[&str]) -> CacheResult<()> {
        let mut missing = Vec::new();
        for key in keys {
            match self.delete(key) {
                Ok(()) => {}
                Err(CacheError::Miss(key)) => missing.push(key),
                Err(e) => return Err(e),
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CacheError::MissingKeys(missing))
        }
    }
}

#[derive(Debug)]
struct Item {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Item {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// How often `set` sweeps out expired items by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// In-process [`CacheStore`].
///
/// Expired items are dropped when their key is next touched, and all at once
/// by the first `set` after each sweep interval.
#[derive(Debug)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Item>>,
    sweep_interval: Duration,
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            sweep_interval,
            next_sweep: Mutex::new(Self::after(Instant::now(), sweep_interval)),
        }
    }

    /// Number of unexpired items.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|item| item.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Item>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn after(now: Instant, interval: Duration) -> Instant {
        now.checked_add(interval).unwrap_or(now)
    }

    /// True once per sweep interval.
    fn sweep_due(&self, now: Instant) -> bool {
        let mut next = self
            .next_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if now < *next {
            return false;
        }
        *next = Self::after(now, self.sweep_interval);
        true
    }

    /// The live item under `key`; expired items are dropped on the way.
    fn live<'a>(items: &'a mut HashMap<String, Item>, key: &str) -> Option<&'a mut Item> {
        let now = Instant::now();
        if items.get(key).is_some_and(|item| !item.is_live(now)) {
            items.remove(key);
        }
        items.get_mut(key)
    }

    fn bump(item: &mut Item, key: &str, delta: i64) -> CacheResult<u64> {
        let current: u64 = std::str::from_utf8(&item.value)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| CacheError::NotACounter(key.to_string()))?;
        // Counters wrap on overflow and stop at zero going down.
        let next = if delta >= 0 {
            current.wrapping_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        item.value = next.to_string().into_bytes();
        Ok(next)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        let mut items = self.lock();
        Self::live(&mut items, key)
            .map(|item| item.value.clone())
            .ok_or_else(|| CacheError::Miss(key.to_string()))
    }

    fn set(&self, key: &str, value: Vec<u8>, expiration: Duration) -> CacheResult<()> {
        let expires_at = if expiration.is_zero() {
            None
        } else {
            Instant::now().checked_add(expiration)
        };
        let now = Instant::now();
        let mut items = self.lock();
        if self.sweep_due(now) {
            let before = items.len();
            items.retain(|_, item| item.is_live(now));
            tracing::debug!(swept = before - items.len(), "swept expired cache items");
        }
        items.insert(key.to_string(), Item { value, expires_at });
        Ok(())
    }

    fn increment_existing(&self, key: &str, delta: i64) -> CacheResult<u64> {
        let mut items = self.lock();
        let item = Self::live(&mut items, key).ok_or_else(|| CacheError::Miss(key.to_string()))?;
        Self::bump(item, key, delta)
    }

    fn increment(&self, key: &str, delta: i64, initial: u64) -> CacheResult<u64> {
        let mut items = self.lock();
        if Self::live(&mut items, key).is_none() {
            items.insert(
                key.to_string(),
                Item {
                    value: initial.to_string().into_bytes(),
                    expires_at: None,
                },
            );
        }
        let item = Self::live(&mut items, key).ok_or_else(|| CacheError::Miss(key.to_string()))?;
        Self::bump(item, key, delta)
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let mut items = self.lock();
        if Self::live(&mut items, key).is_none() {
            return Err(CacheError::Miss(key.to_string()));
        }
        items.remove(key);
        Ok(())
    }
}
