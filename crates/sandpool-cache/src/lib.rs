//! sandpool-cache — keyed get-or-compute caching over pluggable stores.
//!
//! - **store**: The [`CacheStore`] seam and the in-process [`MemoryStore`]
//! - **cache**: `remember`, JSON and text storage, counters, deletes

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{
    delete, delete_multi, increment, increment_existing, increment_or_set, remember, retrieve,
    retrieve_json, store, store_json, CacheOptions,
};
pub use error::{CacheError, CacheResult};
pub use store::{CacheStore, MemoryStore, DEFAULT_SWEEP_INTERVAL};
