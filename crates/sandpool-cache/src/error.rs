//! Error types for cache stores and helpers.

use thiserror::Error;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss: {0}")]
    Miss(String),

    #[error("cache misses: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("cached value for {0} is not a counter")]
    NotACounter(String),

    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache store error: {0}")]
    Store(String),
}

impl CacheError {
    /// True for errors meaning "nothing cached under this key".
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss(_) | Self::MissingKeys(_))
    }
}
