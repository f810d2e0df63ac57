//! Error types for sandbox connection pooling.

use thiserror::Error;

/// Result type alias for pool, dial and driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while dialing, building, checking out or using a
/// pooled database connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid max open connections: {0} (must be positive)")]
    InvalidCapacity(i64),

    #[error("sandbox dial to {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open database handle: {0}")]
    Open(String),

    #[error("ping failed: {0}")]
    Ping(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("driver connected without dialing through the sandbox")]
    NoTransport,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("database handle is closed")]
    Closed,

    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("no sandbox dial registered for driver: {0}")]
    NoDialRegistered(String),

    #[error("shared pool is bound to {bound}, cannot serve {requested}")]
    PoolMismatch { bound: String, requested: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}
