//! sandpool — bounded database connection pooling over sandbox sockets.
//!
//! Sandboxed guests cannot open sockets themselves; every connection is
//! dialed through a host socket API on behalf of the request being served.
//! This crate keeps those connections alive across requests:
//! - **transport**: Host socket API seam and the request-scoped [`Transport`]
//! - **dial**: Per-call dialers that hand a driver's dial hook its context
//! - **driver**: Database driver traits (`Driver`, `Database`, statements, transactions)
//! - **pool**: Generic bounded pool with checkout tokens
//! - **factory**: Builds one driver handle pinned to one transport
//! - **manager**: Lazy shared pool with probe-on-checkout and eviction
//! - **conn**: [`SandboxedDb`], whose `close` returns pooled handles
//! - **sql**: Process-wide registration and `open`
//! - **config**: TOML configuration for driver, data source and capacity

pub mod config;
pub mod conn;
pub mod context;
pub mod dial;
pub mod driver;
pub mod error;
pub mod factory;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod sql;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{PoolConfig, SandpoolConfig, DEFAULT_MAX_OPEN_CONNS};
pub use conn::SandboxedDb;
pub use context::RequestContext;
pub use dial::{ContextDialer, DialFn, SandboxDialer};
pub use driver::{Database, Driver, Row, Rows, Statement, Transaction, Value};
pub use error::{Error, Result};
pub use factory::ConnectionFactory;
pub use manager::ConnectionPoolManager;
pub use pool::{Member, Membership, Pingable, Pool, PoolStats};
pub use registry::DriverRegistry;
pub use sql::{destroy, open, register_dial, register_driver, Sandpool};
pub use transport::{SandboxSocket, SocketApi, TcpSocketApi, Transport};
