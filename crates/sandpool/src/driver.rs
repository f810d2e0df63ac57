//! The SQL driver contract the pool rides on.
//!
//! Query execution and wire protocols belong to the driver. This module only
//! fixes the handle surface that [`SandboxedDb`](crate::conn::SandboxedDb)
//! delegates to, and how a driver receives the sandbox dial hook.

use crate::dial::DialFn;
use crate::error::Result;

/// A single SQL value, as passed in parameters and returned in rows.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

pub type Row = Vec<Value>;

/// Result set of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A registered SQL driver.
pub trait Driver: Send + Sync {
    /// Open a database handle against `data_source`.
    ///
    /// Handles are lazy: no connection needs to exist until the first
    /// round-trip. When `dial` is `Some`, every transport the handle needs
    /// must be obtained through it. `None` lets the driver use its own
    /// networking.
    fn open(&self, data_source: &str, dial: Option<DialFn>) -> Result<Box<dyn Database>>;
}

/// The standard database-handle surface.
pub trait Database: Send {
    /// Round-trip to the server, connecting first if needed.
    fn ping(&mut self) -> Result<()>;
    /// Execute a statement, returning the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows>;
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>>;
    fn begin(&mut self) -> Result<Box<dyn Transaction>>;
    fn set_max_open_conns(&mut self, n: usize);
    fn set_max_idle_conns(&mut self, n: usize);
    /// Close the handle and every native connection it owns.
    fn close(&mut self) -> Result<()>;
}

/// A prepared statement.
pub trait Statement: Send {
    fn execute(&mut self, params: &[Value]) -> Result<u64>;
    fn query(&mut self, params: &[Value]) -> Result<Rows>;
}

/// An open transaction. Dropping it without commit is a driver-defined rollback.
pub trait Transaction: Send {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows>;
    fn commit(self: Box<Self>) -> Result<()>;
    fn rollback(self: Box<Self>) -> Result<()>;
}
