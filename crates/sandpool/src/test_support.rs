//! Mock sandbox sockets and a lazy mock driver shared by unit tests.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::RequestContext;
use crate::dial::DialFn;
use crate::driver::{Database, Driver, Rows, Statement, Transaction, Value};
use crate::error::{Error, Result};
use crate::transport::{SandboxSocket, SocketApi, Transport};

// ── Sockets ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSockets {
    pub dials: AtomicUsize,
    pub live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    pub refuse: AtomicBool,
    pub dialed_for: Mutex<Vec<String>>,
}

impl MockSockets {
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl SocketApi for MockSockets {
    fn dial(
        &self,
        ctx: &RequestContext,
        _network: &str,
        _addr: &str,
    ) -> io::Result<Box<dyn SandboxSocket>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "sandbox refused dial"));
        }
        self.dials.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.dialed_for
            .lock()
            .unwrap()
            .push(ctx.request_id().to_string());
        Ok(Box::new(MockSocket {
            live: Arc::clone(&self.live),
            open: true,
            written: Vec::new(),
        }))
    }
}

#[derive(Debug)]
pub struct MockSocket {
    live: Arc<AtomicUsize>,
    open: bool,
    written: Vec<u8>,
}

impl MockSocket {
    fn terminate(&mut self) {
        if self.open {
            self.open = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Read for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.written.len());
        buf[..n].copy_from_slice(&self.written[..n]);
        self.written.drain(..n);
        Ok(n)
    }
}

impl Write for MockSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SandboxSocket for MockSocket {
    fn set_context(&mut self, ctx: &RequestContext) -> io::Result<()> {
        if ctx.remaining().is_some_and(|left| left.is_zero()) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "request deadline exceeded"));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.terminate();
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// Observable state of one opened mock handle.
#[derive(Debug, Default)]
pub struct DbState {
    pub max_open: AtomicUsize,
    pub max_idle: AtomicUsize,
    pub closed: AtomicBool,
    pub pings: AtomicUsize,
    pub native_connects: AtomicUsize,
}

#[derive(Default)]
pub struct MockDriver {
    pub fail_open: AtomicBool,
    /// The next N pings, on any handle, fail.
    pub fail_pings: AtomicUsize,
    /// Connect lazily without using the dial hook.
    pub skip_dial: AtomicBool,
    pub opened: Mutex<Vec<Arc<DbState>>>,
}

impl MockDriver {
    pub fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last(&self) -> Arc<DbState> {
        Arc::clone(self.opened.lock().unwrap().last().unwrap())
    }

    pub fn fail_next_pings(&self, n: usize) {
        self.fail_pings.store(n, Ordering::SeqCst);
    }
}

impl Driver for Arc<MockDriver> {
    fn open(&self, data_source: &str, dial: Option<DialFn>) -> Result<Box<dyn Database>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Open(format!("bad data source: {data_source}")));
        }
        let state = Arc::new(DbState::default());
        self.opened.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(MockDb {
            driver: Arc::clone(self),
            addr: data_source.to_string(),
            dial,
            transport: None,
            native: false,
            state,
        }))
    }
}

pub struct MockDb {
    driver: Arc<MockDriver>,
    addr: String,
    dial: Option<DialFn>,
    transport: Option<Transport>,
    native: bool,
    state: Arc<DbState>,
}

impl MockDb {
    fn connect(&mut self) -> Result<()> {
        if self.transport.is_some() || self.native {
            return Ok(());
        }
        match &self.dial {
            Some(dial) if !self.driver.skip_dial.load(Ordering::SeqCst) => {
                self.transport = Some(dial(&self.addr)?);
            }
            _ => {
                self.native = true;
                self.state.native_connects.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(Error::Driver("sql: database is closed".to_string()));
        }
        Ok(())
    }
}

impl Database for MockDb {
    fn ping(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.connect()?;
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        let forced = self
            .driver
            .fail_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(Error::Ping("driver: bad connection".to_string()));
        }
        if self.transport.as_ref().is_some_and(Transport::is_closed) {
            return Err(Error::Ping("broken pipe".to_string()));
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        self.connect()?;
        if let Some(transport) = self.transport.as_mut() {
            transport.write_all(sql.as_bytes())?;
        }
        Ok(1)
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Rows> {
        self.ensure_open()?;
        self.connect()?;
        Ok(Rows {
            columns: vec!["sql".to_string()],
            rows: vec![vec![Value::Text(sql.to_string())]],
        })
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>> {
        self.ensure_open()?;
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
        }))
    }

    fn begin(&mut self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        Ok(Box::new(MockTransaction))
    }

    fn set_max_open_conns(&mut self, n: usize) {
        self.state.max_open.store(n, Ordering::SeqCst);
    }

    fn set_max_idle_conns(&mut self, n: usize) {
        self.state.max_idle.store(n, Ordering::SeqCst);
    }

    fn close(&mut self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Driver("sql: database is closed".to_string()));
        }
        if let Some(transport) = self.transport.take() {
            transport.close()?;
        }
        Ok(())
    }
}

struct MockStatement {
    sql: String,
}

impl Statement for MockStatement {
    fn execute(&mut self, params: &[Value]) -> Result<u64> {
        Ok(params.len() as u64)
    }

    fn query(&mut self, params: &[Value]) -> Result<Rows> {
        Ok(Rows {
            columns: vec!["sql".to_string()],
            rows: vec![
                std::iter::once(Value::Text(self.sql.clone()))
                    .chain(params.iter().cloned())
                    .collect(),
            ],
        })
    }
}

struct MockTransaction;

impl Transaction for MockTransaction {
    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<u64> {
        Ok(1)
    }

    fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<Rows> {
        Ok(Rows::default())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
