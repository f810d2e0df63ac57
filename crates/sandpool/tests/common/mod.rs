//! Shared fixtures: an in-memory sandbox socket API and a line-echo driver
//! that speaks to whatever transport it is given.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use sandpool::{
    Database, DialFn, Driver, Error, RequestContext, Result, Rows, SandboxSocket, SocketApi,
    Statement, Transaction, Transport, Value,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output. Controlled by `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── In-memory sandbox ───────────────────────────────────────────────

/// Counts dials and tracks how many sockets are alive at once.
#[derive(Default)]
pub struct EchoSockets {
    dials: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    pub refuse: AtomicBool,
}

impl EchoSockets {
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

impl SocketApi for EchoSockets {
    fn dial(
        &self,
        ctx: &RequestContext,
        _network: &str,
        _addr: &str,
    ) -> io::Result<Box<dyn SandboxSocket>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        if ctx.remaining().is_some_and(|left| left.is_zero()) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }
        self.dials.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(EchoSocket {
            buf: VecDeque::new(),
            live: Some(Arc::clone(&self.live)),
        }))
    }
}

/// Reads back whatever was written to it.
#[derive(Debug)]
pub struct EchoSocket {
    buf: VecDeque<u8>,
    live: Option<Arc<AtomicUsize>>,
}

impl EchoSocket {
    /// A socket not counted by any [`EchoSockets`].
    pub fn detached() -> Self {
        Self {
            buf: VecDeque::new(),
            live: None,
        }
    }

    fn hang_up(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Read for EchoSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buf.read(buf)
    }
}

impl Write for EchoSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SandboxSocket for EchoSocket {
    fn set_context(&mut self, ctx: &RequestContext) -> io::Result<()> {
        if ctx.remaining().is_some_and(|left| left.is_zero()) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.hang_up();
        Ok(())
    }
}

impl Drop for EchoSocket {
    fn drop(&mut self) {
        self.hang_up();
    }
}

// ── Echo driver ─────────────────────────────────────────────────────

/// Driver whose every statement is a round trip: write the text, read the
/// same bytes back. Works against [`EchoSockets`] and a TCP echo server.
/// Clones share their counters.
#[derive(Clone, Default)]
pub struct EchoDriver {
    state: Arc<EchoDriverState>,
}

#[derive(Default)]
struct EchoDriverState {
    /// The next N pings, on any handle, fail.
    fail_pings: AtomicUsize,
    opened: AtomicUsize,
    native_connects: AtomicUsize,
}

impl EchoDriver {
    pub fn fail_next_pings(&self, n: usize) {
        self.state.fail_pings.store(n, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn native_connects(&self) -> usize {
        self.state.native_connects.load(Ordering::SeqCst)
    }
}

impl Driver for EchoDriver {
    fn open(&self, data_source: &str, dial: Option<DialFn>) -> Result<Box<dyn Database>> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoDb {
            driver: self.clone(),
            addr: data_source.to_string(),
            dial,
            conn: None,
            closed: false,
        }))
    }
}

pub struct EchoDb {
    driver: EchoDriver,
    addr: String,
    dial: Option<DialFn>,
    conn: Option<Transport>,
    closed: bool,
}

impl EchoDb {
    fn conn(&mut self) -> Result<&mut Transport> {
        if self.closed {
            return Err(Error::Driver("sql: database is closed".to_string()));
        }
        if self.conn.is_none() {
            let transport = match &self.dial {
                Some(dial) => dial(&self.addr)?,
                None => {
                    self.driver.state.native_connects.fetch_add(1, Ordering::SeqCst);
                    Transport::new(
                        Box::new(EchoSocket::detached()),
                        &self.addr,
                        &RequestContext::new("native"),
                    )
                }
            };
            self.conn = Some(transport);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Driver("no connection".to_string()))
    }

    fn round_trip(&mut self, payload: &str) -> Result<String> {
        let conn = self.conn()?;
        conn.write_all(payload.as_bytes())?;
        conn.flush()?;
        let mut echoed = vec![0u8; payload.len()];
        conn.read_exact(&mut echoed)?;
        String::from_utf8(echoed).map_err(|e| Error::Driver(e.to_string()))
    }
}

impl Database for EchoDb {
    fn ping(&mut self) -> Result<()> {
        self.conn()?;
        let forced = self
            .driver
            .state
            .fail_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(Error::Ping("driver: bad connection".to_string()));
        }
        match self.round_trip("PING\n") {
            Ok(reply) if reply == "PING\n" => Ok(()),
            Ok(reply) => Err(Error::Ping(format!("unexpected reply: {reply:?}"))),
            Err(e) => Err(Error::Ping(e.to_string())),
        }
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.round_trip(sql)?;
        Ok(1)
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Rows> {
        let reply = self.round_trip(sql)?;
        Ok(Rows {
            columns: vec!["echo".to_string()],
            rows: vec![vec![Value::Text(reply)]],
        })
    }

    fn prepare(&mut self, _sql: &str) -> Result<Box<dyn Statement>> {
        Err(Error::Driver("prepared statements not supported".to_string()))
    }

    fn begin(&mut self) -> Result<Box<dyn Transaction>> {
        Err(Error::Driver("transactions not supported".to_string()))
    }

    fn set_max_open_conns(&mut self, _n: usize) {}

    fn set_max_idle_conns(&mut self, _n: usize) {}

    fn close(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Err(Error::Driver("sql: database is closed".to_string()));
        }
        if let Some(conn) = self.conn.take() {
            conn.close()?;
        }
        Ok(())
    }
}
