//! Sandbox socket primitive and the shared transport handle built on it.
//!
//! Application code in the sandbox cannot open sockets itself. Instead it
//! asks a [`SocketApi`] to dial on behalf of a specific request. The socket
//! that comes back stays bound to that request's [`RequestContext`] until
//! [`SandboxSocket::set_context`] moves it to another one.
//!
//! # Architecture
//!
//! ```text
//! ContextDialer::dial(addr)
//!   → SocketApi::dial(ctx, "tcp", addr)      (sandbox-provided)
//!     → Box<dyn SandboxSocket>
//!       → Transport (shared handle)
//!           ├─ clone held by the driver   → Read / Write
//!           └─ clone held by SandboxedDb  → set_context / close
//! ```

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::context::RequestContext;

/// The sandbox's request-scoped socket-dial primitive.
pub trait SocketApi: Send + Sync {
    /// Dial `addr` over `network` on behalf of the request owning `ctx`.
    fn dial(
        &self,
        ctx: &RequestContext,
        network: &str,
        addr: &str,
    ) -> io::Result<Box<dyn SandboxSocket>>;
}

/// A raw duplex socket handed out by the sandbox.
pub trait SandboxSocket: Read + Write + Send + std::fmt::Debug {
    /// Rebind the socket to another request's context.
    fn set_context(&mut self, ctx: &RequestContext) -> io::Result<()>;
    /// Terminate the underlying connection.
    fn shutdown(&mut self) -> io::Result<()>;
}

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

struct TransportInner {
    id: u64,
    addr: String,
    socket: Mutex<Box<dyn SandboxSocket>>,
    context: Mutex<RequestContext>,
    closed: AtomicBool,
}

/// Shared handle to one sandbox socket.
///
/// Cloning is cheap; all clones refer to the same socket. The driver reads
/// and writes through its clone while the pooled wrapper keeps another to
/// rebind the context and to close the socket.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Transport {
    /// Wrap a freshly dialed socket. `ctx` is the context it was dialed under.
    pub fn new(socket: Box<dyn SandboxSocket>, addr: &str, ctx: &RequestContext) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
                addr: addr.to_string(),
                socket: Mutex::new(socket),
                context: Mutex::new(ctx.clone()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique id of the underlying socket.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The context the socket is currently bound to.
    pub fn context(&self) -> RequestContext {
        self.inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebind the socket to `ctx` so subsequent I/O is scoped to that request.
    pub fn set_context(&self, ctx: &RequestContext) -> io::Result<()> {
        self.ensure_open()?;
        self.socket().set_context(ctx)?;
        *self
            .inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ctx.clone();
        Ok(())
    }

    /// Terminate the socket. Closing twice is a no-op.
    pub fn close(&self) -> io::Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(transport = self.inner.id, addr = %self.inner.addr, "closing transport");
        self.socket().shutdown()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        Ok(())
    }

    fn socket(&self) -> MutexGuard<'_, Box<dyn SandboxSocket>> {
        self.inner
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.socket().read(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.socket().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        self.socket().flush()
    }
}

// ── TcpSocketApi ─────────────────────────────────────────────────────

/// A [`SocketApi`] backed by plain host TCP.
///
/// Stands in for the sandbox's broker during local development and tests.
/// Socket read/write timeouts follow the bound context's deadline.
#[derive(Clone, Debug)]
pub struct TcpSocketApi {
    connect_timeout: Duration,
}

impl TcpSocketApi {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpSocketApi {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl SocketApi for TcpSocketApi {
    fn dial(
        &self,
        ctx: &RequestContext,
        network: &str,
        addr: &str,
    ) -> io::Result<Box<dyn SandboxSocket>> {
        if network != "tcp" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported network: {network}"),
            ));
        }

        let sock_addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address found for {addr}"))
        })?;

        let timeout = match ctx.remaining() {
            Some(left) if left.is_zero() => return Err(deadline_exceeded()),
            Some(left) => left.min(self.connect_timeout),
            None => self.connect_timeout,
        };

        let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
        // Low latency matters more than throughput for request/response protocols.
        let _ = stream.set_nodelay(true);

        let mut socket = TcpSocket { stream };
        socket.set_context(ctx)?;

        tracing::debug!(
            addr = %addr,
            request_id = %ctx.request_id(),
            "dialed tcp socket"
        );
        Ok(Box::new(socket))
    }
}

/// Host TCP stream implementing [`SandboxSocket`].
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
}

impl Read for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SandboxSocket for TcpSocket {
    fn set_context(&mut self, ctx: &RequestContext) -> io::Result<()> {
        let timeout = match ctx.remaining() {
            Some(left) if left.is_zero() => return Err(deadline_exceeded()),
            other => other,
        };
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            // Peer already went away.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "request deadline exceeded")
}
