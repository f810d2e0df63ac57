//! Dial registration and per-request dial binding.
//!
//! Drivers dial with a callback that only receives an address, while the
//! sandbox insists on a request context. [`SandboxDialer::bind`] closes
//! that gap: every connection-factory invocation gets its own
//! [`ContextDialer`] that captures the caller's context and remembers the
//! transport it produced. Nothing is shared between concurrent dials, so no
//! lock is needed around the handoff.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::PoolConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::transport::{SocketApi, Transport};

/// Dial callback handed to a [`Driver`](crate::driver::Driver):
/// `address → (transport, error)`.
pub type DialFn = Arc<dyn Fn(&str) -> Result<Transport> + Send + Sync>;

/// Register sandbox dialing with a connection ceiling.
///
/// `max_open_conns` must be positive; anything else is a configuration
/// error raised before any pool exists. The returned dialer is meant to be
/// registered with a driver exactly once per process.
pub fn register_dial(max_open_conns: i64, sockets: Arc<dyn SocketApi>) -> Result<SandboxDialer> {
    let config = PoolConfig::new(max_open_conns)?;
    tracing::info!(max_open_conns = config.max_open_conns, "registered sandbox dial");
    Ok(SandboxDialer { sockets, config })
}

/// The registered sandbox dial capability plus its immutable capacity.
#[derive(Clone)]
pub struct SandboxDialer {
    sockets: Arc<dyn SocketApi>,
    config: PoolConfig,
}

impl std::fmt::Debug for SandboxDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxDialer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxDialer {
    /// Capacity configured at registration.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build a dialer scoped to one factory invocation under `ctx`.
    pub fn bind(&self, ctx: &RequestContext) -> ContextDialer {
        ContextDialer {
            sockets: Arc::clone(&self.sockets),
            ctx: ctx.clone(),
            dialed: Arc::new(Mutex::new(None)),
        }
    }
}

/// A dialer bound to a single request context.
#[derive(Clone)]
pub struct ContextDialer {
    sockets: Arc<dyn SocketApi>,
    ctx: RequestContext,
    dialed: Arc<Mutex<Option<Transport>>>,
}

impl ContextDialer {
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Dial `addr` through the sandbox under the bound context.
    ///
    /// On success the transport is also kept for [`take_dialed`](Self::take_dialed);
    /// on failure the slot is left empty.
    pub fn dial(&self, addr: &str) -> Result<Transport> {
        let mut slot = self.dialed.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;

        let socket = self
            .sockets
            .dial(&self.ctx, "tcp", addr)
            .map_err(|source| {
                tracing::debug!(
                    addr = %addr,
                    request_id = %self.ctx.request_id(),
                    error = %source,
                    "sandbox dial failed"
                );
                Error::Dial {
                    addr: addr.to_string(),
                    source,
                }
            })?;

        let transport = Transport::new(socket, addr, &self.ctx);
        tracing::debug!(
            transport = transport.id(),
            addr = %addr,
            request_id = %self.ctx.request_id(),
            "sandbox dial succeeded"
        );
        *slot = Some(transport.clone());
        Ok(transport)
    }

    /// The callback form of [`dial`](Self::dial) for drivers.
    pub fn dial_fn(&self) -> DialFn {
        let dialer = self.clone();
        Arc::new(move |addr: &str| dialer.dial(addr))
    }

    /// Take the transport produced by the last successful dial, if any.
    pub fn take_dialed(&self) -> Option<Transport> {
        self.dialed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
