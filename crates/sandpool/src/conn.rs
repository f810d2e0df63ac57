//! The database handle returned to callers.
//!
//! A [`SandboxedDb`] is either
//!
//! - **unmanaged**: a plain driver handle; `close` terminates it, or
//! - **pooled**: a driver handle restricted to one native connection plus
//!   the sandbox [`Transport`] that connection runs on. While checked out it
//!   carries a [`Membership`] token and `close` hands it back to the pool
//!   instead of terminating anything.

use crate::context::RequestContext;
use crate::driver::{Database, Rows, Statement, Transaction, Value};
use crate::error::{Error, Result};
use crate::pool::{Member, Membership, Pingable};
use crate::transport::Transport;

pub struct SandboxedDb {
    db: Option<Box<dyn Database>>,
    transport: Option<Transport>,
    membership: Option<Membership<SandboxedDb>>,
}

impl std::fmt::Debug for SandboxedDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxedDb")
            .field("open", &self.db.is_some())
            .field("transport", &self.transport)
            .field("membership", &self.membership)
            .finish()
    }
}

impl SandboxedDb {
    /// A handle that owns its connections outright.
    pub(crate) fn unmanaged(db: Box<dyn Database>) -> Self {
        Self {
            db: Some(db),
            transport: None,
            membership: None,
        }
    }

    /// A factory-built pool member, not yet checked out.
    pub(crate) fn pool_member(db: Box<dyn Database>, transport: Transport) -> Self {
        Self {
            db: Some(db),
            transport: Some(transport),
            membership: None,
        }
    }

    /// True while the handle is checked out of a pool.
    pub fn is_managed(&self) -> bool {
        self.membership.is_some()
    }

    /// True for pool members, checked out or not.
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// The sandbox transport this handle runs on. `None` for unmanaged handles.
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    /// Pool-local id of the member, while checked out.
    pub fn member_id(&self) -> Option<u64> {
        self.membership.as_ref().map(Membership::member_id)
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_none()
    }

    fn db(&mut self) -> Result<&mut (dyn Database + 'static)> {
        self.db.as_deref_mut().ok_or(Error::Closed)
    }

    pub fn ping(&mut self) -> Result<()> {
        self.db()?.ping()
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.db()?.execute(sql, params)
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.db()?.query(sql, params)
    }

    pub fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>> {
        self.db()?.prepare(sql)
    }

    pub fn begin(&mut self) -> Result<Box<dyn Transaction>> {
        self.db()?.begin()
    }

    /// Ignored for pooled handles, which must stay on exactly one connection.
    pub fn set_max_idle_conns(&mut self, n: usize) {
        if self.transport.is_none() {
            if let Some(db) = self.db.as_deref_mut() {
                db.set_max_idle_conns(n);
            }
        }
    }

    /// Ignored for pooled handles, which must stay on exactly one connection.
    pub fn set_max_open_conns(&mut self, n: usize) {
        if self.transport.is_none() {
            if let Some(db) = self.db.as_deref_mut() {
                db.set_max_open_conns(n);
            }
        }
    }

    /// Close the handle.
    ///
    /// Unmanaged: closes the driver handle and returns its error, if any.
    /// Checked out: returns the connection to the pool with its transport
    /// intact and always succeeds. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return match self.db.take() {
                Some(mut db) => db.close(),
                None => Ok(()),
            };
        }

        // The token is cleared before it is used, so the member that goes
        // back to the pool never references its own membership.
        if let Some(membership) = self.membership.take() {
            let member = SandboxedDb {
                db: self.db.take(),
                transport: self.transport.take(),
                membership: None,
            };
            membership.release(member);
        }
        Ok(())
    }

    /// Tear down the whole pool this handle was checked out of.
    ///
    /// Idle members are terminated right away; this handle and other
    /// checked-out ones are terminated when closed. Inert for unmanaged
    /// handles.
    pub fn destroy(&mut self) -> Result<()> {
        if let Some(pool) = self.membership.as_ref().and_then(Membership::pool) {
            pool.close();
        }
        Ok(())
    }

    /// Bind the transport to `ctx`. Inert for unmanaged handles.
    pub(crate) fn rebind_context(&mut self, ctx: &RequestContext) -> Result<()> {
        if let Some(transport) = &self.transport {
            transport.set_context(ctx)?;
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self, membership: Membership<SandboxedDb>) {
        self.membership = Some(membership);
    }
}

impl Pingable for SandboxedDb {
    fn ping(&mut self) -> Result<()> {
        SandboxedDb::ping(self)
    }
}

impl Member for SandboxedDb {
    fn terminate(&mut self) {
        if let Some(mut db) = self.db.take() {
            if let Err(e) = db.close() {
                tracing::debug!(error = %e, "closing pooled database handle failed");
            }
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                tracing::debug!(transport = transport.id(), error = %e, "closing transport failed");
            }
        }
    }
}

impl Drop for SandboxedDb {
    fn drop(&mut self) {
        if self.membership.is_some() {
            let _ = self.close();
        }
    }
}
