//! Builds pool members: one driver handle pinned to one sandbox transport.

use std::sync::Arc;

use crate::conn::SandboxedDb;
use crate::context::RequestContext;
use crate::dial::SandboxDialer;
use crate::driver::Driver;
use crate::error::{Error, Result};

pub struct ConnectionFactory {
    driver: Arc<dyn Driver>,
    driver_name: String,
    data_source: String,
    dialer: SandboxDialer,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("driver", &self.driver_name)
            .field("dialer", &self.dialer)
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory {
    pub fn new(
        driver_name: &str,
        driver: Arc<dyn Driver>,
        data_source: &str,
        dialer: SandboxDialer,
    ) -> Self {
        Self {
            driver,
            driver_name: driver_name.to_string(),
            data_source: data_source.to_string(),
            dialer,
        }
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn dialer(&self) -> &SandboxDialer {
        &self.dialer
    }

    /// Build one ready-to-use pool member, dialing under `ctx`.
    ///
    /// The handle is limited to a single native connection because the pool,
    /// not the driver, does the pooling. A ping forces the otherwise lazy
    /// handle to dial right away so failures surface here.
    pub fn build(&self, ctx: &RequestContext) -> Result<SandboxedDb> {
        let dialer = self.dialer.bind(ctx);

        let mut db = self
            .driver
            .open(&self.data_source, Some(dialer.dial_fn()))?;
        db.set_max_open_conns(1);
        db.set_max_idle_conns(1);

        if let Err(e) = db.ping() {
            tracing::debug!(
                driver = %self.driver_name,
                request_id = %ctx.request_id(),
                error = %e,
                "initial ping failed"
            );
            if let Some(transport) = dialer.take_dialed() {
                let _ = transport.close();
            }
            let _ = db.close();
            return Err(e);
        }

        let Some(transport) = dialer.take_dialed() else {
            let _ = db.close();
            return Err(Error::NoTransport);
        };

        tracing::debug!(
            driver = %self.driver_name,
            transport = transport.id(),
            request_id = %ctx.request_id(),
            "built pooled connection"
        );
        Ok(SandboxedDb::pool_member(db, transport))
    }
}
