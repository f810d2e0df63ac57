//! Process-wide entry point: driver registration and `open`.
//!
//! ```text
//! open(driver, dsn, None)      → Driver::open(dsn, None) → unmanaged handle
//! open(driver, dsn, Some(ctx)) → shared ConnectionPoolManager::open(ctx)
//! ```

use std::sync::{Arc, OnceLock};

use crate::conn::SandboxedDb;
use crate::context::RequestContext;
use crate::dial;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::factory::ConnectionFactory;
use crate::manager::ConnectionPoolManager;
use crate::pool::PoolStats;
use crate::registry::DriverRegistry;
use crate::transport::SocketApi;

/// Driver registry plus the one shared pool manager.
///
/// The manager is created by the first managed `open` and stays bound to
/// that call's driver and data source.
#[derive(Debug, Default)]
pub struct Sandpool {
    registry: DriverRegistry,
    manager: OnceLock<ConnectionPoolManager>,
}

static GLOBAL: OnceLock<Sandpool> = OnceLock::new();

impl Sandpool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> &'static Sandpool {
        GLOBAL.get_or_init(Sandpool::new)
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn register_driver(&self, name: &str, driver: Arc<dyn Driver>) {
        self.registry.register_driver(name, driver);
    }

    /// Register sandbox dialing for `driver_name` with a connection ceiling.
    /// Non-positive `max_open_conns` fails without registering anything.
    pub fn register_dial(
        &self,
        driver_name: &str,
        max_open_conns: i64,
        sockets: Arc<dyn SocketApi>,
    ) -> Result<()> {
        let dialer = dial::register_dial(max_open_conns, sockets)?;
        self.registry.register_dial(driver_name, dialer);
        Ok(())
    }

    /// Open a database handle.
    ///
    /// Without a context the shared pool is never touched and the handle
    /// closes for real. With one, the handle is checked out of the shared
    /// pool and `close` returns it there.
    pub async fn open(
        &self,
        driver_name: &str,
        data_source: &str,
        ctx: Option<&RequestContext>,
    ) -> Result<SandboxedDb> {
        let driver = self.registry.driver(driver_name)?;

        let Some(ctx) = ctx else {
            let db = driver.open(data_source, None)?;
            tracing::debug!(driver = %driver_name, "opened unmanaged handle");
            return Ok(SandboxedDb::unmanaged(db));
        };

        self.manager_for(driver_name, driver, data_source)?
            .open(ctx)
            .await
    }

    /// Tear down the shared pool, if one was created.
    pub fn destroy(&self) -> usize {
        self.manager.get().map_or(0, ConnectionPoolManager::destroy)
    }

    pub fn stats(&self) -> Option<PoolStats> {
        self.manager.get().map(ConnectionPoolManager::stats)
    }

    /// Id of the shared pool, once the first managed `open` created it.
    pub fn pool_id(&self) -> Option<u64> {
        self.manager.get().and_then(ConnectionPoolManager::pool_id)
    }

    fn manager_for(
        &self,
        driver_name: &str,
        driver: Arc<dyn Driver>,
        data_source: &str,
    ) -> Result<&ConnectionPoolManager> {
        let manager = match self.manager.get() {
            Some(manager) => manager,
            None => {
                let dialer = self.registry.dialer(driver_name)?;
                self.manager.get_or_init(|| {
                    ConnectionPoolManager::new(ConnectionFactory::new(
                        driver_name,
                        driver,
                        data_source,
                        dialer,
                    ))
                })
            }
        };

        let factory = manager.factory();
        if factory.driver_name() != driver_name || factory.data_source() != data_source {
            return Err(Error::PoolMismatch {
                bound: format!("{} ({})", factory.driver_name(), factory.data_source()),
                requested: format!("{driver_name} ({data_source})"),
            });
        }
        Ok(manager)
    }
}

// ── Process-wide shortcuts ───────────────────────────────────────────

/// Register `driver` under `name` on the process-wide instance.
pub fn register_driver(name: &str, driver: Arc<dyn Driver>) {
    Sandpool::global().register_driver(name, driver);
}

/// Enable pooled, sandbox-dialed connections for `driver_name` on the
/// process-wide instance.
pub fn register_dial(
    driver_name: &str,
    max_open_conns: i64,
    sockets: Arc<dyn SocketApi>,
) -> Result<()> {
    Sandpool::global().register_dial(driver_name, max_open_conns, sockets)
}

/// [`Sandpool::open`] on the process-wide instance.
pub async fn open(
    driver_name: &str,
    data_source: &str,
    ctx: Option<&RequestContext>,
) -> Result<SandboxedDb> {
    Sandpool::global().open(driver_name, data_source, ctx).await
}

/// [`Sandpool::destroy`] on the process-wide instance.
pub fn destroy() -> usize {
    Sandpool::global().destroy()
}
