//! Connection pool manager — lazy shared pool with validated checkouts.
//!
//! ```text
//! open(ctx)
//!   → pool created on first call (first caller wins)
//!   → Pool::get
//!       → idle member        → reuse (no dial)
//!       → headroom, no idle  → ConnectionFactory::build(ctx) → fresh dial
//!       → at capacity        → wait for a release
//!   → ping
//!       → ok   → rebind transport to ctx → attach membership → caller
//!       → fail → terminate member, evict it → Err (caller retries)
//! ```

use std::sync::OnceLock;

use crate::config::PoolConfig;
use crate::conn::SandboxedDb;
use crate::context::RequestContext;
use crate::error::Result;
use crate::factory::ConnectionFactory;
use crate::pool::{Member, Pool, PoolStats};

pub struct ConnectionPoolManager {
    factory: ConnectionFactory,
    config: PoolConfig,
    pool: OnceLock<Pool<SandboxedDb>>,
}

impl std::fmt::Debug for ConnectionPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolManager")
            .field("factory", &self.factory)
            .field("config", &self.config)
            .field("pool", &self.pool.get())
            .finish()
    }
}

impl ConnectionPoolManager {
    /// Create a manager. Capacity comes from the factory's registered dialer
    /// and is fixed for the life of the pool.
    pub fn new(factory: ConnectionFactory) -> Self {
        let config = *factory.dialer().pool_config();
        Self {
            factory,
            config,
            pool: OnceLock::new(),
        }
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The shared pool, created on first use.
    pub(crate) fn pool(&self) -> &Pool<SandboxedDb> {
        self.pool
            .get_or_init(|| Pool::new(self.config.max_open_conns))
    }

    /// Id of the shared pool, once it exists.
    pub fn pool_id(&self) -> Option<u64> {
        self.pool.get().map(Pool::id)
    }

    /// Check out a validated connection bound to `ctx`.
    ///
    /// Waits while the pool is at capacity. A member that fails its liveness
    /// probe is evicted and the probe error returned; the caller retries.
    pub async fn open(&self, ctx: &RequestContext) -> Result<SandboxedDb> {
        let pool = self.pool();
        let (mut db, membership) = pool.get(|| self.factory.build(ctx)).await?;

        if let Err(e) = db.ping() {
            tracing::warn!(
                pool_id = pool.id(),
                member_id = membership.member_id(),
                request_id = %ctx.request_id(),
                error = %e,
                "liveness probe failed, evicting member"
            );
            db.terminate();
            membership.mark_unusable();
            return Err(e);
        }

        if let Err(e) = db.rebind_context(ctx) {
            // The member is healthy; only this request's context is unusable.
            tracing::debug!(
                pool_id = pool.id(),
                member_id = membership.member_id(),
                request_id = %ctx.request_id(),
                error = %e,
                "context rebind failed, returning member"
            );
            membership.release(db);
            return Err(e);
        }

        tracing::debug!(
            pool_id = pool.id(),
            member_id = membership.member_id(),
            request_id = %ctx.request_id(),
            "checked out connection"
        );
        db.attach(membership);
        Ok(db)
    }

    /// Close the shared pool, terminating idle members. Checked-out members
    /// are terminated as they are closed, and later `open` calls fail with
    /// [`Error::PoolClosed`](crate::Error::PoolClosed).
    pub fn destroy(&self) -> usize {
        self.pool().close()
    }

    pub fn stats(&self) -> PoolStats {
        match self.pool.get() {
            Some(pool) => pool.stats(),
            None => PoolStats {
                capacity: self.config.max_open_conns,
                ..PoolStats::default()
            },
        }
    }
}
