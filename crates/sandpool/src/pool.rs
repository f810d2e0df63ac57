//! Bounded pool of reusable members.
//!
//! A [`Pool`] never holds more than `capacity` live members, counting both
//! idle ones and ones checked out. A checkout hands back the member together
//! with a [`Membership`] token. The token holds only a weak reference to the
//! pool, so a checked-out member that keeps its token does not keep the pool
//! alive, and idle members hold no token at all.
//!
//! ```text
//! get(make)
//!   → acquire permit (waits while `capacity` members are out)
//!     → idle member available → reuse
//!     → none idle             → make() → new member
//!   → (member, Membership)
//!
//! Membership::release(member) → back onto the idle list, permit returned
//! Membership::mark_unusable() → member forgotten, permit returned
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Liveness probe capability.
pub trait Pingable {
    fn ping(&mut self) -> Result<()>;
}

/// A value the pool can own.
pub trait Member: Pingable + Send + 'static {
    /// Tear down the member's resources. Called when it leaves the pool for good.
    fn terminate(&mut self);
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

struct IdleMember<M> {
    id: u64,
    member: M,
    since: Instant,
}

struct PoolState<M> {
    idle: Vec<IdleMember<M>>,
    /// Live members, idle + checked out.
    total: usize,
    checked_out: usize,
    created: u64,
    evicted: u64,
    next_member_id: u64,
}

struct Shared<M> {
    id: u64,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
    state: Mutex<PoolState<M>>,
}

impl<M> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, PoolState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Account for a checked-out member that was torn down for good.
    fn evict_checked_out(&self) {
        let mut state = self.lock();
        state.checked_out = state.checked_out.saturating_sub(1);
        state.total = state.total.saturating_sub(1);
        state.evicted += 1;
    }
}

/// Point-in-time pool counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Members currently checked out.
    pub active: usize,
    /// Members sitting idle.
    pub idle: usize,
    /// Live members (active + idle).
    pub total: usize,
    /// Members built by the factory over the pool's lifetime.
    pub created: u64,
    /// Members evicted after failing a probe.
    pub evicted: u64,
}

/// A bounded pool of `M`.
pub struct Pool<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.shared.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<M: Member> Pool<M> {
    /// Create an empty pool. Members are built on demand, never pre-warmed.
    pub fn new(capacity: usize) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(pool_id = id, capacity, "created connection pool");
        Self {
            shared: Arc::new(Shared {
                id,
                capacity,
                semaphore: Arc::new(Semaphore::new(capacity)),
                closed: AtomicBool::new(false),
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                    checked_out: 0,
                    created: 0,
                    evicted: 0,
                    next_member_id: 1,
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Check out a member, building one with `make` when none is idle.
    ///
    /// Waits without a timeout while the pool is at capacity. Fails with
    /// [`Error::PoolClosed`] once the pool is closed, including for callers
    /// already waiting. A failed `make` gives its slot back.
    pub async fn get<F>(&self, make: F) -> Result<(M, Membership<M>)>
    where
        F: FnOnce() -> Result<M>,
    {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let permit = Arc::clone(&self.shared.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        let reused = {
            let mut state = self.shared.lock();
            let idle = state.idle.pop();
            if idle.is_some() {
                state.checked_out += 1;
            }
            idle
        };

        if let Some(idle) = reused {
            tracing::debug!(
                pool_id = self.shared.id,
                member_id = idle.id,
                idle_for = ?idle.since.elapsed(),
                "reused idle pool member"
            );
            return Ok((idle.member, self.membership(idle.id, permit)));
        }

        let mut member = match make() {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(pool_id = self.shared.id, error = %e, "pool member factory failed");
                return Err(e);
            }
        };

        let member_id = {
            let mut state = self.shared.lock();
            if self.is_closed() {
                None
            } else {
                let id = state.next_member_id;
                state.next_member_id += 1;
                state.total += 1;
                state.checked_out += 1;
                state.created += 1;
                Some(id)
            }
        };

        let Some(member_id) = member_id else {
            member.terminate();
            return Err(Error::PoolClosed);
        };

        tracing::debug!(pool_id = self.shared.id, member_id, "created pool member");
        Ok((member, self.membership(member_id, permit)))
    }

    /// Close the pool: wake and fail all waiters, reject future checkouts
    /// and terminate every idle member. Checked-out members are terminated
    /// when they are released. Returns the number of idle members closed.
    pub fn close(&self) -> usize {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.shared.semaphore.close();

        let drained: Vec<IdleMember<M>> = {
            let mut state = self.shared.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            drained
        };

        let closed = drained.len();
        for mut idle in drained {
            idle.member.terminate();
        }

        tracing::info!(pool_id = self.shared.id, closed, "connection pool closed");
        closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            capacity: self.shared.capacity,
            active: state.checked_out,
            idle: state.idle.len(),
            total: state.total,
            created: state.created,
            evicted: state.evicted,
        }
    }

    fn membership(&self, member_id: u64, permit: OwnedSemaphorePermit) -> Membership<M> {
        Membership {
            pool: Arc::downgrade(&self.shared),
            pool_id: self.shared.id,
            member_id,
            permit: Some(permit),
        }
    }
}

/// Proof that a member is checked out of a pool, and the means to give it back.
///
/// Exactly one of [`release`](Self::release) or
/// [`mark_unusable`](Self::mark_unusable) should consume the token. A token
/// dropped without either leaves its slot occupied for the life of the pool:
/// the member may still be alive, so the slot cannot be handed to a new one.
pub struct Membership<M> {
    pool: Weak<Shared<M>>,
    pool_id: u64,
    member_id: u64,
    permit: Option<OwnedSemaphorePermit>,
}

impl<M> std::fmt::Debug for Membership<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("pool_id", &self.pool_id)
            .field("member_id", &self.member_id)
            .finish()
    }
}

impl<M: Member> Membership<M> {
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    pub fn member_id(&self) -> u64 {
        self.member_id
    }

    /// The pool this member belongs to, if it still exists.
    pub fn pool(&self) -> Option<Pool<M>> {
        self.pool.upgrade().map(|shared| Pool { shared })
    }

    /// Return `member` to the idle list so a later checkout reuses it.
    ///
    /// If the pool has been closed or dropped the member is terminated instead.
    pub fn release(mut self, mut member: M) {
        let permit = self.permit.take();

        let Some(shared) = self.pool.upgrade() else {
            member.terminate();
            return;
        };

        let rejected = {
            let mut state = shared.lock();
            state.checked_out = state.checked_out.saturating_sub(1);
            if shared.closed.load(Ordering::Acquire) {
                state.total = state.total.saturating_sub(1);
                Some(member)
            } else {
                state.idle.push(IdleMember {
                    id: self.member_id,
                    member,
                    since: Instant::now(),
                });
                tracing::debug!(
                    pool_id = self.pool_id,
                    member_id = self.member_id,
                    idle = state.idle.len(),
                    "returned member to pool"
                );
                None
            }
        };

        // Idle list first, then the permit, so the next waiter finds the member.
        drop(permit);

        if let Some(mut member) = rejected {
            tracing::debug!(
                pool_id = self.pool_id,
                member_id = self.member_id,
                "pool closed, terminating released member"
            );
            member.terminate();
        }
    }

    /// Evict the member: it is never returned and its slot is freed for a
    /// freshly built replacement. The caller tears the member down.
    pub fn mark_unusable(mut self) {
        let permit = self.permit.take();
        if let Some(shared) = self.pool.upgrade() {
            shared.evict_checked_out();
        }
        tracing::warn!(
            pool_id = self.pool_id,
            member_id = self.member_id,
            "evicted pool member"
        );
        drop(permit);
    }
}

impl<M> Drop for Membership<M> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            permit.forget();
            tracing::warn!(
                pool_id = self.pool_id,
                member_id = self.member_id,
                "membership dropped without release, slot stays occupied"
            );
        }
    }
}
