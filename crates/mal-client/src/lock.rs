//! Per-resource locking for the shared transport handle.
//!
//! The transport handle is shared by every request. Its sub-state (cookies,
//! DNS cache, TLS sessions, connection pool) is guarded per kind, so two
//! requests touching disjoint kinds run in parallel.
//!
//! [`LockBridge::on_lock`] and [`LockBridge::on_unlock`] are separate calls,
//! the shape a transport callback needs, so each kind is a binary semaphore
//! rather than a scoped mutex guard. Rust callers use [`LockBridge::acquire`],
//! which takes a set of kinds in a fixed order and releases them on drop.

use crate::error::{ClientError, Result};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::{trace, warn};

/// Category of shared transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The share handle itself
    Share,
    Cookie,
    Dns,
    SslSession,
    /// Connection pool
    Connect,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Share,
        ResourceKind::Cookie,
        ResourceKind::Dns,
        ResourceKind::SslSession,
        ResourceKind::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Share => "share",
            ResourceKind::Cookie => "cookie",
            ResourceKind::Dns => "dns",
            ResourceKind::SslSession => "ssl_session",
            ResourceKind::Connect => "connect",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock that can be released from a different call than the one that took it
#[derive(Debug, Default)]
struct KindLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl KindLock {
    fn lock(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    /// Returns false if the lock was not held
    fn unlock(&self) -> bool {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        let was_locked = std::mem::replace(&mut *locked, false);
        drop(locked);
        self.released.notify_one();
        was_locked
    }

    fn is_locked(&self) -> bool {
        *self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed table of per-kind locks, built once with the client
///
/// Locks are not reentrant: a caller holding a kind must release it before
/// taking it again.
#[derive(Debug)]
pub struct LockBridge {
    locks: HashMap<ResourceKind, KindLock>,
}

impl Default for LockBridge {
    fn default() -> Self {
        Self::new(&ResourceKind::ALL)
    }
}

impl LockBridge {
    /// Register a lock for each kind
    pub fn new(kinds: &[ResourceKind]) -> Self {
        let locks = kinds.iter().map(|&kind| (kind, KindLock::default())).collect();
        Self { locks }
    }

    fn lookup(&self, kind: ResourceKind) -> Result<&KindLock> {
        self.locks
            .get(&kind)
            .ok_or(ClientError::UnregisteredLock(kind))
    }

    /// Transport callback: block until `kind` is free, then take it
    ///
    /// # Panics
    ///
    /// If `kind` was not registered. The table must cover every kind the
    /// transport can ask for.
    pub fn on_lock(&self, kind: ResourceKind) {
        match self.lookup(kind) {
            Ok(lock) => {
                trace!(kind = %kind, "Lock");
                lock.lock();
            }
            Err(e) => panic!("{e}"),
        }
    }

    /// Transport callback: release `kind`
    ///
    /// # Panics
    ///
    /// If `kind` was not registered.
    pub fn on_unlock(&self, kind: ResourceKind) {
        match self.lookup(kind) {
            Ok(lock) => {
                trace!(kind = %kind, "Unlock");
                if !lock.unlock() {
                    warn!(kind = %kind, "Released a lock that was not held");
                }
            }
            Err(e) => panic!("{e}"),
        }
    }

    /// Take every kind in `kinds`, in a fixed global order
    ///
    /// Fails without taking anything if a kind is not registered.
    pub fn acquire(&self, kinds: &[ResourceKind]) -> Result<HeldLocks<'_>> {
        let mut ordered = kinds.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        for &kind in &ordered {
            self.lookup(kind)?;
        }
        for &kind in &ordered {
            self.on_lock(kind);
        }

        Ok(HeldLocks {
            bridge: self,
            kinds: ordered,
        })
    }

    /// Whether `kind` is currently held by someone
    pub fn is_locked(&self, kind: ResourceKind) -> Result<bool> {
        Ok(self.lookup(kind)?.is_locked())
    }
}

/// Kinds held through [`LockBridge::acquire`]; released in reverse order on drop
#[derive(Debug)]
pub struct HeldLocks<'a> {
    bridge: &'a LockBridge,
    kinds: Vec<ResourceKind>,
}

impl HeldLocks<'_> {
    pub fn kinds(&self) -> &[ResourceKind] {
        &self.kinds
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        for &kind in self.kinds.iter().rev() {
            self.bridge.on_unlock(kind);
        }
    }
}
