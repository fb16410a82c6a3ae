//! Resource pool module
//!
//! Bounded pool of reusable, non-thread-safe helper instances (digest
//! accumulators and the like) shared between worker tasks.
//!
//! # Design
//!
//! - Instances are handed out as scoped [`Lease`]s and go back to the pool on drop
//! - An empty pool never blocks: a fresh instance is built by the factory
//! - Capacity bounds check-in only; surplus instances are discarded
//! - Instances are reset before re-entering the pool; a failed reset discards them
//!
//! # Example
//!
//! ```
//! use multipart_uploadr::pool::ResourcePool;
//!
//! let pool = ResourcePool::new(4, Vec::<u8>::new).with_reset(|buf| {
//!     buf.clear();
//!     Ok(())
//! });
//!
//! {
//!     let mut buf = pool.lease();
//!     buf.extend_from_slice(b"scratch");
//! } // reset and returned here
//!
//! assert_eq!(pool.idle_count(), 1);
//! assert!(pool.lease().is_empty());
//! ```

pub mod digest;

pub use digest::{Checksum, ChecksumAlgorithm, DigestPool, PartDigest};

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Error raised by a pool's reset function
///
/// Never propagated to the lease holder; the instance is dropped instead.
#[derive(Error, Debug)]
#[error("reset failed: {0}")]
pub struct ResetError(pub String);

impl ResetError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) -> Result<(), ResetError> + Send + Sync>;

/// Pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances built by the factory
    pub created: u64,
    /// Acquisitions served from the idle queue
    pub reused: u64,
    /// Instances dropped on release (failed reset or pool full)
    pub discarded: u64,
    /// Instances currently idle in the pool
    pub idle: usize,
}

struct Inner<T> {
    idle: Vec<T>,
    stats: PoolStats,
}

/// Bounded pool of reusable instances
///
/// # Thread Safety
///
/// The idle queue sits behind a single mutex that is never held while the
/// factory or reset function runs, so a slow reset on one worker does not
/// stall acquisitions on others.
pub struct ResourcePool<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    factory: Factory<T>,
    reset: Option<Reset<T>>,
}

impl<T> ResourcePool<T> {
    /// Create a pool retaining at most `capacity` idle instances
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Mutex::new(Inner {
                idle: Vec::with_capacity(capacity),
                stats: PoolStats::default(),
            }),
            capacity,
            factory: Box::new(factory),
            reset: None,
        }
    }

    /// Install the reset function run on every release
    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) -> Result<(), ResetError> + Send + Sync + 'static,
    {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Maximum number of idle instances retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of instances currently idle
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            idle: inner.idle.len(),
            ..inner.stats
        }
    }

    /// Take an idle instance, or build a new one when the pool is empty
    pub fn acquire(&self) -> T {
        {
            let mut inner = self.inner.lock();
            if let Some(value) = inner.idle.pop() {
                inner.stats.reused += 1;
                return value;
            }
        }

        // factory runs unlocked; only counted once it has produced a value
        let value = (self.factory)();
        self.inner.lock().stats.created += 1;
        value
    }

    /// Reset an instance and return it to the pool
    ///
    /// The instance is discarded when the reset fails (or panics) or when the
    /// pool already holds `capacity` idle instances.
    pub fn release(&self, mut value: T) {
        if let Some(reset) = &self.reset {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| reset(&mut value)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("reset panicked".to_string()),
            };
            if let Some(reason) = failure {
                tracing::warn!(error = %reason, "Discarding pooled instance after failed reset");
                self.inner.lock().stats.discarded += 1;
                return;
            }
        }

        let mut inner = self.inner.lock();
        if inner.idle.len() < self.capacity {
            inner.idle.push(value);
        } else {
            inner.stats.discarded += 1;
        }
    }

    /// Lease an instance; it is released when the lease is dropped
    pub fn lease(&self) -> Lease<'_, T> {
        Lease {
            pool: self,
            value: Some(self.acquire()),
        }
    }

    /// Run `action` with a leased instance and release it afterwards
    ///
    /// The release also happens when `action` panics.
    pub fn with_lease<R>(&self, action: impl FnOnce(&mut T) -> R) -> R {
        let mut lease = self.lease();
        action(&mut lease)
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive, scoped checkout of one pooled instance
///
/// Dereferences to the instance. Accessing a lease through `Deref` after an
/// explicit [`Lease::release`] panics; use [`Lease::get`] to check first.
pub struct Lease<'a, T> {
    pool: &'a ResourcePool<T>,
    value: Option<T>,
}

impl<T> Lease<'_, T> {
    /// Return the instance to the pool now. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }

    /// Whether the instance has already gone back to the pool
    pub fn is_released(&self) -> bool {
        self.value.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("lease already released")
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("lease already released")
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}
