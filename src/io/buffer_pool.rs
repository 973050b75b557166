//! Leaky relay buffer pool
//!
//! A bounded, non-blocking pool of fixed-size byte buffers shared by every
//! relay session. Each copy direction borrows one buffer for its whole
//! lifetime and hands it back when the direction finishes.
//!
//! The pool is "leaky": a miss allocates a fresh buffer and a release into a
//! full pool drops the buffer, so neither side ever waits. The free list is a
//! `crossbeam_queue::ArrayQueue`, which keeps both operations lock-free.
//!
//! # Example
//!
//! ```
//! use redirsocks::io::BufferPool;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(BufferPool::new(4, 1024));
//!
//! let buf = pool.acquire();
//! assert_eq!(buf.len(), 1024);
//! pool.release(buf);
//! assert_eq!(pool.available(), 1);
//!
//! // RAII form: returned to the pool on drop
//! let guard = pool.get();
//! assert_eq!(guard.len(), 1024);
//! drop(guard);
//! assert_eq!(pool.stats().reuses(), 1);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

/// Default relay buffer size (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of buffers kept resident
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// Statistics for the buffer pool
#[derive(Debug, Default)]
pub struct BufferPoolStats {
    /// Number of new buffer allocations (pool was empty)
    allocations: AtomicU64,
    /// Number of buffer reuses from pool
    reuses: AtomicU64,
    /// Number of buffers returned to pool
    returns: AtomicU64,
    /// Number of buffers dropped (pool was full)
    drops: AtomicU64,
}

impl BufferPoolStats {
    /// Get the number of allocations
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Get the number of reuses
    #[must_use]
    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }

    /// Get the number of returns
    #[must_use]
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Get the number of drops
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all stats
    #[must_use]
    pub fn snapshot(&self) -> BufferPoolStatsSnapshot {
        BufferPoolStatsSnapshot {
            allocations: self.allocations(),
            reuses: self.reuses(),
            returns: self.returns(),
            drops: self.drops(),
        }
    }
}

/// Snapshot of buffer pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStatsSnapshot {
    /// Number of new buffer allocations
    pub allocations: u64,
    /// Number of buffer reuses
    pub reuses: u64,
    /// Number of buffers returned
    pub returns: u64,
    /// Number of buffers dropped (pool full)
    pub drops: u64,
}

impl BufferPoolStatsSnapshot {
    /// Get pool efficiency (reuses / (reuses + allocations))
    ///
    /// Returns 0.0 if no operations have occurred.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for efficiency ratio
    pub fn efficiency(&self) -> f64 {
        let total = self.reuses + self.allocations;
        if total == 0 {
            0.0
        } else {
            self.reuses as f64 / total as f64
        }
    }
}

/// A bounded, lock-free pool of fixed-size relay buffers.
#[derive(Debug)]
pub struct BufferPool {
    /// Free list
    buffers: ArrayQueue<Vec<u8>>,
    /// Length of every buffer handed out or accepted back
    buffer_size: usize,
    /// Pool statistics
    stats: BufferPoolStats,
}

impl BufferPool {
    /// Create a new pool keeping at most `capacity` buffers of `buffer_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(capacity),
            buffer_size,
            stats: BufferPoolStats::default(),
        }
    }

    /// Create a pool with default settings (128 buffers of 64 KiB)
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_BUFFER_SIZE)
    }

    /// Take a buffer from the pool, allocating one if the pool is empty.
    ///
    /// Never blocks. The returned buffer always has length `buffer_size`.
    /// Reused buffers keep whatever bytes they held last; callers only ever
    /// use the prefix they have just read into.
    #[must_use]
    pub fn acquire(&self) -> Vec<u8> {
        if let Some(buf) = self.buffers.pop() {
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            buf
        } else {
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            vec![0u8; self.buffer_size]
        }
    }

    /// Give a buffer back to the pool.
    ///
    /// Never blocks. If the pool already holds `capacity` buffers the buffer
    /// is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `buf.len()` differs from the pool's buffer size. That can
    /// only happen through a caller bug; release builds abort on panic.
    pub fn release(&self, buf: Vec<u8>) {
        assert!(
            buf.len() == self.buffer_size,
            "invalid buffer size released into pool: got {}, expected {}",
            buf.len(),
            self.buffer_size
        );

        match self.buffers.push(buf) {
            Ok(()) => {
                self.stats.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_buf) => {
                self.stats.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Borrow a buffer that is released automatically when dropped.
    #[must_use]
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        PooledBuffer {
            buffer: Some(self.acquire()),
            pool: Arc::clone(self),
        }
    }

    /// Pre-warm the pool by allocating buffers up front.
    pub fn prewarm(&self, count: usize) {
        for _ in 0..count {
            if self.buffers.push(vec![0u8; self.buffer_size]).is_err() {
                break;
            }
        }
    }

    /// Get the buffer size
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Get the pool capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffers.capacity()
    }

    /// Get the current number of resident buffers
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffers.len()
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// Returned to the pool when dropped, including when the owning task is
/// cancelled mid-copy.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buffer.take() {
            self.pool.release(buf);
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}
