//! I/O utilities for redirsocks
//!
//! This module provides the shared relay buffer pool and the one-direction
//! copy strategies used by relay sessions.
//!
//! # Buffer Pool
//!
//! The `BufferPool` provides lock-free, leaky reuse of fixed-size buffers so
//! that steady-state relaying does not allocate.
//!
//! # Copy Strategies
//!
//! `CopyMode` selects between the poll-driven buffered copy and the manual
//! read/write loop (`--iohack`).

mod buffer_pool;
mod copy;

pub use buffer_pool::{
    BufferPool, BufferPoolStats, BufferPoolStatsSnapshot, PooledBuffer, DEFAULT_BUFFER_SIZE,
    DEFAULT_POOL_CAPACITY,
};
pub use copy::{copy_buffered, copy_manual, CopyMode, CopyResult, Transfer};
