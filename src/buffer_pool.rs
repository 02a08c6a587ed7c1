//! Reusable byte buffers for streaming copies.
//!
//! # Responsibilities
//! - Hand out fixed-length buffers for the duration of one copy
//! - Take buffers back on drop so steady-state copying does not allocate
//!
//! # Design Decisions
//! - Buffers are never shared: a checkout is exclusively owned until dropped
//! - The free list is bounded; surplus buffers are released to the allocator

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Default buffer length (16 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Default number of idle buffers retained.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// A concurrency-safe pool of fixed-size byte buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    buffer_size: usize,
    max_idle: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes and keeping at
    /// most `max_idle` of them around between checkouts.
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size: buffer_size.max(1),
                max_idle,
                free: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Check out a buffer. It returns to the pool when the guard is dropped.
    pub fn checkout(&self) -> PooledBuffer {
        let reused = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        let buf = reused.unwrap_or_else(|| vec![0u8; self.inner.buffer_size].into_boxed_slice());
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Length of every buffer handed out by this pool.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_IDLE)
    }
}

/// A buffer checked out from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            let mut free = self.pool.free.lock().unwrap_or_else(|e| e.into_inner());
            if free.len() < self.pool.max_idle {
                free.push(buf);
            }
        }
    }
}
