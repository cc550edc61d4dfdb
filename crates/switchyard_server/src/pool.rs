//! Process-wide pool of receive scratch buffers.
//!
//! Every receive loop checks out one buffer for its lifetime and assembles
//! fragmented messages into it. Buffers come back through the drop guard
//! [`PooledBuffer`], so each checkout has exactly one matching return on
//! every exit path, including panics and cancellation.
//!
//! The shared pool is created on first use and lives for the rest of the
//! process. Buffers are plain byte vectors, so no teardown is needed.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Capacity of buffers handed out by the shared pool.
pub const DEFAULT_SCRATCH_SIZE: usize = 4 * 1024;

const DEFAULT_MAX_RETAINED: usize = 256;

static SHARED_POOL: Lazy<Arc<BufferPool>> =
    Lazy::new(|| Arc::new(BufferPool::new(DEFAULT_SCRATCH_SIZE, DEFAULT_MAX_RETAINED)));

/// Returns the process-wide scratch buffer pool.
pub fn shared_pool() -> Arc<BufferPool> {
    SHARED_POOL.clone()
}

/// A bounded stack of reusable byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    max_retained: usize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            buffer_size,
            max_retained,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Takes a cleared buffer out of the pool, allocating if none is free.
    pub fn checkout(self: &Arc<Self>) -> PooledBuffer {
        let buffer = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size));
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            buffer,
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Buffers sitting idle in the pool.
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn give_back(&self, mut buffer: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        buffer.clear();
        // Oversized messages grow the buffer; don't keep that memory around.
        if buffer.capacity() > self.buffer_size * 4 {
            buffer.shrink_to(self.buffer_size);
        }
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buffer);
        }
    }
}

/// A buffer on loan from a [`BufferPool`], returned when dropped.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.give_back(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_and_drop_balance() {
        let pool = Arc::new(BufferPool::new(64, 4));
        {
            let mut first = pool.checkout();
            let _second = pool.checkout();
            first.extend_from_slice(b"hello");
            assert_eq!(pool.outstanding(), 2);
            assert_eq!(pool.retained(), 0);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.retained(), 2);
    }

    #[test]
    fn returned_buffers_come_back_cleared() {
        let pool = Arc::new(BufferPool::new(64, 4));
        let mut buffer = pool.checkout();
        buffer.extend_from_slice(b"leftover");
        drop(buffer);

        let reused = pool.checkout();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= 64);
    }

    #[test]
    fn oversized_buffers_are_shrunk_and_retention_is_bounded() {
        let pool = Arc::new(BufferPool::new(16, 1));
        let mut big = pool.checkout();
        big.resize(1024, 0);
        let other = pool.checkout();
        drop(big);
        drop(other);

        assert_eq!(pool.retained(), 1);
        assert!(pool.checkout().capacity() < 1024);
    }
}
