// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pooled scratch buffers
//!
//! A [`BufferPool`] hands out fixed-size buffers that go back to the pool
//! when the [`SlabBuf`] guard is dropped. Each target owns one pool; every
//! job and every concurrent copy borrows from it.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Upper bound on idle buffers kept around
const MAX_IDLE_BUFS: usize = 64;

/// Pool of fixed-size scratch buffers
#[derive(Debug)]
pub struct BufferPool {
    buf_size: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    pub fn new(buf_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buf_size: buf_size.max(1),
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Borrow a buffer. It is returned to the pool when the guard drops.
    pub fn alloc(self: &Arc<Self>) -> SlabBuf {
        let buf = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size].into_boxed_slice());
        SlabBuf {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers currently held by the pool
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn free(&self, buf: Box<[u8]>) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_BUFS {
            idle.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`]
#[derive(Debug)]
pub struct SlabBuf {
    buf: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl Deref for SlabBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for SlabBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for SlabBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.free(buf);
        }
    }
}
