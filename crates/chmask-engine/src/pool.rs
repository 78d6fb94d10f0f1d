//! Bounded allocator for frame copies.
//!
//! Every copy holds a [`Lease`]; the pool's usage drops back when the last
//! `Arc` of that copy goes away, wherever downstream it ends up.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("buffer limit reached ({max} buffers in use)")]
    BufferLimit { max: usize },
    #[error("memory limit reached: {requested} bytes requested, {in_use} of {max} in use")]
    MemoryLimit { requested: usize, in_use: usize, max: usize },
}

#[derive(Debug, Default)]
struct Usage {
    buffers: usize,
    bytes: usize,
}

#[derive(Debug)]
pub struct Lease {
    usage: Arc<Mutex<Usage>>,
    bytes: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut usage = self.usage.lock();
        usage.buffers = usage.buffers.saturating_sub(1);
        usage.bytes = usage.bytes.saturating_sub(self.bytes);
    }
}

#[derive(Debug, Clone)]
pub struct FramePool {
    max_buffers: Option<usize>,
    max_memory: Option<usize>,
    usage: Arc<Mutex<Usage>>,
}

impl FramePool {
    /// `None` means unlimited.
    pub fn new(max_buffers: Option<usize>, max_memory: Option<usize>) -> Self {
        Self { max_buffers, max_memory, usage: Arc::default() }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Deep copy of `frame`, accounted against the pool limits.
    pub fn copy(&self, frame: &Frame) -> Result<Frame, PoolError> {
        let bytes = frame.byte_len();
        {
            let mut usage = self.usage.lock();
            if let Some(max) = self.max_buffers {
                if usage.buffers >= max {
                    return Err(PoolError::BufferLimit { max });
                }
            }
            if let Some(max) = self.max_memory {
                if usage.bytes + bytes > max {
                    return Err(PoolError::MemoryLimit { requested: bytes, in_use: usage.bytes, max });
                }
            }
            usage.buffers += 1;
            usage.bytes += bytes;
        }
        let mut copy = frame.clone();
        copy.attach_lease(Lease { usage: self.usage.clone(), bytes });
        Ok(copy)
    }

    pub fn buffers_in_use(&self) -> usize {
        self.usage.lock().buffers
    }

    pub fn bytes_in_use(&self) -> usize {
        self.usage.lock().bytes
    }
}
