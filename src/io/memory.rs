use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ReadAt, clamp_len};
use crate::error::Result;

/// In-memory random access source that records every read it serves.
///
/// Stands in for a remote resource when the archive reader or cache has
/// to be driven without a network, and lets callers assert on how many
/// requests a given access pattern produces.
pub struct MemoryReader {
    data: Vec<u8>,
    reads: AtomicU64,
    ranges: Mutex<Vec<(u64, usize)>>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: AtomicU64::new(0),
            ranges: Mutex::new(Vec::new()),
        }
    }

    /// Number of `read_at` calls served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// `(offset, len)` of every read served so far, in order
    pub fn ranges(&self) -> Vec<(u64, usize)> {
        self.ranges
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let n = clamp_len(offset, buf.len(), self.size())?;
        let start = offset as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);

        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut ranges) = self.ranges.lock() {
            ranges.push((offset, buf.len()));
        }
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
