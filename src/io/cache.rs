use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ReadAt, clamp_len};
use crate::error::Result;

/// Default cache block size (2 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Block-aligned read cache in front of a slow [`ReadAt`] source.
///
/// The source is split into `block_size` aligned blocks. A miss fetches
/// the whole covering block from the inner reader; fetched blocks are
/// kept until the cache is dropped, so every block is fetched at most
/// once. There is no eviction: one cache serves one archive for one run.
///
/// The block table lock is held for the whole of a read, including the
/// fetch of missing blocks. Concurrent readers asking for the same block
/// therefore wait for the first fetch instead of issuing their own.
pub struct BlockCache<R: ReadAt> {
    inner: R,
    block_size: usize,
    blocks: Mutex<HashMap<u64, Box<[u8]>>>,
    fetches: AtomicU64,
}

impl<R: ReadAt> BlockCache<R> {
    pub fn new(inner: R) -> Self {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    /// A zero `block_size` is bumped to one byte.
    pub fn with_block_size(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            blocks: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks fetched from the inner reader
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn fetch_block(&self, index: u64) -> Result<Box<[u8]>> {
        let size = self.inner.size();
        let start = index * self.block_size as u64;
        let len = (size - start).min(self.block_size as u64) as usize;
        debug!(index, start, len, "cache miss");

        let mut block = vec![0u8; len].into_boxed_slice();
        self.inner.read_exact_at(start, &mut block).await?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(block)
    }
}

#[async_trait]
impl<R: ReadAt> ReadAt for BlockCache<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = clamp_len(offset, buf.len(), self.size())?;
        let block_size = self.block_size as u64;
        let mut blocks = self.blocks.lock().await;

        let mut copied = 0;
        while copied < len {
            let pos = offset + copied as u64;
            let index = pos / block_size;
            let within = (pos % block_size) as usize;

            let block = match blocks.entry(index) {
                Entry::Occupied(hit) => hit.into_mut(),
                Entry::Vacant(miss) => miss.insert(self.fetch_block(index).await?),
            };

            let n = (block.len() - within).min(len - copied);
            buf[copied..copied + n].copy_from_slice(&block[within..within + n]);
            copied += n;
        }

        Ok(len)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}
