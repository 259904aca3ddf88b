mod cache;
mod http;
mod memory;

pub use cache::{BlockCache, DEFAULT_BLOCK_SIZE};
pub use http::{HttpOptions, HttpRangeReader};
pub use memory::MemoryReader;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Fewer bytes are returned only when the read reaches the end of the
    /// source; `Ok(0)` means `offset == size()`.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely or fail with [`Error::ShortRead`].
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf).await?;
        if n != buf.len() {
            return Err(Error::ShortRead {
                offset,
                expected: buf.len() as u64,
                actual: n as u64,
            });
        }
        Ok(())
    }
}

/// Clamp a requested range to a source of `size` bytes.
///
/// Returns the number of bytes that can be served, or
/// [`Error::OutOfBounds`] when `offset` lies past the end.
pub(crate) fn clamp_len(offset: u64, len: usize, size: u64) -> Result<usize> {
    if offset > size {
        return Err(Error::OutOfBounds {
            offset,
            len: len as u64,
            size,
        });
    }
    Ok((size - offset).min(len as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_len_trims_at_end() {
        assert_eq!(clamp_len(0, 10, 100).unwrap(), 10);
        assert_eq!(clamp_len(95, 10, 100).unwrap(), 5);
        assert_eq!(clamp_len(100, 10, 100).unwrap(), 0);
        assert!(matches!(
            clamp_len(101, 1, 100),
            Err(Error::OutOfBounds { offset: 101, .. })
        ));
    }

    #[tokio::test]
    async fn read_exact_at_rejects_reads_past_end() {
        let reader = MemoryReader::new(b"hello".to_vec());
        let mut buf = [0u8; 4];
        let err = reader.read_exact_at(3, &mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                offset: 3,
                expected: 4,
                actual: 2
            }
        ));
    }
}
