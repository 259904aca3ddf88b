use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::{ArchiveEntry, CompressionMethod};

/// Compressed bytes pulled from the source per read
const INPUT_CHUNK: usize = 64 * 1024;

/// Pull-based reader over one entry's decompressed payload.
///
/// Compressed bytes are fetched from the archive source in
/// [`INPUT_CHUNK`] pieces as the caller drains the stream. When the
/// stream reports end of data it has checked the produced length and
/// CRC-32 against the central directory.
pub struct EntryStream<'a, R: ReadAt> {
    reader: &'a R,
    name: String,
    method: CompressionMethod,
    /// Next compressed byte to fetch
    pos: u64,
    /// Compressed bytes not yet fetched
    remaining: u64,
    input: Vec<u8>,
    input_start: usize,
    inflater: Decompress,
    inflate_done: bool,
    hasher: crc32fast::Hasher,
    produced: u64,
    expected_size: u64,
    expected_crc: u32,
    verified: bool,
}

impl<'a, R: ReadAt> EntryStream<'a, R> {
    pub(crate) fn new(reader: &'a R, entry: &ArchiveEntry, data_offset: u64) -> Self {
        Self {
            reader,
            name: entry.name.clone(),
            method: entry.compression_method,
            pos: data_offset,
            remaining: entry.compressed_size,
            input: Vec::new(),
            input_start: 0,
            inflater: Decompress::new(false),
            inflate_done: false,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            expected_size: entry.uncompressed_size,
            expected_crc: entry.crc32,
            verified: false,
        }
    }

    /// Read decompressed bytes into `buf`, returning 0 at end of entry.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = match self.method {
            CompressionMethod::Stored => self.read_stored(buf).await?,
            CompressionMethod::Deflate => self.read_deflate(buf).await?,
            CompressionMethod::Unknown(method) => {
                return Err(Error::UnsupportedCompression {
                    name: self.name.clone(),
                    method,
                });
            }
        };

        if n == 0 {
            self.verify()?;
        } else {
            self.hasher.update(&buf[..n]);
            self.produced += n as u64;
            if self.produced > self.expected_size {
                return Err(Error::Checksum {
                    name: self.name.clone(),
                });
            }
        }
        Ok(n)
    }

    async fn read_stored(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.remaining.min(buf.len() as u64) as usize;
        if n == 0 {
            return Ok(0);
        }
        self.reader.read_exact_at(self.pos, &mut buf[..n]).await?;
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }

    async fn read_deflate(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.inflate_done {
                return Ok(0);
            }
            if self.input_start == self.input.len() && self.remaining > 0 {
                self.refill().await?;
            }

            let in_before = self.inflater.total_in();
            let out_before = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(&self.input[self.input_start..], buf, FlushDecompress::None)
                .map_err(|e| Error::Archive(format!("{}: {}", self.name, e)))?;
            let consumed = (self.inflater.total_in() - in_before) as usize;
            let produced = (self.inflater.total_out() - out_before) as usize;
            self.input_start += consumed;

            if status == Status::StreamEnd {
                self.inflate_done = true;
            }
            if produced > 0 {
                return Ok(produced);
            }
            if self.inflate_done {
                return Ok(0);
            }
            if consumed == 0 && self.input_start == self.input.len() && self.remaining == 0 {
                return Err(Error::Archive(format!(
                    "{}: deflate stream is truncated",
                    self.name
                )));
            }
            if consumed == 0 && self.input_start < self.input.len() {
                return Err(Error::Archive(format!(
                    "{}: deflate stream made no progress",
                    self.name
                )));
            }
        }
    }

    async fn refill(&mut self) -> Result<()> {
        let n = self.remaining.min(INPUT_CHUNK as u64) as usize;
        self.input.resize(n, 0);
        self.reader.read_exact_at(self.pos, &mut self.input).await?;
        self.input_start = 0;
        self.pos += n as u64;
        self.remaining -= n as u64;
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        let crc = std::mem::take(&mut self.hasher).finalize();
        if self.produced != self.expected_size || crc != self.expected_crc {
            return Err(Error::Checksum {
                name: self.name.clone(),
            });
        }
        self.verified = true;
        Ok(())
    }
}
