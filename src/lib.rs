//! # relunzip
//!
//! Fetch a GitHub release asset and extract it without downloading the
//! whole archive first.
//!
//! The asset is treated as a random access file served over HTTP: the
//! ZIP central directory and each entry's payload are read with Range
//! requests, through a block cache that keeps the number of round trips
//! low. Entries are written below the install path, and any entry whose
//! name would resolve outside of it aborts the run.
//!
//! ## Features
//!
//! - Release lookup by owner, repository, tag and asset name
//! - Ranged reads with strict validation of every partial response
//! - 2 MiB block cache, each block fetched at most once per run
//! - ZIP64, STORED and DEFLATE entries with CRC-32 verification
//! - Path traversal (zip-slip) protection
//! - Optional staged install that swaps the new tree in atomically
//! - Cancellation of in-flight requests and copies
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relunzip::{ArchiveReader, BlockCache, HttpOptions, HttpRangeReader, ZipExtractor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = HttpRangeReader::connect(
//!         "https://example.com/archive.zip".to_string(),
//!         &HttpOptions::default(),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!     let archive = ArchiveReader::open(Arc::new(BlockCache::new(source))).await?;
//!
//!     ZipExtractor::new("/tmp/out")?
//!         .extract(&archive, |entry| println!("{}", entry.name))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod io;
pub mod pipeline;
pub mod release;
pub mod zip;

pub use cli::Cli;
pub use config::{Config, Platform};
pub use error::{Error, ErrorKind, Result};
pub use install::InstallMode;
pub use io::{BlockCache, HttpOptions, HttpRangeReader, MemoryReader, ReadAt};
pub use release::{ReleaseClient, RemoteAsset};
pub use zip::{ArchiveEntry, ArchiveReader, ZipExtractor};
