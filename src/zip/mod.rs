//! ZIP archive parsing and extraction.
//!
//! This module reads ZIP archives through any random access source and
//! writes their contents below a target directory.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Central directory parsing into [`ArchiveEntry`] values
//! - [`stream`]: Decompressing, checksum-verifying payload streams
//! - [`extractor`]: Path-safe extraction to disk
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! This implementation reads the EOCD first (from the end of the file),
//! then the Central Directory, which allows listing files without reading
//! the entire archive - perfect for HTTP Range requests.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - Symlink entries are written as regular files holding the link target

mod extractor;
mod parser;
mod stream;
mod structures;

pub use extractor::{ExtractReport, ZipExtractor};
pub use parser::ArchiveReader;
pub use stream::EntryStream;
pub use structures::{ArchiveEntry, CompressionMethod, entry_mode};
