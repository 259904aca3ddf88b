//! Central directory reader.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Only the tail of the archive and the directory itself are touched
//! while opening, so a remote archive can be listed with a handful of
//! Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::stream::EntryStream;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// A parsed ZIP archive backed by a random access source.
///
/// [`open`](Self::open) reads and validates the whole central directory
/// up front: a malformed record, an encrypted entry or an unsupported
/// compression method fails the open, so a reader that exists always
/// has a complete and extractable entry list.
///
/// ## Example
///
/// ```ignore
/// let archive = ArchiveReader::open(reader).await?;
/// for entry in archive.entries() {
///     let mut stream = archive.open_entry(entry).await?;
///     // Pull decompressed bytes from the stream...
/// }
/// ```
pub struct ArchiveReader<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
    entries: Vec<ArchiveEntry>,
}

impl<R: ReadAt> ArchiveReader<R> {
    /// Parse the central directory of the archive behind `reader`.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let size = reader.size();
        let mut archive = Self {
            reader,
            size,
            entries: Vec::new(),
        };
        archive.entries = archive.read_central_directory().await?;
        debug!(entries = archive.entries.len(), size, "central directory parsed");
        Ok(archive)
    }

    /// Entries in central directory order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Open a decompressing stream over one entry's payload.
    pub async fn open_entry(&self, entry: &ArchiveEntry) -> Result<EntryStream<'_, R>> {
        let data_offset = self.data_offset(entry).await?;
        Ok(EntryStream::new(self.reader.as_ref(), entry, data_offset))
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// Returns the EOCD record and its offset in the file.
    async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::Archive("not a valid ZIP file".into()));
        }

        // First try the simple case where there's no comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;

        if let Ok(eocd) = EndOfCentralDirectory::from_bytes(&buf) {
            if eocd.comment_len == 0 {
                return Ok((eocd, offset));
            }
        }

        // The EOCD is followed by a comment; search backwards for it.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            // The comment length field must match the remaining bytes.
            let eocd = EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
            if eocd.comment_len as usize == buf.len() - i - EndOfCentralDirectory::SIZE {
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(Error::Archive("not a valid ZIP file".into()))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| Error::Archive("missing ZIP64 locator".into()))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.is_multi_disk() {
            return Err(Error::Archive("multi-disk archives are not supported".into()));
        }
        let record_end = locator
            .eocd64_offset
            .checked_add(Zip64EOCD::MIN_SIZE as u64);
        if record_end.is_none_or(|end| end > locator_offset) {
            return Err(Error::Archive("ZIP64 record offset out of range".into()));
        }

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        let eocd64 = Zip64EOCD::from_bytes(&eocd64_buf)?;
        if eocd64.is_multi_disk() {
            return Err(Error::Archive("multi-disk archives are not supported".into()));
        }
        Ok(eocd64)
    }

    /// Read the whole central directory in one request and parse every
    /// record in it.
    async fn read_central_directory(&self) -> Result<Vec<ArchiveEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        // Disk fields of a ZIP64 archive are checked on the ZIP64 records
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            if eocd.is_multi_disk() {
                return Err(Error::Archive("multi-disk archives are not supported".into()));
            }
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.checked_add(cd_size).is_none_or(|end| end > eocd_offset) {
            return Err(Error::Archive(format!(
                "central directory ({cd_size} bytes at {cd_offset}) overlaps the end record"
            )));
        }
        if total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            return Err(Error::Archive(format!(
                "{total_entries} entries cannot fit in a {cd_size} byte central directory"
            )));
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total_entries {
            let (entry, flags) = parse_cdfh(&mut cursor).map_err(|e| {
                Error::Archive(format!("central directory record {index}: {e}"))
            })?;
            self.validate(&entry, flags, cd_offset)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Reject entries that could never be extracted.
    fn validate(&self, entry: &ArchiveEntry, flags: u16, cd_offset: u64) -> Result<()> {
        if flags & FLAG_ENCRYPTED != 0 {
            return Err(Error::Encrypted {
                name: entry.name.clone(),
            });
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(Error::UnsupportedCompression {
                name: entry.name.clone(),
                method,
            });
        }
        let data_end = entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64)
            .and_then(|end| end.checked_add(entry.compressed_size));
        if data_end.is_none_or(|end| end > cd_offset) {
            return Err(Error::Archive(format!(
                "{}: entry data lies outside the archive body",
                entry.name
            )));
        }
        Ok(())
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins.
    async fn data_offset(&self, entry: &ArchiveEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(Error::Archive(format!(
                "{}: invalid local file header",
                entry.name
            )));
        }

        // Filename and extra field lengths sit at fixed positions 26 and 28
        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;
        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(Error::Archive(format!(
                "{}: entry data is truncated",
                entry.name
            )));
        }

        Ok(data_offset)
    }
}

/// Parse one Central Directory File Header, returning the entry and its
/// general purpose flags.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> std::io::Result<(ArchiveEntry, u16)> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad signature",
        ));
    }

    let version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>()?;
    let extra_field_length = cursor.read_u16::<LittleEndian>()?;
    let file_comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes)?;
    let name = String::from_utf8_lossy(&file_name_bytes).into_owned();

    // ZIP64 extended information lives in extra field 0x0001. Each value
    // is present only if the corresponding header field is 0xFFFFFFFF.
    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra)?;
    let mut extra = Cursor::new(extra.as_slice());
    let extra_end = extra_field_length as u64;

    while extra.position() + 4 <= extra_end {
        let header_id = extra.read_u16::<LittleEndian>()?;
        let field_size = extra.read_u16::<LittleEndian>()? as u64;
        let field_end = extra.position() + field_size;

        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                uncompressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                compressed_size = extra.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && extra.position() + 8 <= field_end {
                lfh_offset = extra.read_u64::<LittleEndian>()?;
            }
        }
        extra.set_position(field_end);
    }

    // Skip over the file comment (we don't use it)
    let comment_end = cursor.position() + file_comment_length as u64;
    if comment_end > cursor.get_ref().len() as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated file comment",
        ));
    }
    cursor.set_position(comment_end);

    let (mode, is_directory) = entry_mode(version_made_by, external_attrs, &name);

    Ok((
        ArchiveEntry {
            name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            mode,
            is_directory,
        },
        flags,
    ))
}
