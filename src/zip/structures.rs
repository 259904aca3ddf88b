use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Map a cursor failure on an index record into a structural error.
pub(crate) fn malformed(what: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| Error::Archive(format!("{what}: {e}"))
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::Archive("invalid end of central directory".into()));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let parse = |c: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            Ok(Self {
                disk_number: c.read_u16::<LittleEndian>()?,
                disk_with_cd: c.read_u16::<LittleEndian>()?,
                disk_entries: c.read_u16::<LittleEndian>()?,
                total_entries: c.read_u16::<LittleEndian>()?,
                cd_size: c.read_u32::<LittleEndian>()?,
                cd_offset: c.read_u32::<LittleEndian>()?,
                comment_len: c.read_u16::<LittleEndian>()?,
            })
        };
        parse(&mut cursor).map_err(malformed("end of central directory"))
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub fn is_multi_disk(&self) -> bool {
        self.disk_with_eocd64 != 0 || self.total_disks > 1
    }
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::Archive("invalid ZIP64 locator".into()));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let parse = |c: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            Ok(Self {
                disk_with_eocd64: c.read_u32::<LittleEndian>()?,
                eocd64_offset: c.read_u64::<LittleEndian>()?,
                total_disks: c.read_u32::<LittleEndian>()?,
            })
        };
        parse(&mut cursor).map_err(malformed("ZIP64 locator"))
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::Archive("invalid ZIP64 end of central directory".into()));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let parse = |c: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            // Record size and the two version fields are not needed
            c.set_position(12);
            Ok(Self {
                disk_number: c.read_u32::<LittleEndian>()?,
                disk_with_cd: c.read_u32::<LittleEndian>()?,
                disk_entries: c.read_u64::<LittleEndian>()?,
                total_entries: c.read_u64::<LittleEndian>()?,
                cd_size: c.read_u64::<LittleEndian>()?,
                cd_offset: c.read_u64::<LittleEndian>()?,
            })
        };
        parse(&mut cursor).map_err(malformed("ZIP64 end of central directory"))
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0 || self.disk_entries != self.total_entries
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// "Version made by" host systems that store Unix mode bits
const HOST_UNIX: u8 = 3;
const HOST_DARWIN: u8 = 19;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const MSDOS_DIR: u32 = 0x10;
const MSDOS_READONLY: u32 = 0x01;

/// Derive permission bits and the directory flag from the central
/// directory's host system and external attributes.
///
/// Unix-made archives carry `st_mode` in the high 16 bits. Everything
/// else falls back to `0o755` for directories and `0o644` for files,
/// dropping write permission when the DOS read-only bit is set.
pub fn entry_mode(version_made_by: u16, external_attrs: u32, name: &str) -> (u32, bool) {
    let host = (version_made_by >> 8) as u8;
    let name_is_dir = name.ends_with('/');

    if matches!(host, HOST_UNIX | HOST_DARWIN) {
        let st_mode = external_attrs >> 16;
        if st_mode != 0 {
            let is_dir = name_is_dir || st_mode & S_IFMT == S_IFDIR;
            return (st_mode & 0o7777, is_dir);
        }
    }

    let is_dir = name_is_dir || external_attrs & MSDOS_DIR != 0;
    let mut mode = if is_dir { 0o755 } else { 0o644 };
    if external_attrs & MSDOS_READONLY != 0 {
        mode &= !0o222;
    }
    (mode, is_dir)
}

/// One record of the archive's central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path, forward-slash separated
    pub name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    /// Permission bits (`0o7777` mask)
    pub mode: u32,
    pub is_directory: bool,
}
