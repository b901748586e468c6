use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};

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

    pub fn label(&self) -> String {
        match self {
            CompressionMethod::Stored => "Stored".to_string(),
            CompressionMethod::Deflate => "Defl:N".to_string(),
            CompressionMethod::Unknown(v) => format!("M{v}"),
        }
    }
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
            return Err(ArchiveError::EocdNotFound);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Any field holding its ZIP64 sentinel means the real values live in a
    /// ZIP64 record, which this reader refuses.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == 0xFFFF || self.cd_size == 0xFFFFFFFF || self.cd_offset == 0xFFFFFFFF
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag bit 11: file name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// One central-directory record.
///
/// Entries are immutable once built; a reload replaces the whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path with `/` separators; directories end with `/`.
    pub name: String,
    /// `None` when the backend that listed the archive cannot tell.
    pub compressed_size: Option<u64>,
    pub uncompressed_size: u64,
    pub is_directory: bool,
    /// Raw ZIP method code (0 = stored, 8 = deflate, ...).
    pub method: u16,
    pub modified: Option<NaiveDateTime>,
    pub crc32: u32,
    pub local_header_offset: u64,
}

impl ArchiveEntry {
    pub fn compression_method(&self) -> CompressionMethod {
        CompressionMethod::from_u16(self.method)
    }

    /// ISO-8601 modification time, or an empty string when the stored
    /// timestamp does not name a real calendar instant.
    pub fn modified_iso(&self) -> String {
        self.modified
            .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

/// Where a manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestOrigin {
    /// Parsed from the central directory by [`ZipParser`](super::ZipParser).
    #[default]
    CentralDirectory,
    /// Rebuilt by the general-purpose fallback library.
    Fallback,
}

/// The reader's listing of an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveManifest {
    entries: Vec<ArchiveEntry>,
    file_count: usize,
    total_uncompressed_size: u64,
    origin: ManifestOrigin,
}

impl ArchiveManifest {
    /// Build a manifest, deriving the totals from the entries in one pass.
    pub fn from_entries(entries: Vec<ArchiveEntry>, origin: ManifestOrigin) -> Self {
        let (file_count, total_uncompressed_size) = entries
            .iter()
            .filter(|e| !e.is_directory)
            .fold((0usize, 0u64), |(n, size), e| (n + 1, size + e.uncompressed_size));
        Self {
            entries,
            file_count,
            total_uncompressed_size,
            origin,
        }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn total_uncompressed_size(&self) -> u64 {
        self.total_uncompressed_size
    }

    pub fn origin(&self) -> ManifestOrigin {
        self.origin
    }
}

/// Decode a DOS date/time pair.
///
/// Date: bits 9-15 year since 1980, 5-8 month, 0-4 day.
/// Time: bits 11-15 hour, 5-10 minute, 0-4 second / 2.
pub fn dos_datetime(dos_date: u16, dos_time: u16) -> Option<NaiveDateTime> {
    let year = ((dos_date >> 9) & 0x7F) as i32 + 1980;
    let month = ((dos_date >> 5) & 0x0F) as u32;
    let day = (dos_date & 0x1F) as u32;
    let hour = ((dos_time >> 11) & 0x1F) as u32;
    let minute = ((dos_time >> 5) & 0x3F) as u32;
    let second = ((dos_time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Decode an entry name according to the UTF-8 flag.
pub fn decode_name(bytes: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
