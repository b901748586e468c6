//! Low-level ZIP directory parser.
//!
//! This module reads only the directory structures of a ZIP file, from any
//! source that implements the [`ReadAt`] trait. Payload bytes are never read
//! while building a manifest.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the file's tail
//! 2. Validate the directory location against the file size
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header to locate its data
//!
//! ZIP64 archives are rejected outright: any EOCD field holding its ZIP64
//! sentinel fails the parse, and ZIP64 extra fields are skipped unread.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP directory parser.
///
/// Generic over the reader type so tests and the engine can share it.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let manifest = parser.read_manifest().await?;
/// for entry in manifest.entries() {
///     let offset = parser.get_data_offset(entry).await?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The tail of the file (at most the EOCD plus a maximal comment) is
    /// scanned from its high end downward and the first signature met wins,
    /// so a comment that happens to contain the signature bytes earlier in
    /// the tail cannot shadow the real record.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ArchiveError::TooSmall);
        }

        // Common case first: no comment, EOCD is the last 22 bytes.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&buf[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(ArchiveError::EocdNotFound)
    }

    /// Build the manifest for the whole archive.
    ///
    /// Either every record parses and the full manifest is returned, or an
    /// error is; partial listings never escape.
    pub async fn read_manifest(&self) -> Result<ArchiveManifest> {
        let (eocd, _) = self.find_eocd().await?;

        if eocd.is_zip64() {
            return Err(ArchiveError::Zip64Unsupported);
        }

        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > self.size {
            return Err(ArchiveError::DirectoryOutOfBounds);
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader
            .read_exact_at(cd_offset, &mut cd_data)
            .await
            .map_err(|_| ArchiveError::CorruptDirectory)?;

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..eocd.total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }

        Ok(ArchiveManifest::from_entries(
            entries,
            ManifestOrigin::CentralDirectory,
        ))
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry, so it
    /// has to be read to find where the payload begins.
    pub async fn get_data_offset(&self, entry: &ArchiveEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.local_header_offset, &mut lfh_buf)
            .await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::CorruptDirectory);
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.local_header_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Parse one Central Directory File Header from a cursor over the directory.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ArchiveEntry> {
    let mut hdr = [0u8; CDFH_MIN_SIZE];
    cursor
        .read_exact(&mut hdr)
        .map_err(|_| ArchiveError::CorruptDirectory)?;
    if &hdr[0..4] != CDFH_SIGNATURE {
        return Err(ArchiveError::CorruptDirectory);
    }

    let mut fields = Cursor::new(&hdr[4..]);
    let _version_made_by = fields.read_u16::<LittleEndian>()?;
    let _version_needed = fields.read_u16::<LittleEndian>()?;
    let flags = fields.read_u16::<LittleEndian>()?;
    let method = fields.read_u16::<LittleEndian>()?;
    let last_mod_time = fields.read_u16::<LittleEndian>()?;
    let last_mod_date = fields.read_u16::<LittleEndian>()?;
    let crc32 = fields.read_u32::<LittleEndian>()?;
    let compressed_size = fields.read_u32::<LittleEndian>()?;
    let uncompressed_size = fields.read_u32::<LittleEndian>()?;
    let file_name_length = fields.read_u16::<LittleEndian>()?;
    let extra_field_length = fields.read_u16::<LittleEndian>()?;
    let file_comment_length = fields.read_u16::<LittleEndian>()?;
    let _disk_number_start = fields.read_u16::<LittleEndian>()?;
    let _internal_attrs = fields.read_u16::<LittleEndian>()?;
    let _external_attrs = fields.read_u32::<LittleEndian>()?;
    let lfh_offset = fields.read_u32::<LittleEndian>()?;

    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor
        .read_exact(&mut file_name_bytes)
        .map_err(|_| ArchiveError::TruncatedName)?;
    let name = decode_name(&file_name_bytes, flags);
    let is_directory = name.ends_with('/');

    // Extra field and comment are skipped unread.
    let skip = extra_field_length as u64 + file_comment_length as u64;
    let next = cursor.position() + skip;
    if next > cursor.get_ref().len() as u64 {
        return Err(ArchiveError::CorruptDirectory);
    }
    cursor.set_position(next);

    Ok(ArchiveEntry {
        name,
        compressed_size: Some(compressed_size as u64),
        uncompressed_size: uncompressed_size as u64,
        is_directory,
        method,
        modified: dos_datetime(last_mod_date, last_mod_time),
        crc32,
        local_header_offset: lfh_offset as u64,
    })
}
