//! Best-effort manifest through the general-purpose `zip` crate.
//!
//! Used when the directory parser rejects an archive that a more lenient
//! reader still understands (for example an archive with data prepended, as
//! self-extracting executables have). Compressed sizes are not carried over.

use std::fs::File;
use std::path::Path;

use super::structures::{ArchiveEntry, ArchiveManifest, ManifestOrigin, dos_datetime};

/// Rebuild a manifest for `path`. Blocking; run it off the async threads.
pub fn read_manifest(path: &Path) -> std::result::Result<ArchiveManifest, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).map_err(|e| e.to_string())?;
        #[allow(deprecated)]
        let method = file.compression().to_u16();
        let modified = file
            .last_modified()
            .and_then(|t| dos_datetime(t.datepart(), t.timepart()));

        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            compressed_size: None,
            uncompressed_size: file.size(),
            is_directory: file.is_dir(),
            method,
            modified,
            crc32: file.crc32(),
            local_header_offset: file.header_start(),
        });
    }

    Ok(ArchiveManifest::from_entries(entries, ManifestOrigin::Fallback))
}
