//! ZIP directory parsing and in-process extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures for ZIP format elements and the entry manifest
//! - [`parser`]: Low-level parsing of the EOCD and central directory
//! - [`extractor`]: Streaming extraction of stored and deflated entries
//! - [`path`]: Entry path cleaning and traversal checks
//! - `fallback`: manifest rebuilt through the `zip` crate (feature `fallback`)
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Listing reads the EOCD first (from the end of the file), then the Central
//! Directory, so no payload bytes are touched.
//!
//! ## Limitations
//!
//! - No ZIP64 (rejected as a hard error)
//! - No encryption support
//! - No multi-disk archive support
//! - In-process extraction handles STORED and DEFLATE only

mod extractor;
#[cfg(feature = "fallback")]
mod fallback;
mod parser;
pub mod path;
mod structures;

use std::path::Path;
use std::sync::Arc;

pub use extractor::{LiveCounters, ZipExtractor};
pub use parser::ZipParser;
pub use structures::*;

use crate::error::{ArchiveError, Result};
use crate::io::LocalFileReader;

/// Load the manifest of a local ZIP file.
///
/// The central-directory parser runs first. When it fails, and `fallback` is
/// set, the general-purpose reader gets a chance; ZIP64 and unreadable files
/// are never retried. If both fail the parser's error is returned.
pub async fn load_manifest(path: &Path, fallback: bool) -> Result<ArchiveManifest> {
    let primary = parse_local(path).await;
    let err = match primary {
        Ok(manifest) => return Ok(manifest),
        Err(e) => e,
    };
    if !fallback || err.is_final_for_load() {
        return Err(err);
    }

    match read_fallback(path).await {
        Some(manifest) => {
            log::debug!(
                "Directory parser failed for {} ({err}); using fallback listing",
                path.display()
            );
            Ok(manifest)
        }
        None => Err(err),
    }
}

async fn parse_local(path: &Path) -> Result<ArchiveManifest> {
    if !path.is_file() {
        return Err(ArchiveError::NotFound);
    }
    let reader = LocalFileReader::new(path).map_err(ArchiveError::Open)?;
    ZipParser::new(Arc::new(reader)).read_manifest().await
}

#[cfg(feature = "fallback")]
async fn read_fallback(path: &Path) -> Option<ArchiveManifest> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || fallback::read_manifest(&owned)).await {
        Ok(Ok(manifest)) => Some(manifest),
        Ok(Err(e)) => {
            log::debug!("Fallback listing failed for {}: {e}", path.display());
            None
        }
        Err(e) => {
            log::warn!("Fallback listing task failed: {e}");
            None
        }
    }
}

#[cfg(not(feature = "fallback"))]
async fn read_fallback(_path: &Path) -> Option<ArchiveManifest> {
    None
}
