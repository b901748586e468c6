use chrono::{Local, NaiveDateTime, TimeZone};
use filetime::FileTime;
use flate2::Crc;
use flate2::write::DeflateDecoder;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::path::{clean_path, sanitize_entry_path};
use super::structures::{ArchiveEntry, CompressionMethod};

/// Compressed bytes fetched per read while streaming an entry.
const CHUNK_SIZE: usize = 64 * 1024;

/// Byte and file counters bumped by the extraction worker.
///
/// These atomics are the only state shared between the worker and the
/// progress sampler.
#[derive(Debug, Default)]
pub struct LiveCounters {
    bytes: AtomicU64,
    files: AtomicU64,
}

impl LiveCounters {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    fn add_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Written,
    Skipped,
}

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// Whether this extractor can decode the entry without help.
    pub fn can_stream(entry: &ArchiveEntry) -> bool {
        entry.is_directory
            || (entry.compressed_size.is_some()
                && matches!(
                    entry.compression_method(),
                    CompressionMethod::Stored | CompressionMethod::Deflate
                ))
    }

    /// Extract every entry below `dest`, returning how many were written.
    ///
    /// Entries that would escape `dest`, use an unsupported method, have a
    /// damaged local header or cannot be created on disk are skipped.
    /// Failures reading the archive, inflating or checksumming abort the run.
    pub async fn extract_all(
        &self,
        entries: &[ArchiveEntry],
        dest: &Path,
        counters: &LiveCounters,
    ) -> Result<usize> {
        let mut written = 0;
        for entry in entries {
            let Some(rel) = sanitize_entry_path(&entry.name) else {
                log::warn!("Skipping unsafe entry path: {}", entry.name);
                continue;
            };
            if self.extract_entry(entry, &rel, dest, Some(counters)).await? == EntryOutcome::Written {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Extract the entry named `wanted`, or with `is_directory` everything
    /// beneath it, returning how many entries matched and were written.
    pub async fn extract_matching(
        &self,
        entries: &[ArchiveEntry],
        dest: &Path,
        wanted: &str,
        is_directory: bool,
    ) -> Result<usize> {
        let wanted = clean_path(wanted);
        let prefix = format!("{wanted}/");
        let mut written = 0;

        for entry in entries {
            let rel = clean_path(&entry.name);
            let matched = rel == wanted || (is_directory && rel.starts_with(&prefix));
            if !matched {
                continue;
            }
            let Some(rel) = sanitize_entry_path(&rel) else {
                log::warn!("Skipping unsafe entry path: {}", entry.name);
                continue;
            };
            if self.extract_entry(entry, &rel, dest, None).await? == EntryOutcome::Written {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn extract_entry(
        &self,
        entry: &ArchiveEntry,
        rel: &str,
        dest: &Path,
        counters: Option<&LiveCounters>,
    ) -> Result<EntryOutcome> {
        let output_path = dest.join(rel);

        if entry.is_directory {
            if let Err(e) = fs::create_dir_all(&output_path).await {
                log::warn!("Skipping {}: cannot create directory ({e})", entry.name);
                return Ok(EntryOutcome::Skipped);
            }
            return Ok(EntryOutcome::Written);
        }

        if !Self::can_stream(entry) {
            log::warn!(
                "Skipping {}: compression method {} is not supported",
                entry.name,
                entry.method
            );
            return Ok(EntryOutcome::Skipped);
        }

        let data_offset = match self.parser.get_data_offset(entry).await {
            Ok(offset) => offset,
            Err(e) => {
                log::warn!("Skipping {}: bad local header ({e})", entry.name);
                return Ok(EntryOutcome::Skipped);
            }
        };

        let file = match create_output(&output_path).await {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Skipping {}: cannot create {} ({e})", entry.name, output_path.display());
                return Ok(EntryOutcome::Skipped);
            }
        };

        if let Some(counters) = counters {
            counters.add_file();
        }
        self.extract_to_file(entry, data_offset, file, counters)
            .await?;
        if let Some(modified) = entry.modified {
            restore_mtime(&output_path, modified);
        }
        Ok(EntryOutcome::Written)
    }

    /// Stream one entry's payload to disk, inflating and checksumming as it goes.
    async fn extract_to_file(
        &self,
        entry: &ArchiveEntry,
        data_offset: u64,
        mut file: fs::File,
        counters: Option<&LiveCounters>,
    ) -> Result<()> {
        let mut crc = Crc::new();
        let mut inflater = match entry.compression_method() {
            CompressionMethod::Deflate => Some(DeflateDecoder::new(Vec::with_capacity(CHUNK_SIZE))),
            _ => None,
        };

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut offset = data_offset;
        let mut remaining = entry.compressed_size.unwrap_or(0);

        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            self.parser
                .reader()
                .read_exact_at(offset, &mut buf[..n])
                .await?;
            offset += n as u64;
            remaining -= n as u64;

            match inflater.as_mut() {
                Some(decoder) => {
                    decoder
                        .write_all(&buf[..n])
                        .map_err(|source| decompress_error(entry, source))?;
                    let out = decoder.get_mut();
                    write_chunk(&mut file, &mut crc, out.as_slice(), counters).await?;
                    out.clear();
                }
                None => write_chunk(&mut file, &mut crc, &buf[..n], counters).await?,
            }
        }

        if let Some(decoder) = inflater {
            let tail = decoder
                .finish()
                .map_err(|source| decompress_error(entry, source))?;
            write_chunk(&mut file, &mut crc, &tail, counters).await?;
        }
        file.flush().await?;

        if crc.sum() != entry.crc32 {
            return Err(ArchiveError::ChecksumMismatch(entry.name.clone()));
        }
        Ok(())
    }
}

async fn create_output(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::File::create(path).await
}

/// Stamp the archived modification time on an extracted file.
///
/// DOS timestamps carry no zone, so they are read as local time.
fn restore_mtime(path: &Path, modified: NaiveDateTime) {
    let Some(local) = Local.from_local_datetime(&modified).earliest() else {
        return;
    };
    let mtime = FileTime::from_unix_time(local.timestamp(), 0);
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        log::warn!("Failed to set modification time on {}: {e}", path.display());
    }
}

async fn write_chunk(
    file: &mut fs::File,
    crc: &mut Crc,
    data: &[u8],
    counters: Option<&LiveCounters>,
) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    file.write_all(data).await?;
    crc.update(data);
    if let Some(counters) = counters {
        counters.add_bytes(data.len() as u64);
    }
    Ok(())
}

fn decompress_error(entry: &ArchiveEntry, source: std::io::Error) -> ArchiveError {
    ArchiveError::Decompress {
        name: entry.name.clone(),
        source,
    }
}
