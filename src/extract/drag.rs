//! Single-entry extraction for drag-and-drop out of an archive.
//!
//! Each request gets its own session folder named by a fresh UUID under the
//! drag root, so concurrent drags never share files.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

use super::backend::CliTool;
use crate::config::native_path;
use crate::error::{ArchiveError, Result};
use crate::io::LocalFileReader;
use crate::zip::path::{clean_path, sanitize_entry_path};
use crate::zip::{ArchiveManifest, ManifestOrigin, ZipExtractor};

/// One drag request.
#[derive(Debug, Clone)]
pub struct DragRequest<'a> {
    pub archive: &'a Path,
    pub manifest: &'a ArchiveManifest,
    pub entry_path: &'a str,
    pub is_directory: bool,
    pub drag_root: &'a Path,
    pub timeout: Duration,
}

/// Extract one entry (or one directory subtree) into a new session folder
/// and return the extracted path, or the session folder if the entry did
/// not land where expected.
pub async fn prepare(request: DragRequest<'_>) -> Result<PathBuf> {
    let wanted = clean_path(request.entry_path);
    if wanted.is_empty() || wanted == "." || wanted == ".." {
        return Err(ArchiveError::InvalidEntryPath(request.entry_path.to_string()));
    }
    let Some(wanted) = sanitize_entry_path(&wanted) else {
        return Err(ArchiveError::InvalidEntryPath(request.entry_path.to_string()));
    };

    let session = request.drag_root.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&session)
        .await
        .map_err(|source| ArchiveError::Session {
            path: session.clone(),
            source,
        })?;

    let mut extracted = match in_process(&request, &session, &wanted).await {
        Ok(n) => n > 0,
        Err(e) => {
            log::debug!("In-process drag of {wanted} failed: {e}");
            false
        }
    };
    if !extracted {
        extracted = with_seven_zip(&request, &session, &wanted).await && has_content(&session);
    }
    if !extracted {
        if let Err(e) = tokio::fs::remove_dir_all(&session).await {
            log::debug!("Failed to remove session {}: {e}", session.display());
        }
        return Err(ArchiveError::NoMatchingEntry);
    }

    let target = session.join(&wanted);
    Ok(if target.exists() { target } else { session })
}

fn has_content(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

async fn in_process(request: &DragRequest<'_>, session: &Path, wanted: &str) -> Result<usize> {
    if request.manifest.origin() != ManifestOrigin::CentralDirectory {
        return Ok(0);
    }
    let reader = LocalFileReader::new(request.archive).map_err(ArchiveError::Open)?;
    ZipExtractor::new(Arc::new(reader))
        .extract_matching(
            request.manifest.entries(),
            session,
            wanted,
            request.is_directory,
        )
        .await
}

async fn with_seven_zip(request: &DragRequest<'_>, session: &Path, wanted: &str) -> bool {
    let Some(program) = CliTool::SevenZip.locate() else {
        log::debug!("No 7-Zip binary available for drag extraction");
        return false;
    };
    let selector = if request.is_directory {
        format!("{wanted}/*")
    } else {
        wanted.to_string()
    };

    let spawned = Command::new(&program)
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", native_path(session)))
        .arg(native_path(request.archive))
        .arg(selector)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            log::warn!("Failed to start {}: {e}", program.display());
            return false;
        }
    };

    let waited = tokio::time::timeout(request.timeout, child.wait()).await;
    match waited {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            log::warn!("Drag extraction failed: {e}");
            false
        }
        Err(_) => {
            log::warn!("Drag extraction timed out after {:?}", request.timeout);
            let _ = child.kill().await;
            false
        }
    }
}
