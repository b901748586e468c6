use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::backend::{JobSpec, RunningJob};
use super::drag::{self, DragRequest};
use super::selector;
use super::telemetry::{DirectoryStats, ExtractionEvent, ExtractionStatus, StatusCell, Telemetry};
use crate::config::{ExtractorConfig, ReaderOptions};
use crate::error::{ArchiveError, Result};
use crate::zip::{ArchiveEntry, ArchiveManifest, load_manifest};

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// A ZIP archive on disk: its manifest and at most one running extraction.
///
/// Listing happens on [`set_source`](Self::set_source) and
/// [`reload`](Self::reload). Extraction runs in a background task; observe
/// it through [`watch_status`](Self::watch_status) or
/// [`subscribe`](Self::subscribe).
pub struct ArchiveReader {
    options: ReaderOptions,
    source: Option<PathBuf>,
    manifest: Arc<ArchiveManifest>,
    loaded: bool,
    status: StatusCell,
    events: broadcast::Sender<ExtractionEvent>,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new(ReaderOptions::default())
    }
}

impl ArchiveReader {
    pub fn new(options: ReaderOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            options,
            source: None,
            manifest: Arc::new(ArchiveManifest::default()),
            loaded: false,
            status: StatusCell::new(),
            events,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Takes effect from the next extraction request.
    pub fn set_extractor_config(&mut self, config: ExtractorConfig) {
        self.options.extractor = config;
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Point the reader at a new archive and list it. An empty path clears
    /// the reader; the same path again is a no-op.
    pub async fn set_source(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let path = (!path.as_os_str().is_empty()).then_some(path);
        if path == self.source {
            return self.loaded;
        }
        self.source = path;
        self.reload().await
    }

    /// Re-read the manifest of the current source.
    pub async fn reload(&mut self) -> bool {
        let Some(path) = self.source.clone() else {
            self.manifest = Arc::new(ArchiveManifest::default());
            self.loaded = false;
            self.status.set_error(String::new());
            return false;
        };

        match load_manifest(&path, self.options.manifest_fallback).await {
            Ok(manifest) => {
                log::info!(
                    "Loaded {}: {} entries, {} files, {} bytes",
                    path.display(),
                    manifest.entries().len(),
                    manifest.file_count(),
                    manifest.total_uncompressed_size()
                );
                self.manifest = Arc::new(manifest);
                self.loaded = true;
                self.status.set_error(String::new());
                true
            }
            Err(e) => {
                log::warn!("Failed to load {}: {e}", path.display());
                self.manifest = Arc::new(ArchiveManifest::default());
                self.loaded = false;
                self.status.set_error(e.to_string());
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        self.manifest.entries()
    }

    pub fn file_count(&self) -> usize {
        self.manifest.file_count()
    }

    pub fn total_uncompressed_size(&self) -> u64 {
        self.manifest.total_uncompressed_size()
    }

    /// Last load or extraction error; empty when the last operation succeeded.
    pub fn error_string(&self) -> String {
        self.status.snapshot().error_string
    }

    pub fn is_extracting(&self) -> bool {
        self.status.is_extracting()
    }

    pub fn status(&self) -> ExtractionStatus {
        self.status.snapshot()
    }

    pub fn watch_status(&self) -> watch::Receiver<ExtractionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExtractionEvent> {
        self.events.subscribe()
    }

    /// Resolves once no extraction is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|s| !s.extracting).await;
    }

    /// Start extracting the whole archive into `destination`.
    ///
    /// Returns `true` once a backend has been launched; the outcome arrives
    /// later as [`ExtractionEvent::Finished`]. On `false` the error has
    /// already been recorded and a failed `Finished` event sent.
    pub async fn extract_all_to(&self, destination: impl AsRef<Path>) -> bool {
        match self.start_extraction(destination.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                let message = e.to_string();
                log::warn!("Extraction not started: {message}");
                self.status.set_error(message.clone());
                let _ = self.events.send(ExtractionEvent::Finished {
                    success: false,
                    message,
                });
                false
            }
        }
    }

    async fn start_extraction(&self, destination: &Path) -> Result<()> {
        if self.status.is_extracting() {
            return Err(ArchiveError::AlreadyExtracting);
        }
        let archive = self.source.clone().ok_or(ArchiveError::NoSource)?;
        if !archive.is_file() {
            return Err(ArchiveError::SourceMissing);
        }
        if destination.as_os_str().is_empty() {
            return Err(ArchiveError::NoDestination);
        }
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(ArchiveError::DestinationUnavailable)?;

        let job = JobSpec {
            archive,
            destination: destination.to_path_buf(),
            manifest: Arc::clone(&self.manifest),
            manifest_loaded: self.loaded,
        };
        let backend = selector::select(selector::ranked_backends(&self.options), &job)?;

        if !self.status.try_begin() {
            return Err(ArchiveError::AlreadyExtracting);
        }
        self.status.reset_progress();
        self.status.set_error(String::new());

        let baseline = DirectoryStats::collect_async(job.destination.clone()).await;
        let started = Instant::now();
        let running = match backend.start(&job) {
            Ok(running) => running,
            Err(e) => {
                self.status.set_extracting(false);
                return Err(e);
            }
        };
        log::info!(
            "Extracting {} to {} with {} ({})",
            job.archive.display(),
            job.destination.display(),
            backend.name(),
            running.mode.label()
        );

        let telemetry = Telemetry::new(
            self.status.clone(),
            self.events.clone(),
            running.mode.clone(),
            self.manifest.total_uncompressed_size(),
            job.destination,
            baseline,
            started,
        );
        tokio::spawn(drive(telemetry, running, self.options.sample_interval));
        Ok(())
    }

    /// Extract a single entry, or a directory and everything below it, into
    /// a fresh session folder for dragging out of the application.
    pub async fn extract_entry_for_drag(
        &self,
        entry_path: &str,
        is_directory: bool,
    ) -> Result<PathBuf> {
        let archive = self.source.as_deref().ok_or(ArchiveError::NoSource)?;
        if !archive.is_file() {
            return Err(ArchiveError::SourceMissing);
        }
        drag::prepare(DragRequest {
            archive,
            manifest: &self.manifest,
            entry_path,
            is_directory,
            drag_root: &self.options.drag_root,
            timeout: self.options.drag_timeout,
        })
        .await
    }

    /// Like [`extract_entry_for_drag`](Self::extract_entry_for_drag), logging
    /// the failure instead of returning it.
    pub async fn prepare_entry_for_external_drag(
        &self,
        entry_path: &str,
        is_directory: bool,
    ) -> Option<PathBuf> {
        match self.extract_entry_for_drag(entry_path, is_directory).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Cannot prepare {entry_path} for drag: {e}");
                None
            }
        }
    }
}

/// Job driver: samples on every tick, feeds output chunks to the parser and
/// finalizes when the backend completes.
async fn drive(mut telemetry: Telemetry, running: RunningJob, interval: Duration) {
    let RunningJob {
        mut output,
        mut completion,
        ..
    } = running;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut output_open = output.is_some();

    let result = loop {
        tokio::select! {
            joined = &mut completion => {
                break joined.unwrap_or_else(|e| Err(ArchiveError::Worker(e.to_string())));
            }
            chunk = next_chunk(&mut output), if output_open => match chunk {
                Some(chunk) => telemetry.apply_output(&chunk),
                None => output_open = false,
            },
            _ = ticker.tick() => telemetry.sample().await,
        }
    };

    if let Some(rx) = output.as_mut() {
        while let Ok(chunk) = rx.try_recv() {
            telemetry.apply_output(&chunk);
        }
    }
    telemetry.finish(result).await;
}

async fn next_chunk(output: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match output {
        Some(rx) => rx.recv().await,
        None => None,
    }
}
