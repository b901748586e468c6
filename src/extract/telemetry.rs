//! Progress sampling for a running extraction.
//!
//! One `Telemetry` lives inside each job's driver task and owns every
//! progress update of the observable [`ExtractionStatus`]. Setters compare
//! before writing, so watchers are only woken by real movement.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use walkdir::WalkDir;

use crate::config::native_path;
use crate::error::Result;
use crate::zip::LiveCounters;

/// Observable state of the reader's extraction side.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionStatus {
    pub extracting: bool,
    pub extracted_bytes: u64,
    pub extracted_files: u64,
    pub progress_percent: f64,
    pub speed_bytes_per_second: f64,
    pub elapsed_seconds: u64,
    /// `-1` while the remaining time cannot be estimated.
    pub eta_seconds: i64,
    pub last_extracted_path: Option<PathBuf>,
    pub error_string: String,
}

impl Default for ExtractionStatus {
    fn default() -> Self {
        Self {
            extracting: false,
            extracted_bytes: 0,
            extracted_files: 0,
            progress_percent: 0.0,
            speed_bytes_per_second: 0.0,
            elapsed_seconds: 0,
            eta_seconds: -1,
            last_extracted_path: None,
            error_string: String::new(),
        }
    }
}

/// Progress figures at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub extracted_bytes: u64,
    pub extracted_files: u64,
    pub progress_percent: f64,
    pub speed_bytes_per_second: f64,
    pub elapsed_seconds: u64,
    pub eta_seconds: i64,
}

impl From<&ExtractionStatus> for ProgressSample {
    fn from(s: &ExtractionStatus) -> Self {
        Self {
            extracted_bytes: s.extracted_bytes,
            extracted_files: s.extracted_files,
            progress_percent: s.progress_percent,
            speed_bytes_per_second: s.speed_bytes_per_second,
            elapsed_seconds: s.elapsed_seconds,
            eta_seconds: s.eta_seconds,
        }
    }
}

/// Notifications pushed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    /// At least one progress figure moved.
    Progress(ProgressSample),
    /// Terminal event of an extraction request.
    Finished { success: bool, message: String },
}

/// Where a job's progress figures come from. Exactly one per job.
#[derive(Debug, Clone)]
pub enum ProgressMode {
    /// Atomic counters bumped by the in-process worker.
    LiveCounters(Arc<LiveCounters>),
    /// Percentages and per-file markers in the subprocess output.
    ProcessOutput,
    /// Growth of the destination directory since the job started.
    DirectorySampling,
}

impl ProgressMode {
    pub fn label(&self) -> &'static str {
        match self {
            ProgressMode::LiveCounters(_) => "live counters",
            ProgressMode::ProcessOutput => "process output",
            ProgressMode::DirectorySampling => "directory sampling",
        }
    }
}

/// Total size and file count below a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub bytes: u64,
    pub files: u64,
}

impl DirectoryStats {
    /// Walk `root` recursively. Entries that vanish or cannot be read while
    /// the walk is in flight are ignored.
    pub fn collect(root: &Path) -> Self {
        let mut stats = Self::default();
        if !root.is_dir() {
            return stats;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                stats.bytes += meta.len();
                stats.files += 1;
            }
        }
        stats
    }

    /// [`collect`](Self::collect) on the blocking pool.
    pub async fn collect_async(root: PathBuf) -> Self {
        tokio::task::spawn_blocking(move || Self::collect(&root))
            .await
            .unwrap_or_default()
    }

    pub fn since(&self, baseline: &DirectoryStats) -> DirectoryStats {
        DirectoryStats {
            bytes: self.bytes.saturating_sub(baseline.bytes),
            files: self.files.saturating_sub(baseline.files),
        }
    }
}

/// What one chunk of extractor output says about progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputProgress {
    pub max_percent: Option<u8>,
    pub file_markers: usize,
}

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,3})%").unwrap());
static FILE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r|\n|^)\s*(?:Extracting|Inflating)\s+").unwrap());

/// Scan a chunk of tool output.
///
/// Progress redraws may repeat or reorder percentages within a chunk, so
/// only the largest one counts. File markers are a heuristic and may not
/// match the true number of files written.
pub fn parse_output_chunk(chunk: &str) -> OutputProgress {
    let max_percent = PERCENT_RE
        .captures_iter(chunk)
        .filter_map(|c| c[1].parse::<u16>().ok())
        .filter(|&p| p <= 100)
        .max()
        .map(|p| p as u8);
    OutputProgress {
        max_percent,
        file_markers: FILE_MARKER_RE.find_iter(chunk).count(),
    }
}

/// Shared handle to the observable status.
#[derive(Debug, Clone)]
pub(crate) struct StatusCell {
    tx: Arc<watch::Sender<ExtractionStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ExtractionStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> ExtractionStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExtractionStatus> {
        self.tx.subscribe()
    }

    pub fn is_extracting(&self) -> bool {
        self.tx.borrow().extracting
    }

    fn update(&self, f: impl FnOnce(&mut ExtractionStatus) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Claim the extraction slot. Fails when a job is already running.
    pub fn try_begin(&self) -> bool {
        self.update(|s| !s.extracting && replace(&mut s.extracting, true))
    }

    pub fn set_extracting(&self, value: bool) -> bool {
        self.update(|s| replace(&mut s.extracting, value))
    }

    pub fn set_error(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(|s| replace(&mut s.error_string, value))
    }

    pub fn set_last_extracted_path(&self, value: &Path) -> bool {
        self.update(|s| {
            if s.last_extracted_path.as_deref() == Some(value) {
                return false;
            }
            s.last_extracted_path = Some(value.to_path_buf());
            true
        })
    }

    /// Zero every progress figure for a new job.
    pub fn reset_progress(&self) -> bool {
        self.update(|s| {
            let mut changed = replace(&mut s.extracted_bytes, 0);
            changed |= replace(&mut s.extracted_files, 0);
            changed |= replace_f64(&mut s.progress_percent, 0.0);
            changed |= replace_f64(&mut s.speed_bytes_per_second, 0.0);
            changed |= replace(&mut s.elapsed_seconds, 0);
            changed |= replace(&mut s.eta_seconds, -1);
            changed
        })
    }

    /// Raise the byte count; a smaller reading is ignored.
    pub fn advance_bytes(&self, value: u64) -> bool {
        self.update(|s| value > s.extracted_bytes && replace(&mut s.extracted_bytes, value))
    }

    pub fn advance_files(&self, value: u64) -> bool {
        self.update(|s| value > s.extracted_files && replace(&mut s.extracted_files, value))
    }

    /// Raise the percentage, clamped to `0..=100`.
    pub fn advance_percent(&self, value: f64) -> bool {
        let value = value.clamp(0.0, 100.0);
        self.update(|s| value > s.progress_percent && replace_f64(&mut s.progress_percent, value))
    }

    pub fn set_speed(&self, value: f64) -> bool {
        self.update(|s| replace_f64(&mut s.speed_bytes_per_second, value.max(0.0)))
    }

    pub fn set_elapsed(&self, value: u64) -> bool {
        self.update(|s| replace(&mut s.elapsed_seconds, value))
    }

    pub fn set_eta(&self, value: i64) -> bool {
        self.update(|s| replace(&mut s.eta_seconds, value))
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn replace_f64(slot: &mut f64, value: f64) -> bool {
    if (*slot - value).abs() < 1e-9 {
        return false;
    }
    *slot = value;
    true
}

/// Per-job sampler.
pub(crate) struct Telemetry {
    status: StatusCell,
    events: broadcast::Sender<ExtractionEvent>,
    mode: ProgressMode,
    total_bytes: u64,
    destination: PathBuf,
    baseline: DirectoryStats,
    started: Instant,
}

impl Telemetry {
    pub fn new(
        status: StatusCell,
        events: broadcast::Sender<ExtractionEvent>,
        mode: ProgressMode,
        total_bytes: u64,
        destination: PathBuf,
        baseline: DirectoryStats,
        started: Instant,
    ) -> Self {
        Self {
            status,
            events,
            mode,
            total_bytes,
            destination,
            baseline,
            started,
        }
    }

    /// Timer tick: refresh figures from the job's progress source.
    pub async fn sample(&mut self) {
        let mut changed = match &self.mode {
            ProgressMode::LiveCounters(counters) => {
                let (bytes, files) = (counters.bytes(), counters.files());
                self.apply_counts(bytes, files)
            }
            ProgressMode::ProcessOutput => false,
            ProgressMode::DirectorySampling => {
                let now = DirectoryStats::collect_async(self.destination.clone()).await;
                let delta = now.since(&self.baseline);
                self.apply_counts(delta.bytes, delta.files)
            }
        };
        changed |= self.update_derived();
        self.publish(changed);
    }

    /// A chunk of subprocess output arrived.
    pub fn apply_output(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let parsed = parse_output_chunk(chunk);
        let mut changed = false;
        if let Some(pct) = parsed.max_percent {
            changed |= self.status.advance_percent(pct as f64);
            if self.total_bytes > 0 {
                changed |= self
                    .status
                    .advance_bytes(self.total_bytes * pct as u64 / 100);
            }
        }
        if parsed.file_markers > 0 {
            let files = self.status.snapshot().extracted_files + parsed.file_markers as u64;
            changed |= self.status.advance_files(files);
        }
        changed |= self.update_derived();
        self.publish(changed);
    }

    fn apply_counts(&self, bytes: u64, files: u64) -> bool {
        let mut changed = self.status.advance_bytes(bytes);
        changed |= self.status.advance_files(files);
        if self.total_bytes > 0 {
            changed |= self
                .status
                .advance_percent(bytes as f64 * 100.0 / self.total_bytes as f64);
        }
        changed
    }

    /// Recompute elapsed time, speed and ETA.
    fn update_derived(&self) -> bool {
        let elapsed = self.started.elapsed().as_secs();
        let bytes = self.status.snapshot().extracted_bytes;
        let (speed, eta) = derive_rate(bytes, self.total_bytes, elapsed);
        let mut changed = self.status.set_elapsed(elapsed);
        changed |= self.status.set_speed(speed);
        changed |= self.status.set_eta(eta);
        changed
    }

    /// Final sample, terminal status and the `Finished` event.
    ///
    /// `extracting` drops last, so anyone woken by it sees final figures.
    pub async fn finish(mut self, result: Result<()>) {
        self.sample().await;
        let (success, message) = match result {
            Ok(()) => {
                self.status.advance_percent(100.0);
                self.status.set_last_extracted_path(&self.destination);
                (true, format!("Extracted to: {}", native_path(&self.destination)))
            }
            Err(e) => (false, e.to_string()),
        };
        if success {
            log::info!("{message}");
        } else {
            log::warn!("Extraction failed: {message}");
        }

        self.status.set_eta(0);
        self.status
            .set_error(if success { String::new() } else { message.clone() });
        self.publish(true);
        self.status.set_extracting(false);
        let _ = self.events.send(ExtractionEvent::Finished { success, message });
    }

    fn publish(&self, changed: bool) {
        if changed {
            let sample = ProgressSample::from(&self.status.snapshot());
            let _ = self.events.send(ExtractionEvent::Progress(sample));
        }
    }
}

/// Speed in bytes per second and ETA in seconds (`-1` when unknown).
pub fn derive_rate(bytes: u64, total: u64, elapsed_secs: u64) -> (f64, i64) {
    if elapsed_secs == 0 {
        return (0.0, -1);
    }
    let speed = bytes as f64 / elapsed_secs as f64;
    let eta = if total == 0 {
        -1
    } else if speed > 0.0 && bytes < total {
        ((total - bytes) as f64 / speed) as i64
    } else {
        0
    };
    (speed, eta)
}
