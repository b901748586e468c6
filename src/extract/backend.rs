//! Extraction backends.
//!
//! A backend is probed once per request and, when chosen, started once. A
//! started backend hands back a [`RunningJob`]: the task that completes with
//! the job's outcome, the progress mode the job reports through, and for
//! subprocesses the stream of output chunks.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::telemetry::ProgressMode;
use crate::config::{CustomCommand, ExtractorConfig, native_path};
use crate::error::{ArchiveError, Result};
use crate::io::LocalFileReader;
use crate::zip::{ArchiveManifest, LiveCounters, ManifestOrigin, ZipExtractor};

/// Message reported when a failed command wrote nothing to stderr.
const GENERIC_FAILURE: &str = "Extraction failed.";

/// Everything a backend needs to know about one extraction request.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub archive: PathBuf,
    pub destination: PathBuf,
    pub manifest: Arc<ArchiveManifest>,
    /// Whether `manifest` came from a successful load of `archive`.
    pub manifest_loaded: bool,
}

/// Result of probing a backend.
#[derive(Debug)]
pub enum Probe {
    Ready,
    /// Not usable here; try the next one.
    Unavailable,
    /// Stop selecting and fail the request.
    Fatal(ArchiveError),
}

/// A started extraction.
pub struct RunningJob {
    pub mode: ProgressMode,
    pub output: Option<mpsc::UnboundedReceiver<String>>,
    pub completion: JoinHandle<Result<()>>,
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn probe(&self, job: &JobSpec) -> Probe;

    /// Launch the job. Launch failures are returned here, never through
    /// the completion task.
    fn start(&self, job: &JobSpec) -> Result<RunningJob>;
}

/// The user's own extraction command.
pub struct CustomCommandBackend {
    config: ExtractorConfig,
}

impl CustomCommandBackend {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn command(&self, job: &JobSpec) -> Result<Option<CustomCommand>> {
        self.config.command_for(&job.archive, &job.destination)
    }
}

impl Backend for CustomCommandBackend {
    fn name(&self) -> &str {
        "custom"
    }

    fn probe(&self, job: &JobSpec) -> Probe {
        match self.command(job) {
            Ok(Some(_)) => Probe::Ready,
            Ok(None) => Probe::Unavailable,
            Err(e) => Probe::Fatal(e),
        }
    }

    fn start(&self, job: &JobSpec) -> Result<RunningJob> {
        let Some(command) = self.command(job)? else {
            return Err(ArchiveError::NoBackend);
        };
        log::info!(
            "Running custom extractor {} {:?}",
            command.program.display(),
            command.args
        );
        spawn_process(&command.program, &command.args, ProgressMode::DirectorySampling)
    }
}

/// Streaming extraction on the runtime's worker threads.
pub struct InProcessBackend;

impl Backend for InProcessBackend {
    fn name(&self) -> &str {
        "in-process"
    }

    fn probe(&self, job: &JobSpec) -> Probe {
        let streamable = job.manifest_loaded
            && job.manifest.origin() == ManifestOrigin::CentralDirectory
            && job
                .manifest
                .entries()
                .iter()
                .all(ZipExtractor::<LocalFileReader>::can_stream);
        if streamable {
            Probe::Ready
        } else {
            Probe::Unavailable
        }
    }

    fn start(&self, job: &JobSpec) -> Result<RunningJob> {
        let reader = LocalFileReader::new(&job.archive).map_err(ArchiveError::Open)?;
        let counters = Arc::new(LiveCounters::default());

        let worker_counters = Arc::clone(&counters);
        let manifest = Arc::clone(&job.manifest);
        let destination = job.destination.clone();
        let completion = tokio::spawn(async move {
            let extractor = ZipExtractor::new(Arc::new(reader));
            let written = extractor
                .extract_all(manifest.entries(), &destination, &worker_counters)
                .await?;
            log::debug!("In-process extraction wrote {written} entries");
            Ok::<(), ArchiveError>(())
        });

        Ok(RunningJob {
            mode: ProgressMode::LiveCounters(counters),
            output: None,
            completion,
        })
    }
}

/// Command-line extractors tried after the in-process backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliTool {
    SevenZip,
    Tar,
    PowerShell,
    Unzip,
}

impl CliTool {
    /// Platform order of the command-line chain.
    pub fn chain() -> &'static [CliTool] {
        if cfg!(windows) {
            &[CliTool::SevenZip, CliTool::Tar, CliTool::PowerShell]
        } else {
            // GNU tar does not read ZIP, so unzip goes ahead of it.
            &[CliTool::SevenZip, CliTool::Unzip, CliTool::Tar]
        }
    }

    fn candidates(self) -> &'static [&'static str] {
        match self {
            CliTool::SevenZip => &["7z", "7za", "7zz"],
            CliTool::Tar => &["tar"],
            CliTool::PowerShell => &["powershell", "pwsh"],
            CliTool::Unzip => &["unzip"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CliTool::SevenZip => "7z",
            CliTool::Tar => "tar",
            CliTool::PowerShell => "powershell",
            CliTool::Unzip => "unzip",
        }
    }

    /// First candidate binary on `PATH`.
    pub fn locate(self) -> Option<PathBuf> {
        self.candidates()
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    /// Only 7-Zip prints usable progress.
    pub fn reports_progress(self) -> bool {
        self == CliTool::SevenZip
    }

    /// Arguments for a full extraction of `zip` into `dest`.
    pub fn full_extraction_args(self, zip: &Path, dest: &Path) -> Vec<String> {
        let zip = native_path(zip);
        let dest = native_path(dest);
        match self {
            CliTool::SevenZip => vec![
                "x".into(),
                "-y".into(),
                "-bsp1".into(),
                "-bso1".into(),
                "-bse1".into(),
                format!("-o{dest}"),
                zip,
            ],
            CliTool::Tar => vec!["-xf".into(), zip, "-C".into(), dest],
            CliTool::PowerShell => vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-Command".into(),
                format!(
                    "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
                    ps_quote(&zip),
                    ps_quote(&dest)
                ),
            ],
            CliTool::Unzip => vec!["-o".into(), zip, "-d".into(), dest],
        }
    }
}

fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}

pub struct CliBackend {
    tool: CliTool,
}

impl CliBackend {
    pub fn new(tool: CliTool) -> Self {
        Self { tool }
    }
}

impl Backend for CliBackend {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn probe(&self, _job: &JobSpec) -> Probe {
        match self.tool.locate() {
            Some(_) => Probe::Ready,
            None => Probe::Unavailable,
        }
    }

    fn start(&self, job: &JobSpec) -> Result<RunningJob> {
        let program = self.tool.locate().ok_or(ArchiveError::NoBackend)?;
        let args = self
            .tool
            .full_extraction_args(&job.archive, &job.destination);
        let mode = if self.tool.reports_progress() {
            ProgressMode::ProcessOutput
        } else {
            ProgressMode::DirectorySampling
        };
        log::info!("Running {} {:?}", program.display(), args);
        spawn_process(&program, &args, mode)
    }
}

/// Spawn an extractor process and a task that waits for it.
///
/// Both pipes are always drained. Output chunks are forwarded only when the
/// job reports progress through them, and stderr becomes the failure
/// message on a non-zero exit.
pub(crate) fn spawn_process(program: &Path, args: &[String], mode: ProgressMode) -> Result<RunningJob> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ArchiveError::Launch)?;

    let (tx, output) = if matches!(mode, ProgressMode::ProcessOutput) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let completion = tokio::spawn(async move {
        let (_, stderr_text, status) = tokio::join!(
            pump(stdout, tx.clone()),
            pump(stderr, tx),
            child.wait()
        );
        let status = match status {
            Ok(status) => status,
            Err(e) => return Err(ArchiveError::Io(e)),
        };
        if status.success() {
            return Ok(());
        }
        log::debug!("Extractor exited with {status}");
        let message = stderr_text.trim();
        Err(ArchiveError::BackendFailed(if message.is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            message.to_string()
        }))
    });

    Ok(RunningJob {
        mode,
        output,
        completion,
    })
}

/// Read a pipe to its end, forwarding chunks and returning everything read.
async fn pump<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    tx: Option<mpsc::UnboundedSender<String>>,
) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut collected = String::new();
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if let Some(tx) = &tx {
                    let _ = tx.send(chunk.clone());
                }
                collected.push_str(&chunk);
            }
        }
    }
    collected
}
