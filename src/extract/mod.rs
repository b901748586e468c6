//! Asynchronous extraction with live progress.
//!
//! - [`engine`]: [`ArchiveReader`], the single-job extraction engine
//! - [`selector`]: backend ranking (custom command, in-process, command-line chain)
//! - [`backend`]: the backends and subprocess plumbing
//! - [`telemetry`]: status, events and progress sampling
//! - [`drag`]: single-entry extraction into per-request session folders

pub mod backend;
pub mod drag;
mod engine;
pub mod selector;
pub mod telemetry;

pub use backend::CliTool;
pub use engine::ArchiveReader;
pub use telemetry::{
    DirectoryStats, ExtractionEvent, ExtractionStatus, ProgressMode, ProgressSample,
    parse_output_chunk,
};
