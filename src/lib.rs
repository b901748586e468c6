//! # ziptap
//!
//! A ZIP archive reader with a multi-backend extraction engine and live
//! progress reporting.
//!
//! Listing is done by a small central-directory parser that only reads the
//! tail of the file. Extraction is delegated to the best available backend:
//! a user-configured command, the in-process streaming extractor, or a chain
//! of command-line tools (7-Zip, unzip, tar, PowerShell). Progress is
//! sampled once per second from whatever source the chosen backend offers.
//!
//! ## Features
//!
//! - Manifest with entry names, sizes, DOS timestamps and directory flags
//! - Extraction of STORED and DEFLATE entries without external tools
//! - Custom extractor command with `{zip}` / `{dest}` placeholders
//! - Progress from live counters, tool output or destination sampling
//! - Single-entry extraction into throwaway folders for drag-and-drop
//!
//! ## Example
//!
//! ```no_run
//! use ziptap::{ArchiveReader, ExtractionEvent, ReaderOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut reader = ArchiveReader::new(ReaderOptions::default());
//!     if !reader.set_source("archive.zip").await {
//!         eprintln!("{}", reader.error_string());
//!         return;
//!     }
//!     for entry in reader.entries() {
//!         println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//!     }
//!
//!     let mut events = reader.subscribe();
//!     if reader.extract_all_to("out").await {
//!         while let Ok(event) = events.recv().await {
//!             if let ExtractionEvent::Finished { message, .. } = event {
//!                 println!("{message}");
//!                 break;
//!             }
//!         }
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use config::{ExtractorConfig, ReaderOptions, Settings};
pub use error::{ArchiveError, Result};
pub use extract::{ArchiveReader, ExtractionEvent, ExtractionStatus, ProgressMode, ProgressSample};
pub use crate::io::{LocalFileReader, ReadAt};
pub use crate::zip::{ArchiveEntry, ArchiveManifest, ZipExtractor, load_manifest};
