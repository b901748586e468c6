//! Main entry point for the ziptap CLI application.

use anyhow::{Result, bail};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

use ziptap::cli::Command;
use ziptap::{
    ArchiveReader, Cli, ExtractionEvent, ExtractorConfig, ProgressSample, ReaderOptions, Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    let options = ReaderOptions {
        extractor: ExtractorConfig::resolve(&settings),
        ..ReaderOptions::default()
    };

    match cli.command {
        Command::List { file, long } => list(options, file, long).await,
        Command::Extract {
            file,
            dest,
            extractor,
            extractor_args,
            no_in_process,
            quiet,
        } => {
            let mut options = options;
            if let Some(program) = extractor {
                options.extractor = ExtractorConfig::new(program, extractor_args.unwrap_or_default());
            }
            options.in_process = !no_in_process;
            extract(options, file, &dest, quiet).await
        }
        Command::Drag {
            file,
            entry,
            is_directory,
        } => drag(options, file, &entry, is_directory).await,
    }
}

async fn open(options: ReaderOptions, file: PathBuf) -> Result<ArchiveReader> {
    let mut reader = ArchiveReader::new(options);
    if !reader.set_source(file).await {
        bail!("{}", reader.error_string());
    }
    Ok(reader)
}

/// Print the manifest, optionally as a table with a totals line.
async fn list(options: ReaderOptions, file: PathBuf, long: bool) -> Result<()> {
    let reader = open(options, file).await?;

    if !long {
        for entry in reader.entries() {
            println!("{}", entry.name);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:<7}  {:<19}  Name",
        "Length", "Size", "Method", "Modified"
    );
    println!("{}", "-".repeat(70));
    for entry in reader.entries() {
        let compressed = entry
            .compressed_size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10}  {:>10}  {:<7}  {:<19}  {}",
            entry.uncompressed_size,
            compressed,
            entry.compression_method().label(),
            entry.modified_iso(),
            entry.name
        );
    }
    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {} files, {} entries",
        reader.total_uncompressed_size(),
        reader.file_count(),
        reader.entries().len()
    );
    Ok(())
}

/// Run a full extraction and render progress until it finishes.
async fn extract(options: ReaderOptions, file: PathBuf, dest: &Path, quiet: bool) -> Result<()> {
    let reader = open(options, file).await?;
    let mut events = reader.subscribe();

    if !reader.extract_all_to(dest).await {
        bail!("{}", reader.error_string());
    }

    loop {
        match events.recv().await {
            Ok(ExtractionEvent::Progress(sample)) => {
                if !quiet {
                    render_progress(&sample);
                }
            }
            Ok(ExtractionEvent::Finished { success, message }) => {
                if !quiet {
                    eprintln!();
                }
                if !success {
                    bail!("{message}");
                }
                println!("{message}");
                return Ok(());
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("Extraction ended without a result"),
        }
    }
}

async fn drag(options: ReaderOptions, file: PathBuf, entry: &str, is_directory: bool) -> Result<()> {
    let reader = open(options, file).await?;
    let path = reader.extract_entry_for_drag(entry, is_directory).await?;
    println!("{}", path.display());
    Ok(())
}

fn render_progress(sample: &ProgressSample) {
    let eta = if sample.eta_seconds < 0 {
        "--".to_string()
    } else {
        format!("{}s", sample.eta_seconds)
    };
    eprint!(
        "\r{:>5.1}%  {:>12}  {:>3} files  {:>12}/s  ETA {:<8}",
        sample.progress_percent,
        format_size(sample.extracted_bytes),
        sample.extracted_files,
        format_size(sample.speed_bytes_per_second as u64),
        eta
    );
    let _ = std::io::stderr().flush();
}

/// Format a byte size into a human-readable string.
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
