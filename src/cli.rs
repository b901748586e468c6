use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ziptap")]
#[command(version)]
#[command(about = "List and extract ZIP archives with live progress", long_about = None)]
#[command(after_help = "Examples:\n  \
  ziptap list -l data.zip                      list entries with sizes and dates\n  \
  ziptap extract data.zip -d out               extract with the best available backend\n  \
  ziptap extract data.zip -d out --extractor 7zz --extractor-args \"x -y -o{dest} {zip}\"\n  \
  ziptap drag data.zip docs --dir              extract one folder into a temp session")]
pub struct Cli {
    /// Settings file (default: $ZIPTAP_CONFIG or <config dir>/ziptap/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log more (-v info, -vv debug)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List archive entries
    List {
        /// ZIP file path
        #[arg(value_name = "ZIP")]
        file: PathBuf,

        /// Show sizes, method and timestamps
        #[arg(short = 'l', long)]
        long: bool,
    },

    /// Extract the whole archive
    Extract {
        /// ZIP file path
        #[arg(value_name = "ZIP")]
        file: PathBuf,

        /// Destination folder
        #[arg(short = 'd', value_name = "DIR")]
        dest: PathBuf,

        /// Custom extractor program ({zip} and {dest} are substituted)
        #[arg(long, value_name = "PROG")]
        extractor: Option<String>,

        /// Argument template for the custom extractor
        #[arg(long, value_name = "TEMPLATE", allow_hyphen_values = true)]
        extractor_args: Option<String>,

        /// Never use the built-in streaming extractor
        #[arg(long)]
        no_in_process: bool,

        /// No progress output
        #[arg(short = 'q')]
        quiet: bool,
    },

    /// Extract one entry into a temporary session folder and print its path
    Drag {
        /// ZIP file path
        #[arg(value_name = "ZIP")]
        file: PathBuf,

        /// Entry path inside the archive
        #[arg(value_name = "ENTRY")]
        entry: String,

        /// Treat ENTRY as a directory and take everything below it
        #[arg(long = "dir")]
        is_directory: bool,
    },
}

impl Cli {
    /// Log filter implied by `-v`.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
