use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dupedex", version)]
#[command(about = "Index directories by content and find duplicate files", long_about = None)]
pub struct Cli {
    /// Show per-file details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Index location, overriding the configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub index: Option<PathBuf>,

    /// No progress bars or prompts
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index directories; with none given, refresh every indexed bucket
    Scan {
        dirs: Vec<PathBuf>,
        /// Re-hash files that are already indexed
        #[arg(long)]
        rescan: bool,
        /// Also index the members of archives
        #[arg(short, long)]
        archives: bool,
    },
    /// Register a directory as an empty bucket
    Add { dir: PathBuf },
    /// List buckets, or the entries of one bucket
    List { bucket: Option<String> },
    /// Report files under SOURCES that already exist in the index
    Dupes {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Buckets to compare against (default: all)
        #[arg(short, long = "bucket", value_name = "BUCKET")]
        buckets: Vec<String>,
        /// Use indexed digests as they are instead of updating buckets first
        #[arg(long)]
        no_update: bool,
        #[arg(long)]
        rescan: bool,
        #[arg(short, long)]
        archives: bool,
    },
    /// Search indexed file names
    Search {
        pattern: String,
        /// Match anywhere in the name instead of the whole name
        #[arg(short, long)]
        substring: bool,
        #[arg(short = 'i', long)]
        ignore_case: bool,
        /// Match against the full path instead of the file name
        #[arg(long)]
        full_path: bool,
        #[arg(short, long = "bucket", value_name = "BUCKET")]
        buckets: Vec<String>,
    },
    /// Delete a bucket from the index
    Remove {
        bucket: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Move a bucket's entries to a new bucket name
    Rename { old: String, new: String },
    /// Drop entries whose files no longer exist
    Clean { buckets: Vec<String> },
    /// Write a checkpoint of the index
    Backup {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Reclaim space in the index
    Compact,
    /// Bucket counts and sizes
    Stats,
    /// Check the index location, recreating an empty or zero-byte index
    Verify,
    /// Dump a bucket as CSV
    Export {
        bucket: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a CSV dump
    Import {
        input: PathBuf,
        /// Bucket to import into instead of the one named in the file
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
}
