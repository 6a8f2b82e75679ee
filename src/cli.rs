//! CLI argument parsing for fsprobe

use crate::invocation::OperationKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fsprobe")]
#[command(version)]
#[command(
    about = "Storage filesystem client that benchmarks the operations it performs",
    long_about = None
)]
pub struct Cli {
    /// Local directory backing the filesystem
    #[arg(long, env = "FSPROBE_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Configuration file (defaults to $FSPROBE_CONFIG)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Measure the next eligible operation
    #[arg(long, conflicts_with = "no_bench", global = true)]
    pub bench: bool,

    /// Never measure, whatever the configuration says
    #[arg(long = "no-bench", global = true)]
    pub no_bench: bool,

    /// Write a JSON report for every measurement run into DIR
    #[arg(long = "report-dir", value_name = "DIR", global = true)]
    pub report_dir: Option<PathBuf>,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Benchmark override from `--bench` / `--no-bench`
    pub fn bench_override(&self) -> Option<bool> {
        match (self.bench, self.no_bench) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory (or show a single file)
    Ls { path: String },

    /// Show the status of a path
    Stat { path: String },

    /// Rename SRC to DST
    Mv { src: String, dst: String },

    /// Delete a path
    Rm {
        path: String,

        /// Delete directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create a file
    Touch {
        path: String,

        /// Bytes to write into the new file
        #[arg(long)]
        content: Option<String>,

        /// Fail if the file already exists
        #[arg(long = "no-overwrite")]
        no_overwrite: bool,

        /// Permission bits in octal
        #[arg(long, default_value = "644", value_parser = parse_octal)]
        permission: u32,

        #[arg(long = "buffer-size", default_value_t = crate::fs::DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,

        #[arg(long, default_value_t = crate::fs::DEFAULT_REPLICATION)]
        replication: u16,

        #[arg(long = "block-size", default_value_t = crate::fs::DEFAULT_BLOCK_SIZE)]
        block_size: u64,
    },

    /// Print a file to stdout
    Cat {
        path: String,

        #[arg(long = "buffer-size", default_value_t = crate::fs::DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },

    /// Copy a local file into the filesystem
    Put {
        local: PathBuf,
        dst: String,

        /// Replace an existing destination
        #[arg(short, long)]
        force: bool,

        /// Remove the local file after copying
        #[arg(long = "delete-source")]
        delete_source: bool,
    },

    /// Run one measurement in this process and print the JSON report
    #[command(hide = true)]
    Measure {
        #[arg(long, value_enum)]
        kind: OperationKind,

        /// Benchmark parameter as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Untimed warmup iterations (defaults to the configuration)
        #[arg(long)]
        warmup: Option<u32>,

        /// Timed iterations (defaults to the configuration)
        #[arg(long)]
        iterations: Option<u32>,

        #[arg(long = "scratch-dir")]
        scratch_dir: Option<String>,

        /// Write the report here instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn parse_octal(raw: &str) -> Result<u32, String> {
    u32::from_str_radix(raw, 8).map_err(|e| format!("invalid octal permission '{raw}': {e}"))
}
