//! Command-line arguments for the counter binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::dispatch::DEFAULT_QUEUE_DEPTH;
use crate::pipeline::{Config, DispatchKind, IndexKind};
use crate::reader::{DEFAULT_CHUNK_SIZE, MAX_LINE_LEN};

/// Count distinct IPv4 addresses in a file with one address per line
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input file
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Bytes read from the file per chunk
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Number of worker threads (default: auto-detect)
    #[arg(short = 't', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Chunks waiting for a worker before the reader blocks
    #[arg(long, value_name = "N", default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Synchronization of the presence index
    #[arg(long, value_enum, default_value_t = CliIndex::Atomic)]
    pub index: CliIndex,

    /// Where chunks are parsed
    #[arg(long, value_enum, default_value_t = CliDispatch::Pool)]
    pub dispatch: CliDispatch,

    /// Memory-map the input instead of reading it
    #[arg(long)]
    pub mmap: bool,

    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliIndex {
    /// Lock-free compare-and-swap
    Atomic,
    /// One mutex around the whole index
    Mutex,
    /// No synchronization, requires --dispatch inline
    Unsync,
}

impl From<CliIndex> for IndexKind {
    fn from(index: CliIndex) -> Self {
        match index {
            CliIndex::Atomic => IndexKind::Atomic,
            CliIndex::Mutex => IndexKind::Mutex,
            CliIndex::Unsync => IndexKind::Unsync,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDispatch {
    /// Bounded queue feeding worker threads
    Pool,
    /// Parse on the reading thread
    Inline,
}

impl From<CliDispatch> for DispatchKind {
    fn from(dispatch: CliDispatch) -> Self {
        match dispatch {
            CliDispatch::Pool => DispatchKind::Pool,
            CliDispatch::Inline => DispatchKind::Inline,
        }
    }
}

impl Args {
    pub fn config(&self) -> Config {
        Config {
            chunk_size: self.chunk_size,
            max_line_len: MAX_LINE_LEN,
            workers: self.workers.unwrap_or_else(num_cpus::get),
            queue_depth: self.queue_depth,
            index: self.index.into(),
            dispatch: self.dispatch.into(),
            mmap: self.mmap,
        }
    }

    /// Default `tracing` filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
