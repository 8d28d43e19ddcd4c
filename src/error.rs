use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of a counting run. Malformed lines never surface here,
/// they are skipped inside the dispatch stage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot memory-map {}: {source}", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at byte offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("cannot allocate {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("no newline within {capacity} bytes starting at byte offset {offset}")]
    LineTooLong { offset: u64, capacity: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("a worker thread panicked")]
    WorkerPanicked,

    #[error("dispatch queue closed while input remained")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
