//! One counting run: open the input, pick the strategies, scan, aggregate.
//!
//! All state lives in the run. The index is allocated when the run starts
//! and dropped when it returns; only the [`RunReport`] survives.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::{Duration, Instant};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::bitset::{AtomicBitSet, MutexBitSet, PresenceIndex, UnsyncBitSet, INDEX_BYTES};
use crate::dispatch::{Dispatch, Inline, WorkerPool, DEFAULT_QUEUE_DEPTH};
use crate::error::{Error, Result};
use crate::reader::{ChunkedLineReader, DEFAULT_CHUNK_SIZE, MAX_LINE_LEN};

/// How writers synchronize on the presence index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    #[default]
    Atomic,
    Mutex,
    /// Plain OR; only valid with [`DispatchKind::Inline`].
    Unsync,
}

/// Where regions are parsed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    #[default]
    Pool,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub chunk_size: usize,
    pub max_line_len: usize,
    pub workers: usize,
    pub queue_depth: usize,
    pub index: IndexKind,
    pub dispatch: DispatchKind,
    /// Map the file instead of reading it. The mapping is only another
    /// byte source: regions are still copied through the reader buffer, and
    /// again into the worker queue, so this saves read syscalls, not copies.
    pub mmap: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_len: MAX_LINE_LEN,
            workers: num_cpus::get(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            index: IndexKind::default(),
            dispatch: DispatchKind::default(),
            mmap: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.index == IndexKind::Unsync && self.dispatch == DispatchKind::Pool {
            return Err(Error::InvalidConfig(
                "the unsync index cannot be shared with a worker pool".into(),
            ));
        }
        if self.dispatch == DispatchKind::Pool && self.workers == 0 {
            return Err(Error::InvalidConfig("worker count must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Distinct addresses seen.
    pub distinct: u64,
    /// Lines read, malformed ones included.
    pub lines: u64,
    /// Lines skipped because they did not parse.
    pub malformed: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Counts distinct addresses in the file at `path`.
pub fn count_distinct(path: impl AsRef<Path>, config: &Config) -> Result<RunReport> {
    let path = path.as_ref();
    let open_error = |source| Error::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(open_error)?;

    if !config.mmap {
        return count_distinct_in(file, config);
    }

    if file.metadata().map_err(open_error)?.len() == 0 {
        return count_distinct_in(io::empty(), config);
    }
    // SAFETY: the input must not be truncated while mapped; this is a
    // read-only batch over a local file.
    let map = unsafe { Mmap::map(&file) }.map_err(|source| Error::Map {
        path: path.to_path_buf(),
        source,
    })?;
    advise_sequential(&map);
    count_distinct_in(&map[..], config)
}

#[cfg(unix)]
fn advise_sequential(map: &Mmap) {
    if let Err(error) = map.advise(memmap2::Advice::Sequential) {
        debug!(?error, "madvise failed");
    }
}

#[cfg(not(unix))]
fn advise_sequential(_map: &Mmap) {}

/// Counts distinct addresses read from `source`.
pub fn count_distinct_in<R: Read>(source: R, config: &Config) -> Result<RunReport> {
    config.validate()?;
    let reader = ChunkedLineReader::new(source, config.chunk_size, config.max_line_len)?;
    debug!(bytes = INDEX_BYTES, index = ?config.index, "allocating presence index");

    let pool = WorkerPool::new(config.workers, config.queue_depth);
    match (config.index, config.dispatch) {
        (IndexKind::Atomic, DispatchKind::Pool) => scan(reader, &AtomicBitSet::new()?, &pool),
        (IndexKind::Atomic, DispatchKind::Inline) => scan(reader, &AtomicBitSet::new()?, &Inline),
        (IndexKind::Mutex, DispatchKind::Pool) => scan(reader, &MutexBitSet::new()?, &pool),
        (IndexKind::Mutex, DispatchKind::Inline) => scan(reader, &MutexBitSet::new()?, &Inline),
        (IndexKind::Unsync, DispatchKind::Inline) => {
            scan(reader, &UnsyncBitSet::new()?, &Inline)
        }
        (IndexKind::Unsync, DispatchKind::Pool) => Err(Error::InvalidConfig(
            "the unsync index cannot be shared with a worker pool".into(),
        )),
    }
}

/// Runs `dispatch` over the reader, then counts the index.
pub fn scan<R, I, D>(reader: ChunkedLineReader<R>, index: &I, dispatch: &D) -> Result<RunReport>
where
    R: Read,
    I: PresenceIndex,
    D: Dispatch<I>,
{
    let start = Instant::now();
    let stats = dispatch.run(reader, index)?;
    let report = RunReport {
        distinct: aggregate(index),
        lines: stats.lines,
        malformed: stats.malformed,
        bytes: stats.bytes,
        elapsed: start.elapsed(),
    };
    info!(
        bytes = report.bytes,
        lines = report.lines,
        malformed = report.malformed,
        distinct = report.distinct,
        elapsed = ?report.elapsed,
        "scan complete"
    );
    Ok(report)
}

/// Final distinct count. Only call once every writer has been joined.
pub fn aggregate<I: PresenceIndex + ?Sized>(index: &I) -> u64 {
    index.count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn config(index: IndexKind, dispatch: DispatchKind) -> Config {
        Config {
            chunk_size: 32,
            workers: 2,
            index,
            dispatch,
            ..Config::default()
        }
    }

    #[test]
    fn unsync_pool_is_rejected() {
        let config = config(IndexKind::Unsync, DispatchKind::Pool);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            count_distinct_in(Cursor::new(b"1.1.1.1\n"), &config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = Config {
            workers: 0,
            ..config(IndexKind::Atomic, DispatchKind::Pool)
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn every_strategy_agrees() {
        let input = b"1.2.3.4\n1.2.3.4\n5.6.7.8\nbogus\n0.0.0.0\n255.255.255.255";
        for (index, dispatch) in [
            (IndexKind::Atomic, DispatchKind::Pool),
            (IndexKind::Atomic, DispatchKind::Inline),
            (IndexKind::Mutex, DispatchKind::Pool),
            (IndexKind::Mutex, DispatchKind::Inline),
            (IndexKind::Unsync, DispatchKind::Inline),
        ] {
            let report = count_distinct_in(Cursor::new(input), &config(index, dispatch)).unwrap();
            assert_eq!(report.distinct, 4, "{index:?} / {dispatch:?}");
            assert_eq!(report.lines, 6);
            assert_eq!(report.malformed, 1);
            assert_eq!(report.bytes, input.len() as u64);
        }
    }

    #[test]
    fn aggregate_counts_index() {
        let index = UnsyncBitSet::new().unwrap();
        index.set(7);
        index.set(7);
        index.set(u32::MAX);
        assert_eq!(aggregate(&index), 2);
    }
}
