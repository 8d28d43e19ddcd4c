//! Feeding regions from the reader into the presence index.
//!
//! [`Inline`] processes each region on the reader thread. [`WorkerPool`]
//! copies each region into a bounded queue consumed by a fixed set of
//! worker threads; a full queue blocks the reader until a worker catches up.
//! Both drain every region before `run` returns, so the index can be
//! counted afterwards without racing a writer.

use std::io::Read;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, warn};

use crate::bitset::PresenceIndex;
use crate::error::{Error, Result};
use crate::lines::for_each_line;
use crate::parse::parse_ipv4;
use crate::reader::ChunkedLineReader;

/// Default number of regions waiting in the worker queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

/// Tallies for a scan. `distinct` is not here, it comes from the index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub bytes: u64,
    pub lines: u64,
    pub malformed: u64,
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.bytes += other.bytes;
        self.lines += other.lines;
        self.malformed += other.malformed;
    }
}

/// Parses every line of `region` and marks its key in `index`.
///
/// Malformed lines are logged and skipped.
pub fn process_region<I>(region: &[u8], index: &I, stats: &mut ScanStats)
where
    I: PresenceIndex + ?Sized,
{
    for_each_line(region, |line| {
        stats.lines += 1;
        match parse_ipv4(line) {
            Ok(key) => index.set(key),
            Err(error) => {
                stats.malformed += 1;
                warn!(line = %line.escape_ascii(), %error, "skipping malformed line");
            }
        }
    });
}

/// Strategy for running a scan against an index.
pub trait Dispatch<I: PresenceIndex> {
    /// Consumes the reader to its end. Every write to `index` has completed
    /// when this returns.
    fn run<R: Read>(&self, reader: ChunkedLineReader<R>, index: &I) -> Result<ScanStats>;
}

/// Everything on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl<I: PresenceIndex> Dispatch<I> for Inline {
    fn run<R: Read>(&self, reader: ChunkedLineReader<R>, index: &I) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let bytes = reader.for_each_region(|region| {
            process_region(region, index, &mut stats);
            Ok(())
        })?;
        stats.bytes = bytes;
        Ok(stats)
    }
}

/// Reader on the calling thread, parsing on `workers` scoped threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    pub workers: usize,
    pub queue_depth: usize,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_depth,
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(num_cpus::get(), DEFAULT_QUEUE_DEPTH)
    }
}

impl<I: PresenceIndex + Sync> Dispatch<I> for WorkerPool {
    fn run<R: Read>(&self, reader: ChunkedLineReader<R>, index: &I) -> Result<ScanStats> {
        let (tx, rx) = bounded::<Vec<u8>>(self.queue_depth);
        debug!(
            workers = self.workers,
            queue_depth = self.queue_depth,
            buffer = reader.capacity(),
            "starting worker pool"
        );

        // Raised by a worker that panics, so the reader stops early.
        let failed = AtomicBool::new(false);

        thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|id| {
                    let rx = rx.clone();
                    let failed = &failed;
                    s.spawn(move || worker(id, rx, index, failed))
                })
                .collect();
            drop(rx);

            // The buffer is reused by the next read, so each region is copied.
            let read = reader.for_each_region(|region| {
                if failed.load(Ordering::Relaxed) {
                    return Err(Error::WorkerPanicked);
                }
                tx.send(region.to_vec()).map_err(|_| Error::QueueClosed)
            });
            // Closing the queue lets the workers drain and exit.
            drop(tx);

            let mut stats = ScanStats::default();
            let mut panicked = false;
            for handle in handles {
                match handle.join() {
                    Ok(worker_stats) => stats += worker_stats,
                    Err(_) => panicked = true,
                }
            }
            if panicked {
                return Err(Error::WorkerPanicked);
            }
            stats.bytes = read?;
            Ok(stats)
        })
    }
}

/// Sets the flag if the owning thread unwinds.
struct PanicFlag<'a>(&'a AtomicBool);

impl Drop for PanicFlag<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Relaxed);
        }
    }
}

fn worker<I>(id: usize, regions: Receiver<Vec<u8>>, index: &I, failed: &AtomicBool) -> ScanStats
where
    I: PresenceIndex + ?Sized,
{
    let _flag = PanicFlag(failed);
    raise_priority();
    let mut stats = ScanStats::default();
    for region in regions {
        process_region(&region, index, &mut stats);
    }
    debug!(
        worker = id,
        lines = stats.lines,
        malformed = stats.malformed,
        "worker drained"
    );
    stats
}

#[cfg(feature = "max_thread_priority")]
fn raise_priority() {
    use thread_priority::{set_current_thread_priority, ThreadPriority};

    if let Err(error) = set_current_thread_priority(ThreadPriority::Max) {
        debug!(?error, "cannot raise worker priority");
    }
}

#[cfg(not(feature = "max_thread_priority"))]
fn raise_priority() {}
