//! Streaming reader that cuts its input into regions of whole lines.
//!
//! The buffer holds `chunk_size + max_line_len` bytes. Each read appends at
//! most `chunk_size` bytes after the bytes left over from the previous
//! read; everything through the last newline is handed out as one region
//! and the partial line after it is moved to the front of the buffer.

use std::io::{self, Read};

use memchr::memrchr;
use tracing::debug;

use crate::error::{Error, Result};

/// Bytes requested from the source per read.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Longest valid line including its newline, `255.255.255.255\n`.
pub const MAX_LINE_LEN: usize = 16;

/// Reads `source` in chunks of at most `chunk_size` bytes and hands out
/// regions of complete lines, carrying a partial last line into the next
/// chunk. Memory stays at `chunk_size + max_line_len` regardless of input
/// size; a line that cannot fit in that buffer is an error.
pub struct ChunkedLineReader<R> {
    source: R,
    buf: Box<[u8]>,
    chunk_size: usize,
    /// Leftover bytes at the front of `buf`.
    filled: usize,
    /// Bytes consumed from `source` so far.
    offset: u64,
}

impl<R: Read> ChunkedLineReader<R> {
    pub fn new(source: R, chunk_size: usize, max_line_len: usize) -> Result<Self> {
        if max_line_len == 0 {
            return Err(Error::InvalidConfig("max line length must be positive".into()));
        }
        if chunk_size < max_line_len {
            return Err(Error::InvalidConfig(format!(
                "chunk size {chunk_size} is smaller than the max line length {max_line_len}"
            )));
        }
        let capacity = chunk_size
            .checked_add(max_line_len)
            .ok_or_else(|| Error::InvalidConfig(format!("chunk size {chunk_size} too large")))?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { bytes: capacity })?;
        buf.resize(capacity, 0);

        Ok(Self {
            source,
            buf: buf.into_boxed_slice(),
            chunk_size,
            filled: 0,
            offset: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Reads the source to its end, calling `f` with each region.
    ///
    /// Every region but the last ends with `\n`. The last region is the
    /// unterminated final line, if the input has one. A region borrows the
    /// internal buffer and is only valid for the duration of the call.
    ///
    /// Returns the number of bytes read. Stops at the first error from the
    /// source or from `f`.
    pub fn for_each_region<F>(mut self, mut f: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        loop {
            // `filled < capacity` here, so the read window is never empty.
            let end = (self.filled + self.chunk_size).min(self.buf.len());
            let read = match self.source.read(&mut self.buf[self.filled..end]) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::Read {
                        offset: self.offset,
                        source,
                    })
                }
            };

            if read == 0 {
                if self.filled > 0 {
                    debug!(offset = self.offset, len = self.filled, "final unterminated line");
                    f(&self.buf[..self.filled])?;
                }
                return Ok(self.offset);
            }

            self.offset += read as u64;
            self.filled += read;

            match memrchr(b'\n', &self.buf[..self.filled]) {
                Some(cut) => {
                    debug!(
                        offset = self.offset,
                        region = cut + 1,
                        leftover = self.filled - cut - 1,
                        "chunk"
                    );
                    f(&self.buf[..=cut])?;
                    self.buf.copy_within(cut + 1..self.filled, 0);
                    self.filled -= cut + 1;
                }
                None if self.filled == self.buf.len() => {
                    return Err(Error::LineTooLong {
                        offset: self.offset - self.filled as u64,
                        capacity: self.buf.len(),
                    });
                }
                None => {}
            }
        }
    }
}
