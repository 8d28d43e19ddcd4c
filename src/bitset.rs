//! Presence index over the whole 32-bit key space.
//!
//! One bit per possible key, packed into `1 << 26` 64-bit words (512 MiB).
//! Word `w`, bit `b` is set iff key `w * 64 + b` has been observed. The
//! backing storage is allocated once, zeroed, and never resized.
//!
//! Three synchronization strategies share the [`PresenceIndex`] interface:
//! [`AtomicBitSet`] (lock-free compare-and-swap), [`MutexBitSet`] (one lock
//! around all words) and [`UnsyncBitSet`] (plain OR, single thread only).

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// Number of 64-bit words covering all `2^32` keys.
pub const WORDS: usize = 1 << 26;

/// Bytes of backing storage held by every index.
pub const INDEX_BYTES: usize = WORDS * std::mem::size_of::<u64>();

/// A set of 32-bit keys that records presence only.
///
/// `count` must only be called once every writer has finished; while writers
/// are active it returns an arbitrary snapshot.
pub trait PresenceIndex {
    /// Marks `key` as seen. Idempotent.
    fn set(&self, key: u32);

    /// Returns whether `key` has been marked.
    fn test(&self, key: u32) -> bool;

    /// Returns the number of distinct keys marked.
    fn count(&self) -> u64;
}

/// Word index and in-word mask for `key`.
#[inline(always)]
fn locate(key: u32) -> (usize, u64) {
    ((key >> 6) as usize, 1u64 << (key & 63))
}

/// Allocates `WORDS` zeroed words with a single request to the allocator.
///
/// # Safety
///
/// The all-zero bit pattern must be a valid value of `T`.
unsafe fn zeroed_words<T>() -> Result<Box<[T]>> {
    let layout = Layout::array::<T>(WORDS).map_err(|_| Error::Allocation {
        bytes: INDEX_BYTES,
    })?;
    let ptr = unsafe { alloc::alloc_zeroed(layout) } as *mut T;
    if ptr.is_null() {
        return Err(Error::Allocation {
            bytes: layout.size(),
        });
    }
    // SAFETY: `ptr` was allocated with the layout of `[T; WORDS]` and every
    // element is a valid zero `T` per the caller's contract.
    Ok(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, WORDS)) })
}

/// Lock-free index safe to share between any number of writer threads.
pub struct AtomicBitSet {
    words: Box<[AtomicU64]>,
}

impl AtomicBitSet {
    pub fn new() -> Result<Self> {
        // SAFETY: zero is a valid `AtomicU64`.
        let words = unsafe { zeroed_words::<AtomicU64>()? };
        Ok(Self { words })
    }

    #[inline(always)]
    fn word(&self, index: usize) -> &AtomicU64 {
        debug_assert!(index < WORDS);
        // SAFETY: `index` comes from `key >> 6` of a u32, so it is below `WORDS`.
        unsafe { self.words.get_unchecked(index) }
    }
}

impl PresenceIndex for AtomicBitSet {
    /// Sets the bit at `key` with a load / OR / compare-and-swap loop.
    ///
    /// An already-set bit returns without writing, so repeated keys never
    /// contend on the cache line. Relaxed ordering is enough: readers only
    /// look at the words after joining every writer.
    #[inline]
    fn set(&self, key: u32) {
        let (index, mask) = locate(key);
        let word = self.word(index);
        let mut current = word.load(Ordering::Relaxed);
        loop {
            if current & mask != 0 {
                return;
            }
            match word.compare_exchange_weak(
                current,
                current | mask,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn test(&self, key: u32) -> bool {
        let (index, mask) = locate(key);
        self.word(index).load(Ordering::Relaxed) & mask != 0
    }

    fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as u64)
            .sum()
    }
}

/// Index guarded by a single mutex. Correct under concurrency but every
/// `set` serializes on the lock.
pub struct MutexBitSet {
    words: Mutex<Box<[u64]>>,
}

impl MutexBitSet {
    pub fn new() -> Result<Self> {
        // SAFETY: zero is a valid `u64`.
        let words = unsafe { zeroed_words::<u64>()? };
        Ok(Self {
            words: Mutex::new(words),
        })
    }

    // A panicking writer cannot leave a word half-written, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Box<[u64]>> {
        self.words.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresenceIndex for MutexBitSet {
    fn set(&self, key: u32) {
        let (index, mask) = locate(key);
        self.lock()[index] |= mask;
    }

    fn test(&self, key: u32) -> bool {
        let (index, mask) = locate(key);
        self.lock()[index] & mask != 0
    }

    fn count(&self) -> u64 {
        self.lock().iter().map(|word| word.count_ones() as u64).sum()
    }
}

/// Index updated with a plain OR.
///
/// Only correct while a single thread writes to it. It is not `Sync`, so the
/// compiler refuses to hand it to the worker pool.
pub struct UnsyncBitSet {
    words: Box<[Cell<u64>]>,
}

impl UnsyncBitSet {
    pub fn new() -> Result<Self> {
        // SAFETY: zero is a valid `Cell<u64>`.
        let words = unsafe { zeroed_words::<Cell<u64>>()? };
        Ok(Self { words })
    }
}

impl PresenceIndex for UnsyncBitSet {
    #[inline]
    fn set(&self, key: u32) {
        let (index, mask) = locate(key);
        let word = &self.words[index];
        word.set(word.get() | mask);
    }

    fn test(&self, key: u32) -> bool {
        let (index, mask) = locate(key);
        self.words[index].get() & mask != 0
    }

    fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|word| word.get().count_ones() as u64)
            .sum()
    }
}
