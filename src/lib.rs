//! Counts distinct IPv4 addresses in a newline-delimited file using one bit
//! per possible address.
//!
//! ```text
//! file ─▶ ChunkedLineReader ─▶ Dispatch (Inline | WorkerPool)
//!                                  │ Lines ─▶ parse_ipv4 ─▶ PresenceIndex::set
//!                                  ▼
//!                           aggregate ─▶ RunReport
//! ```

pub mod bitset;
pub mod cli;
pub mod dispatch;
pub mod error;
pub mod lines;
pub mod parse;
pub mod pipeline;
pub mod reader;

pub use bitset::{AtomicBitSet, MutexBitSet, PresenceIndex, UnsyncBitSet};
pub use dispatch::{Dispatch, Inline, ScanStats, WorkerPool};
pub use error::{Error, Result};
pub use parse::{addr_to_key, key_to_addr, parse_ipv4, ParseError};
pub use pipeline::{count_distinct, count_distinct_in, Config, DispatchKind, IndexKind, RunReport};
pub use reader::ChunkedLineReader;
