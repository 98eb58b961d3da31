//! Ringfile is a minimal asynchronous file-I/O engine built directly on
//! Linux io_uring. Callers enqueue read or write operations against open
//! file descriptors; the engine chunks each read into fixed-size,
//! block-aligned buffers, batches the prepared entries into the kernel ring,
//! and dispatches drained completions to a caller-supplied handler. The
//! calling thread never blocks for the duration of the I/O itself, only
//! where it explicitly asks to wait.
//!
//! The engine is single-owner by construction: every submission and
//! retrieval path goes through `&mut self`, so a ring is driven by one
//! thread (or behind whatever exclusion the caller provides). There is one
//! ring per [`UringEngine`]; queue-depth tuning beyond the constructor and
//! multi-ring sharding are out of scope.
//!
//! Completions may arrive in any order relative to submission order. Each
//! submission entry carries a stable arena key as its `user_data`, and
//! dispatch relies solely on that key for attribution.
//!
//! # Examples
//!
//! ```no_run
//! use ringfile::fs::FileRing;
//!
//! fn main() -> ringfile::Result<()> {
//!     let mut ring = FileRing::new()?;
//!     ring.read_file("hello.txt", |data| {
//!         println!("read {} bytes", data.len());
//!     })?;
//!     ring.poll()?;
//!     Ok(())
//! }
//! ```
//!
//! Only Linux (kernel 5.1+) is supported.

#![warn(missing_docs, unreachable_pub)]

#[macro_use]
mod macros;

mod buf;
mod driver;
mod error;
pub mod fs;
mod utils;

pub use buf::{AlignedBlock, BLOCK_SIZE};
pub use driver::{CompletionHandler, UringEngine};
pub use error::{Error, Result};
