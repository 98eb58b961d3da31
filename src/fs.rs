//! Whole-file reads and writes with per-file completion callbacks.
//!
//! [`FileRing`] owns a [`UringEngine`] and drives it at file granularity:
//! it opens files, queues one operation per file, and keeps a callback per
//! descriptor. Queued operations are handed to the kernel either explicitly
//! via [`poll`](FileRing::poll) or automatically once more than
//! [`SUBMIT_THRESHOLD`] of them pile up.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::buf::AlignedBlock;
use crate::driver::{CompletionHandler, UringEngine};
use crate::error::{Error, Result};

/// Queued requests beyond this count trigger a submit-and-drain without an
/// explicit [`poll`](FileRing::poll) call.
pub const SUBMIT_THRESHOLD: usize = 5;

type ReadCallback = Box<dyn FnOnce(Vec<u8>)>;
type WriteCallback = Box<dyn FnOnce(usize)>;

enum PendingKind {
    Read(ReadCallback),
    Write(WriteCallback),
}

struct Pending {
    /// Keeps the descriptor open while the operation is in flight. Closed
    /// right before the callback runs.
    file: File,
    kind: PendingKind,
}

/// fd-keyed callback table; the crate's own [`CompletionHandler`].
#[derive(Default)]
struct CallbackTable {
    entries: FxHashMap<RawFd, Pending>,
}

impl CompletionHandler for CallbackTable {
    fn on_read_complete(&mut self, blocks: Vec<AlignedBlock>, fd: RawFd) {
        let Some(Pending { file, kind }) = self.entries.remove(&fd) else {
            return;
        };
        let PendingKind::Read(callback) = kind else {
            return;
        };

        let total = blocks.iter().map(AlignedBlock::len).sum();
        let mut data = Vec::with_capacity(total);
        for block in &blocks {
            data.extend_from_slice(block.as_slice());
        }

        drop(file);
        callback(data);
    }

    fn on_write_complete(&mut self, bytes_written: usize, fd: RawFd) {
        let Some(Pending { file, kind }) = self.entries.remove(&fd) else {
            return;
        };
        let PendingKind::Write(callback) = kind else {
            return;
        };

        drop(file);
        callback(bytes_written);
    }

    fn on_completion_error(&mut self, fd: RawFd, _error: &io::Error) {
        // Close the file and drop the callback; the failure itself reaches
        // the caller through the drain loop's return value.
        self.entries.remove(&fd);
    }
}

/// A [`UringEngine`] bound to whole-file operations.
pub struct FileRing {
    engine: UringEngine,
    table: CallbackTable,

    /// Requests queued since the last submit.
    queued: usize,
}

impl FileRing {
    /// Create a file ring with the engine's default queue depth.
    pub fn new() -> Result<FileRing> {
        Self::with_entries(UringEngine::DEFAULT_ENTRIES)
    }

    /// Create a file ring with a caller-chosen queue depth.
    pub fn with_entries(entries: u32) -> Result<FileRing> {
        Ok(FileRing {
            engine: UringEngine::with_entries(entries)?,
            table: CallbackTable::default(),
            queued: 0,
        })
    }

    /// Queue a read of the whole file at `path`; `callback` receives its
    /// contents once the kernel completes the transfer.
    ///
    /// A zero-length file never touches the ring: its callback runs
    /// immediately with an empty buffer.
    pub fn read_file<P, F>(&mut self, path: P, callback: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnOnce(Vec<u8>) + 'static,
    {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            callback(Vec::new());
            return Ok(());
        }

        let fd = file.as_raw_fd();
        self.engine.push_read_request(fd, size as i64)?;
        self.table.entries.insert(
            fd,
            Pending {
                file,
                kind: PendingKind::Read(Box::new(callback)),
            },
        );
        self.enqueued()
    }

    /// Queue a write of `data` to a file created (or truncated) at `path`;
    /// `callback` receives the kernel-reported byte count, which may be
    /// short of `data.len()`.
    pub fn write_file<P, F>(&mut self, path: P, data: Vec<u8>, callback: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnOnce(usize) + 'static,
    {
        let file = File::create(path)?;
        let fd = file.as_raw_fd();
        self.engine.push_write_request(fd, data.into_boxed_slice())?;
        self.table.entries.insert(
            fd,
            Pending {
                file,
                kind: PendingKind::Write(Box::new(callback)),
            },
        );
        self.enqueued()
    }

    fn enqueued(&mut self) -> Result<()> {
        self.queued += 1;
        if self.queued > SUBMIT_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    /// Submit everything queued and drain until nothing is in flight,
    /// running callbacks as completions land.
    pub fn poll(&mut self) -> Result<()> {
        if self.queued > 0 || self.engine.in_flight() > 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Requests queued but not yet handed to the kernel.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Requests handed to the kernel and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    fn flush(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.queued);
        self.engine.submit(batch as u32)?;

        // Drain everything, remembering the first per-operation failure
        // rather than abandoning the requests behind it.
        let mut first_failure = None;
        while self.engine.in_flight() > 0 {
            match self.engine.wait_request(&mut self.table) {
                Ok(()) => {}
                Err(err @ Error::Completion { .. }) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn read_pending(file: File, sink: Rc<RefCell<Option<Vec<u8>>>>) -> Pending {
        Pending {
            file,
            kind: PendingKind::Read(Box::new(move |data| {
                *sink.borrow_mut() = Some(data);
            })),
        }
    }

    #[test]
    fn read_dispatch_concatenates_blocks_in_order() {
        let mut table = CallbackTable::default();
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();

        let got = Rc::new(RefCell::new(None));
        table.entries.insert(fd, read_pending(file, Rc::clone(&got)));

        let mut first = AlignedBlock::alloc(4).unwrap();
        first.as_mut_slice().copy_from_slice(b"abcd");
        let mut second = AlignedBlock::alloc(2).unwrap();
        second.as_mut_slice().copy_from_slice(b"ef");

        table.on_read_complete(vec![first, second], fd);
        assert_eq!(got.borrow_mut().take().unwrap(), b"abcdef");
        assert!(table.entries.is_empty());
    }

    #[test]
    fn write_dispatch_reports_kernel_count() {
        let mut table = CallbackTable::default();
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        table.entries.insert(
            fd,
            Pending {
                file,
                kind: PendingKind::Write(Box::new(move |n| {
                    *sink.borrow_mut() = Some(n);
                })),
            },
        );

        table.on_write_complete(42, fd);
        assert_eq!(got.borrow_mut().take(), Some(42));
    }

    #[test]
    fn unknown_descriptors_are_ignored() {
        let mut table = CallbackTable::default();
        table.on_read_complete(Vec::new(), 1234);
        table.on_write_complete(0, 1234);
        table.on_completion_error(1234, &io::Error::from_raw_os_error(libc::EBADF));
    }

    #[test]
    fn completion_error_discards_the_entry() {
        let mut table = CallbackTable::default();
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();

        let got = Rc::new(RefCell::new(None));
        table.entries.insert(fd, read_pending(file, Rc::clone(&got)));

        table.on_completion_error(fd, &io::Error::from_raw_os_error(libc::EBADF));
        assert!(table.entries.is_empty());
        // The callback never ran.
        assert!(got.borrow().is_none());
    }
}
