//! Ring ownership, submission, and completion dispatch.

mod op;

use std::io;
use std::os::unix::io::RawFd;

use io_uring::{cqueue, IoUring};

use self::op::{Payload, Request};
use crate::buf::AlignedBlock;
use crate::error::{Error, Result};
use crate::utils::slab::Slab;

/// Receives the outcome of drained completions.
///
/// Implementations live outside the engine; this trait is the engine's
/// whole contract with them. The engine releases the request record after
/// the handler returns, on every path.
pub trait CompletionHandler {
    /// A read finished. `blocks` is the chunked data in file order; its
    /// length is `ceil(size / BLOCK_SIZE)` for the transfer size the read
    /// was pushed with. Ownership of the buffers passes to the handler.
    fn on_read_complete(&mut self, blocks: Vec<AlignedBlock>, fd: RawFd);

    /// A write finished. `bytes_written` is the kernel-reported count,
    /// which may be short of the requested size; a short write is visible
    /// here, not an engine error.
    fn on_write_complete(&mut self, bytes_written: usize, fd: RawFd);

    /// The kernel reported a failure for the operation on `fd`. The engine
    /// has already released the request's resources; the same failure is
    /// also returned from the draining call as [`Error::Completion`].
    fn on_completion_error(&mut self, fd: RawFd, error: &io::Error);
}

/// An io_uring instance paired with the arena of its in-flight requests.
///
/// One engine owns exactly one ring. All submission and retrieval paths
/// take `&mut self`: a single thread drives the engine, or the caller
/// provides exclusion around it. Dropping the engine releases the ring;
/// requests still in flight at that point are stranded (their completions
/// can never be drained), so drain before dropping.
pub struct UringEngine {
    uring: IoUring,

    /// In-flight requests, keyed by the `user_data` attached at submission.
    ops: Slab<Request>,
}

impl UringEngine {
    /// Default submission/completion queue depth.
    pub const DEFAULT_ENTRIES: u32 = 16;

    /// Create an engine with the default queue depth.
    pub fn new() -> Result<UringEngine> {
        Self::with_entries(Self::DEFAULT_ENTRIES)
    }

    /// Create an engine with a caller-chosen queue depth.
    ///
    /// Fails with [`Error::RingInit`] when the kernel facility is
    /// unavailable or rejects the parameters; the engine cannot operate.
    pub fn with_entries(entries: u32) -> Result<UringEngine> {
        let uring = IoUring::new(entries).map_err(Error::RingInit)?;
        tracing!("RINGFILE DEBUG[UringEngine]: ring created, {} entries", entries);
        Ok(UringEngine {
            uring,
            ops: Slab::new(),
        })
    }

    /// Queue a chunked read of `size` bytes from `fd`.
    ///
    /// The transfer is split into `ceil(size / BLOCK_SIZE)` aligned blocks
    /// delivered to the handler at completion. The entry is only prepared;
    /// nothing reaches the kernel until [`submit`](Self::submit) (or an
    /// internal flush when the submission queue fills up).
    pub fn push_read_request(&mut self, fd: RawFd, size: i64) -> Result<()> {
        let req = Request::read(fd, size)?;
        self.push(req)
    }

    /// Queue a write of `data` to `fd` as a single descriptor.
    ///
    /// The engine owns the buffer until the write completes and drops it
    /// after dispatch. Writes are not chunked.
    pub fn push_write_request(&mut self, fd: RawFd, data: Box<[u8]>) -> Result<()> {
        self.push(Request::write(fd, data))
    }

    fn push(&mut self, req: Request) -> Result<()> {
        // If the submission queue is full, hand it to the kernel to make
        // room before preparing this entry.
        if self.uring.submission().is_full() {
            self.uring.submit().map_err(Error::Submit)?;
        }

        // The entry's iovec pointers target the request's heap allocations,
        // which do not move when the record moves into the arena.
        let sqe = req.sqe();
        let key = self.ops.insert(req);
        let sqe = sqe.user_data(key as u64);

        if unsafe { self.uring.submission().push(&sqe) }.is_err() {
            // Still no slot: give the arena entry back and let the caller
            // retry after draining.
            drop(self.ops.try_remove(key));
            return Err(Error::Submit(io::Error::from_raw_os_error(libc::EBUSY)));
        }
        tracing!("RINGFILE DEBUG[UringEngine]: prepared op, key {}", key);
        Ok(())
    }

    /// Hand all prepared entries to the kernel.
    ///
    /// With `wait_nr > 0` the call blocks until at least that many
    /// completions are available. Returns the number of entries submitted.
    /// On kernel rejection nothing is retried here: entries already queued
    /// survive for an explicit retry at the call site.
    pub fn submit(&mut self, wait_nr: u32) -> Result<usize> {
        let submitted = if wait_nr > 0 {
            self.uring.submit_and_wait(wait_nr as usize)
        } else {
            self.uring.submit()
        }
        .map_err(Error::Submit)?;
        tracing!("RINGFILE DEBUG[UringEngine]: submitted {}", submitted);
        Ok(submitted)
    }

    /// Drain one completion without blocking.
    ///
    /// Returns `Ok(false)` immediately when no completion is ready, and
    /// `Ok(true)` after consuming one entry and dispatching it. A kernel
    /// failure for the drained operation surfaces as
    /// [`Error::Completion`]; the entry is consumed either way.
    pub fn pop_request(&mut self, handler: &mut dyn CompletionHandler) -> Result<bool> {
        // The queue guard syncs the shared head when it drops, which is
        // what acknowledges the entry to the kernel on every path out of
        // here, the error path included.
        let cqe = self.uring.completion().next();
        match cqe {
            Some(cqe) => self.complete(cqe, handler).map(|_| true),
            None => Ok(false),
        }
    }

    /// Drain one completion, blocking until one is available.
    ///
    /// Also submits anything still queued while it waits. Blocks
    /// indefinitely when nothing is in flight and nothing gets submitted;
    /// that is the caller's bookkeeping to avoid.
    pub fn wait_request(&mut self, handler: &mut dyn CompletionHandler) -> Result<()> {
        loop {
            let cqe = self.uring.completion().next();
            if let Some(cqe) = cqe {
                return self.complete(cqe, handler);
            }
            self.uring.submit_and_wait(1).map_err(Error::Submit)?;
        }
    }

    /// Number of requests currently in flight (pushed, not yet dispatched).
    pub fn in_flight(&self) -> usize {
        self.ops.len()
    }

    fn complete(&mut self, cqe: cqueue::Entry, handler: &mut dyn CompletionHandler) -> Result<()> {
        let key = cqe.user_data() as usize;
        let req = match self.ops.try_remove(key) {
            Some(req) => req,
            // Stale tag; the request was already dispatched. The entry has
            // still been consumed.
            None => return Ok(()),
        };

        let res = cqe.result();
        if res < 0 {
            let source = io::Error::from_raw_os_error(-res);
            handler.on_completion_error(req.fd, &source);
            // The request's blocks or write buffer drop here.
            return Err(Error::Completion { fd: req.fd, source });
        }

        let Request { fd, size, payload, .. } = req;
        match payload {
            Payload::Read(blocks) => {
                // The block count always derives from the stored transfer
                // size, which must agree with what was encoded.
                debug_assert_eq!(blocks.len(), Request::block_count(size));
                handler.on_read_complete(blocks, fd);
            }
            Payload::Write(_) => handler.on_write_complete(res as usize, fd),
        }
        tracing!("RINGFILE DEBUG[UringEngine]: dispatched op, key {}", key);
        Ok(())
    }
}

impl Drop for UringEngine {
    fn drop(&mut self) {
        tracing!(
            "RINGFILE DEBUG[UringEngine]: drop, {} in flight",
            self.ops.len()
        );
        // Entries still sitting in the submission queue are handed off so
        // the kernel side winds down; the ring itself is released by the
        // inner drop. In-flight completions are never drained past here.
        let _ = self.uring.submitter().submit();
    }
}
