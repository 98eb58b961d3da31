//! Request records and submission-entry encoding.

use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue, types};

use crate::buf::{AlignedBlock, BLOCK_SIZE};
use crate::error::{Error, Result};

/// Operation-specific state of a request. The discriminant is the opcode
/// tag completions dispatch on.
pub(crate) enum Payload {
    /// Engine-allocated blocks the kernel scatters the read into. Handed to
    /// the result handler at dispatch.
    Read(Vec<AlignedBlock>),

    /// The caller's buffer, owned by the engine until the write completes.
    Write(Box<[u8]>),
}

/// One in-flight read or write operation.
///
/// Owned by the request arena from push until its completion is drained.
/// The arena key travels through the kernel as the submission entry's
/// `user_data`; nothing here is referenced again once the completion has
/// been dispatched.
pub(crate) struct Request {
    pub(crate) fd: RawFd,

    /// Total transfer size in bytes.
    pub(crate) size: u64,

    pub(crate) payload: Payload,

    /// The iovec array registered with the kernel. Heap-backed, so the
    /// pointers stay put when the request itself moves into the arena.
    pub(crate) iovecs: Vec<libc::iovec>,
}

impl Request {
    /// Number of blocks a transfer of `size` bytes is chunked into.
    pub(crate) fn block_count(size: u64) -> usize {
        size.div_ceil(BLOCK_SIZE as u64) as usize
    }

    /// Encode a chunked read of `size` bytes from `fd`.
    ///
    /// Every block but possibly the last has logical length `BLOCK_SIZE`;
    /// a shorter final block covers `size % BLOCK_SIZE` when nonzero.
    pub(crate) fn read(fd: RawFd, size: i64) -> Result<Request> {
        if size <= 0 {
            return Err(Error::Encode { size });
        }
        let size = size as u64;

        let mut blocks = Vec::with_capacity(Self::block_count(size));
        let mut remaining = size;
        while remaining > 0 {
            let take = remaining.min(BLOCK_SIZE as u64) as usize;
            // On failure the blocks collected so far drop with the vec.
            blocks.push(AlignedBlock::alloc(take)?);
            remaining -= take as u64;
        }

        let iovecs = blocks.iter().map(AlignedBlock::iovec).collect();
        Ok(Request {
            fd,
            size,
            payload: Payload::Read(blocks),
            iovecs,
        })
    }

    /// Wrap a caller buffer as a write to `fd`.
    ///
    /// Writes are never chunked: one descriptor covers the whole buffer
    /// regardless of its size. Zero-length buffers are permitted and
    /// complete with a zero byte count.
    pub(crate) fn write(fd: RawFd, data: Box<[u8]>) -> Request {
        let iovecs = vec![libc::iovec {
            iov_base: data.as_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        }];
        Request {
            fd,
            size: data.len() as u64,
            payload: Payload::Write(data),
            iovecs,
        }
    }

    /// Build the submission entry for this request.
    ///
    /// The entry borrows the request's iovec array; the request must stay
    /// in the arena until its completion is drained.
    pub(crate) fn sqe(&self) -> squeue::Entry {
        let ptr = self.iovecs.as_ptr();
        let len = self.iovecs.len() as u32;
        match self.payload {
            Payload::Read(_) => opcode::Readv::new(types::Fd(self.fd), ptr, len)
                .offset(0)
                .build(),
            Payload::Write(_) => opcode::Writev::new(types::Fd(self.fd), ptr, len)
                .offset(0)
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_lens(req: &Request) -> Vec<usize> {
        match &req.payload {
            Payload::Read(blocks) => blocks.iter().map(AlignedBlock::len).collect(),
            Payload::Write(_) => panic!("not a read"),
        }
    }

    #[test]
    fn read_chunking_counts() {
        for size in [1, 2, 1023, 1024, 1025, 2048, 2500, 10 * 1024 + 7] {
            let req = Request::read(0, size).unwrap();
            let lens = block_lens(&req);

            assert_eq!(lens.len(), Request::block_count(size as u64));
            assert_eq!(lens.iter().sum::<usize>(), size as usize);
            // Only the trailing block may be short.
            for len in &lens[..lens.len() - 1] {
                assert_eq!(*len, BLOCK_SIZE);
            }
            assert_eq!(req.iovecs.len(), lens.len());
        }
    }

    #[test]
    fn exact_multiples_use_full_blocks_only() {
        let req = Request::read(0, 3 * BLOCK_SIZE as i64).unwrap();
        assert_eq!(block_lens(&req), vec![BLOCK_SIZE; 3]);
    }

    #[test]
    fn trailing_block_is_shorter() {
        let req = Request::read(0, 2500).unwrap();
        assert_eq!(block_lens(&req), vec![1024, 1024, 452]);
    }

    #[test]
    fn iovec_lengths_mirror_logical_lengths() {
        let req = Request::read(0, 2500).unwrap();
        let iov_lens: Vec<usize> = req.iovecs.iter().map(|iov| iov.iov_len).collect();
        assert_eq!(iov_lens, vec![1024, 1024, 452]);
    }

    #[test]
    fn block_count_recomputes_to_encode_time_value() {
        for size in [1u64, 1024, 1025, 2500, 4096] {
            let req = Request::read(0, size as i64).unwrap();
            assert_eq!(block_lens(&req).len(), Request::block_count(req.size));
        }
    }

    #[test]
    fn non_positive_sizes_are_rejected() {
        assert!(matches!(Request::read(0, 0), Err(Error::Encode { size: 0 })));
        assert!(matches!(
            Request::read(0, -42),
            Err(Error::Encode { size: -42 })
        ));
    }

    #[test]
    fn writes_are_a_single_descriptor() {
        let data = vec![7u8; 3000].into_boxed_slice();
        let req = Request::write(0, data);

        assert_eq!(req.size, 3000);
        assert_eq!(req.iovecs.len(), 1);
        assert_eq!(req.iovecs[0].iov_len, 3000);
    }

    #[test]
    fn empty_writes_are_permitted() {
        let req = Request::write(0, Box::new([]));
        assert_eq!(req.size, 0);
        assert_eq!(req.iovecs[0].iov_len, 0);
    }
}
