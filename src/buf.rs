//! Block-aligned I/O buffers.
//!
//! The engine works in fixed-size blocks: every read is chunked into
//! `BLOCK_SIZE` segments, and direct unbuffered transfer wants both the
//! start address and the allocation size aligned to the block size.
//! [`AlignedBlock`] owns one such region together with the logical length
//! that is actually registered with the kernel.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Fixed transfer block size in bytes. Block allocations are both sized and
/// aligned to this value.
pub const BLOCK_SIZE: usize = 1024;

/// One owned, block-aligned buffer region.
///
/// The allocation is always a full `BLOCK_SIZE` bytes; `len` is the logical
/// length visible through [`as_slice`](Self::as_slice) and to the kernel.
/// The trailing block of a chunked transfer is the only place the two
/// differ.
pub struct AlignedBlock {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBlock {
    /// Allocate a zeroed block with logical length `len`.
    ///
    /// `len` must be in `1..=BLOCK_SIZE`.
    pub(crate) fn alloc(len: usize) -> Result<AlignedBlock> {
        debug_assert!(0 < len && len <= BLOCK_SIZE);
        let ptr = unsafe { alloc::alloc_zeroed(Self::layout()) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(AlignedBlock { ptr, len }),
            None => Err(Error::Allocation {
                size: BLOCK_SIZE,
                align: BLOCK_SIZE,
            }),
        }
    }

    // BLOCK_SIZE is a power of two, so this cannot fail.
    fn layout() -> Layout {
        unsafe { Layout::from_size_align_unchecked(BLOCK_SIZE, BLOCK_SIZE) }
    }

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical length is zero. Never true for engine-produced
    /// blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The block's bytes, up to the logical length.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable view of the block's bytes, up to the logical length.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// The iovec entry registered with the kernel: full-block pointer,
    /// logical length.
    pub(crate) fn iovec(&self) -> libc::iovec {
        libc::iovec {
            iov_base: self.ptr.as_ptr() as *mut libc::c_void,
            iov_len: self.len,
        }
    }
}

impl Drop for AlignedBlock {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout()) };
    }
}

// Plain exclusively-owned heap memory.
unsafe impl Send for AlignedBlock {}

impl AsRef<[u8]> for AlignedBlock {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for AlignedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBlock")
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_block_aligned() {
        let blocks: Vec<_> = (0..8).map(|_| AlignedBlock::alloc(BLOCK_SIZE).unwrap()).collect();
        for block in &blocks {
            assert_eq!(block.as_slice().as_ptr() as usize % BLOCK_SIZE, 0);
        }
    }

    #[test]
    fn logical_length_tracks_request() {
        let block = AlignedBlock::alloc(452).unwrap();
        assert_eq!(block.len(), 452);
        assert_eq!(block.as_slice().len(), 452);
        assert_eq!(block.iovec().iov_len, 452);
        assert!(!block.is_empty());
    }

    #[test]
    fn blocks_start_zeroed() {
        let block = AlignedBlock::alloc(BLOCK_SIZE).unwrap();
        assert!(block.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_through_mut_slice_are_visible() {
        let mut block = AlignedBlock::alloc(16).unwrap();
        block.as_mut_slice().copy_from_slice(b"0123456789abcdef");
        assert_eq!(block.as_ref(), b"0123456789abcdef");
    }
}
