//! Engine error types.

use std::{fmt, io, os::unix::io::RawFd};

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine.
///
/// Failures are scoped: an allocation or encode failure aborts only the
/// request being built, and a completion failure concerns a single
/// operation. Neither corrupts ring state for unrelated in-flight requests.
#[derive(Debug)]
pub enum Error {
    /// The kernel ring could not be created. Unrecoverable for the engine.
    RingInit(io::Error),

    /// An aligned block allocation failed. Fatal to the encode in progress
    /// (blocks already allocated for that request are freed); the caller may
    /// retry later.
    Allocation {
        /// Requested allocation size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// The caller asked for a non-positive transfer size.
    Encode {
        /// The rejected size.
        size: i64,
    },

    /// The kernel rejected a submission batch. Entries already queued but
    /// not yet submitted survive for a retry.
    Submit(io::Error),

    /// The kernel reported a failure for one completed operation. The
    /// matching request has been released and its handler signalled.
    Completion {
        /// Descriptor the failed operation targeted.
        fd: RawFd,
        /// The kernel-reported error.
        source: io::Error,
    },

    /// File-level I/O outside the ring (open, stat, create).
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RingInit(source) => {
                write!(f, "failed to create io_uring instance: {}", source)
            }
            Error::Allocation { size, align } => {
                write!(
                    f,
                    "aligned allocation failed: size={}, align={}",
                    size, align
                )
            }
            Error::Encode { size } => write!(f, "invalid transfer size: {}", size),
            Error::Submit(source) => write!(f, "kernel rejected submission: {}", source),
            Error::Completion { fd, source } => {
                write!(f, "operation on fd {} failed: {}", fd, source)
            }
            Error::Io(source) => write!(f, "file error: {}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::RingInit(source) | Error::Submit(source) | Error::Io(source) => Some(source),
            Error::Completion { source, .. } => Some(source),
            Error::Allocation { .. } | Error::Encode { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io(source)
    }
}
