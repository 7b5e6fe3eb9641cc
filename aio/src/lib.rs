//! Safe requests on top of `aio-sys`.
//!
//! A [`Request`] borrows its buffers, a [`Batch`] submits requests and hands back an [`InFlight`]
//! token for each one the kernel accepted, and the token is retired with the matching
//! [`IoEvent`] reaped from the context.
use std::io;

mod batch;
pub use batch::{
    Batch,
    Completion,
    InFlight,
    Submitted,
};

pub mod direct;
pub use direct::{
    check_direct_buffer,
    open_direct,
    AlignedBuffer,
    ALIGN_SIZE,
};

mod request;
pub use request::Request;

pub use aio_sys::{
    Aio,
    AioError,
    CancelOutcome,
    CompletionReaper,
    IOPriority,
    IoContext,
    IoContextBuilder,
    IoEvent,
    Opcode,
    ReadWriteFlags,
    Result,
    Syscall,
};

/// Convert an [`AioError`] for callers working in `std::io` terms.
pub fn into_io_error(err: AioError) -> io::Error {
    match err {
        AioError::Os { errno, .. } => io::Error::from_raw_os_error(errno),
        AioError::ResourceExhausted(_) => io::Error::new(io::ErrorKind::WouldBlock, err),
        AioError::InvalidArgument(_) | AioError::InvalidDescriptor => io::Error::new(io::ErrorKind::InvalidInput, err),
        AioError::NotFound | AioError::AlreadyCompleted => io::Error::new(io::ErrorKind::NotFound, err),
        AioError::ReaperClaimed => io::Error::new(io::ErrorKind::Other, err),
    }
}
