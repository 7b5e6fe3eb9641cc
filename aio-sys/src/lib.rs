//! Raw bindings to the Linux native AIO interface: the `io_*` syscalls, the kernel's request and
//! completion layouts, and a completion reaper that reads the ring the kernel maps into the
//! process before falling back to `io_getevents`.
#![no_std]

#[macro_use]
extern crate static_assertions;

pub(crate) mod abi;
pub use abi::{
    AIO_RING_MAGIC,
    LAYOUT_ILP32,
    LAYOUT_LP64,
    NATIVE_LAYOUT,
    AbiLayout,
    AioContextId,
    IOPriority,
    Iocb,
    IocbFlags,
    IoEvent,
    Opcode,
    ReadWriteFlags,
    RingHeader,
    iovec_from,
    user_ptr,
};

mod completion_ring;
pub use completion_ring::{
    CompletionRing,
};

mod context;
pub use context::{
    Aio,
    CancelOutcome,
    CompletionReaper,
    IoContext,
};

mod context_builder;
pub use context_builder::{
    IoContextBuilder,
};

mod error;
pub use error::{
    AioError,
    Result,
    Syscall,
};

mod syscall;
pub use syscall::{
    Syscalls,
    SyscallLib,
};
