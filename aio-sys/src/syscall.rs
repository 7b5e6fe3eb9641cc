//! Raw AIO syscalls. libc exposes the numbers but not the wrappers, so they are issued through
//! `libc::syscall`.
use crate::{
    AioContextId,
    Iocb,
    IoEvent,
};
use libc::{
    c_long,
    c_uint,
};

/// Every call returns the kernel convention: a non-negative result, or `-errno`.
pub trait SyscallLib {
    fn io_setup(nr_events: c_uint, ctx: *mut AioContextId) -> c_long;
    fn io_destroy(ctx: AioContextId) -> c_long;
    fn io_submit(ctx: AioContextId, nr: c_long, iocbs: *mut *mut Iocb) -> c_long;
    fn io_cancel(ctx: AioContextId, iocb: *mut Iocb, result: *mut IoEvent) -> c_long;
    fn io_getevents(ctx: AioContextId, min_nr: c_long, nr: c_long, events: *mut IoEvent, timeout: *mut libc::timespec) -> c_long;
}

#[derive(Debug)]
pub struct Syscalls;

fn last_os_err() -> i32 {
    unsafe { *libc::__errno_location() }
}

#[inline]
fn kernel_result(ret: c_long) -> c_long {
    if ret < 0 {
        -(last_os_err() as c_long)
    } else {
        ret
    }
}

impl SyscallLib for Syscalls {
    #[inline]
    fn io_setup(nr_events: c_uint, ctx: *mut AioContextId) -> c_long {
        kernel_result(unsafe {
            libc::syscall(
                libc::SYS_io_setup,
                nr_events as c_long,
                ctx as usize as c_long,
            )
        })
    }

    #[inline]
    fn io_destroy(ctx: AioContextId) -> c_long {
        kernel_result(unsafe {
            libc::syscall(
                libc::SYS_io_destroy,
                ctx as c_long,
            )
        })
    }

    #[inline]
    fn io_submit(ctx: AioContextId, nr: c_long, iocbs: *mut *mut Iocb) -> c_long {
        kernel_result(unsafe {
            libc::syscall(
                libc::SYS_io_submit,
                ctx as c_long,
                nr,
                iocbs as usize as c_long,
            )
        })
    }

    #[inline]
    fn io_cancel(ctx: AioContextId, iocb: *mut Iocb, result: *mut IoEvent) -> c_long {
        kernel_result(unsafe {
            libc::syscall(
                libc::SYS_io_cancel,
                ctx as c_long,
                iocb as usize as c_long,
                result as usize as c_long,
            )
        })
    }

    #[inline]
    fn io_getevents(ctx: AioContextId, min_nr: c_long, nr: c_long, events: *mut IoEvent, timeout: *mut libc::timespec) -> c_long {
        kernel_result(unsafe {
            libc::syscall(
                libc::SYS_io_getevents,
                ctx as c_long,
                min_nr,
                nr,
                events as usize as c_long,
                timeout as usize as c_long,
            )
        })
    }
}
