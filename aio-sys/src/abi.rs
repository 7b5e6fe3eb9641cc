use core::mem::{offset_of, size_of};
use bitflags::bitflags;

/// The kernel's `aio_context_t`. It is also the user address at which the completion ring is
/// mapped.
pub type AioContextId = libc::c_ulong;

pub type IOPriority = i16;

/// `AIO_RING_MAGIC`
pub const AIO_RING_MAGIC: u32 = 0xa10a10a1;

/// Never a kernel opcode, marks an `Iocb` that has not been prepared yet.
const OPCODE_UNSET: u16 = u16::MAX;

/// Describes where the kernel expects each field of the AIO structures for one address width.
///
/// User pointers always occupy a 64 bit slot; on 32 bit targets the upper half is padding and must
/// be zero, which is why every pointer is widened through [`user_ptr`] rather than stored as a
/// native pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiLayout {
    pub pointer_width: u32,
    /// Unused bytes in each 64 bit pointer slot
    pub pointer_padding: usize,
    pub iocb_size: usize,
    pub iocb_key_offset: usize,
    pub iocb_opcode_offset: usize,
    pub iocb_fd_offset: usize,
    pub iocb_buf_offset: usize,
    pub iocb_nbytes_offset: usize,
    pub iocb_offset_offset: usize,
    pub iocb_flags_offset: usize,
    pub iocb_resfd_offset: usize,
    pub io_event_size: usize,
    pub io_event_res_offset: usize,
    pub io_event_res2_offset: usize,
    pub ring_header_size: usize,
}

pub const LAYOUT_ILP32: AbiLayout = AbiLayout {
    pointer_width: 32,
    pointer_padding: 4,
    ..LAYOUT_LP64
};

pub const LAYOUT_LP64: AbiLayout = AbiLayout {
    pointer_width: 64,
    pointer_padding: 0,
    iocb_size: 64,
    iocb_key_offset: 8,
    iocb_opcode_offset: 16,
    iocb_fd_offset: 20,
    iocb_buf_offset: 24,
    iocb_nbytes_offset: 32,
    iocb_offset_offset: 40,
    iocb_flags_offset: 56,
    iocb_resfd_offset: 60,
    io_event_size: 32,
    io_event_res_offset: 16,
    io_event_res2_offset: 24,
    ring_header_size: 32,
};

#[cfg(target_pointer_width = "32")]
pub const NATIVE_LAYOUT: AbiLayout = LAYOUT_ILP32;
#[cfg(target_pointer_width = "64")]
pub const NATIVE_LAYOUT: AbiLayout = LAYOUT_LP64;

const_assert_eq!(NATIVE_LAYOUT.pointer_width as usize, 8 * size_of::<usize>());
const_assert_eq!(NATIVE_LAYOUT.pointer_padding, size_of::<u64>() - size_of::<usize>());
const_assert_eq!(NATIVE_LAYOUT.iocb_size, size_of::<Iocb>());
const_assert_eq!(NATIVE_LAYOUT.iocb_key_offset, offset_of!(Iocb, key));
const_assert_eq!(NATIVE_LAYOUT.iocb_opcode_offset, offset_of!(Iocb, opcode));
const_assert_eq!(NATIVE_LAYOUT.iocb_fd_offset, offset_of!(Iocb, fd));
const_assert_eq!(NATIVE_LAYOUT.iocb_buf_offset, offset_of!(Iocb, buf));
const_assert_eq!(NATIVE_LAYOUT.iocb_nbytes_offset, offset_of!(Iocb, nbytes));
const_assert_eq!(NATIVE_LAYOUT.iocb_offset_offset, offset_of!(Iocb, offset));
const_assert_eq!(NATIVE_LAYOUT.iocb_flags_offset, offset_of!(Iocb, flags));
const_assert_eq!(NATIVE_LAYOUT.iocb_resfd_offset, offset_of!(Iocb, resfd));
const_assert_eq!(NATIVE_LAYOUT.io_event_size, size_of::<IoEvent>());
const_assert_eq!(NATIVE_LAYOUT.io_event_res_offset, offset_of!(IoEvent, res));
const_assert_eq!(NATIVE_LAYOUT.io_event_res2_offset, offset_of!(IoEvent, res2));
const_assert_eq!(NATIVE_LAYOUT.ring_header_size, size_of::<RingHeader>());

/// Widen a user pointer into the 64 bit slot the kernel reads.
#[inline]
pub fn user_ptr<T>(ptr: *const T) -> u64 {
    ptr as usize as u64
}

/// `IOCB_CMD_*`, 4 was the experimental PREADX and is skipped by the kernel.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Read = 0,
    Write = 1,
    FSync = 2,
    FDataSync = 3,
    Poll = 5,
    NoOp = 6,
    ReadV = 7,
    WriteV = 8,
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Read),
            1 => Ok(Opcode::Write),
            2 => Ok(Opcode::FSync),
            3 => Ok(Opcode::FDataSync),
            5 => Ok(Opcode::Poll),
            6 => Ok(Opcode::NoOp),
            7 => Ok(Opcode::ReadV),
            8 => Ok(Opcode::WriteV),
            other => Err(other),
        }
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct IocbFlags: u32 {
        /// `aio_resfd` is an eventfd the kernel signals on completion
        const RESFD  = (1_u32 << 0);
        /// `aio_reqprio` is valid
        const IOPRIO = (1_u32 << 1);
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ReadWriteFlags: u32 {
        /// High priority request, will use poll if possible on block based devices. Only usable on
        /// files opened with O_DIRECT.
        const HIPRI  = 0x00000001;
        /// Per-IO equivalent of the O_DSYNC open(2) flag.
        const DSYNC  = 0x00000002;
        /// Per-IO equivalent of the O_SYNC open(2) flag.
        const SYNC   = 0x00000004;
        /// Per-IO, fail with -EAGAIN if the operation would block.
        const NOWAIT = 0x00000008;
        /// Per-IO equivalent of the O_APPEND open(2) flag.
        const APPEND = 0x00000010;
    }
}

/// AIO request descriptor, `struct iocb` from `<linux/aio_abi.h>`.
///
/// The kernel copies this structure during `io_submit`, but remembers its user address as the
/// identity reported in [`IoEvent::obj`] and looked up by `io_cancel`, so a submitted `Iocb` must
/// not move until it completes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Iocb {
    /// Returned untouched in [`IoEvent::data`]
    pub user_data: u64,
    #[cfg(target_endian = "little")]
    pub key: u32,
    #[cfg(target_endian = "little")]
    pub rw_flags: u32,
    #[cfg(target_endian = "big")]
    pub rw_flags: u32,
    #[cfg(target_endian = "big")]
    pub key: u32,
    pub opcode: u16,
    pub priority: IOPriority,
    pub fd: u32,
    /// Pointer to a buffer or to an array of iovecs
    pub buf: u64,
    /// Size of the buffer, or number of iovecs
    pub nbytes: u64,
    pub offset: i64,
    pub reserved2: u64,
    pub flags: u32,
    pub resfd: u32,
}

impl Iocb {
    pub fn new(fd: libc::c_int) -> Self {
        Iocb {
            user_data: 0,
            key: 0,
            rw_flags: 0,
            opcode: OPCODE_UNSET,
            priority: 0,
            fd: fd as u32,
            buf: 0,
            nbytes: 0,
            offset: 0,
            reserved2: 0,
            flags: 0,
            resfd: 0,
        }
    }

    /// The prepared operation, `None` until one of the `prep_*` calls.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    #[inline]
    fn prep(&mut self, op: Opcode, buf: u64, nbytes: u64, offset: i64) {
        self.opcode = op as u16;
        self.buf = buf;
        self.nbytes = nbytes;
        self.offset = offset;
    }

    pub fn prep_pread(&mut self, buf: *mut u8, len: usize, offset: i64) {
        self.prep(Opcode::Read, user_ptr(buf), len as u64, offset)
    }

    pub fn prep_pwrite(&mut self, buf: *const u8, len: usize, offset: i64) {
        self.prep(Opcode::Write, user_ptr(buf), len as u64, offset)
    }

    pub fn prep_preadv(&mut self, iov: *const [libc::iovec], offset: i64) {
        self.prep(Opcode::ReadV, user_ptr(iov as *const libc::iovec), iov.len() as u64, offset)
    }

    pub fn prep_pwritev(&mut self, iov: *const [libc::iovec], offset: i64) {
        self.prep(Opcode::WriteV, user_ptr(iov as *const libc::iovec), iov.len() as u64, offset)
    }

    pub fn prep_fsync(&mut self) {
        self.prep(Opcode::FSync, 0, 0, 0)
    }

    pub fn prep_fdsync(&mut self) {
        self.prep(Opcode::FDataSync, 0, 0, 0)
    }

    /// The kernel reads the poll(2) event mask from `aio_buf`.
    pub fn prep_poll(&mut self, events: libc::c_short) {
        self.prep(Opcode::Poll, events as u16 as u64, 0, 0)
    }

    pub fn prep_noop(&mut self) {
        self.prep(Opcode::NoOp, 0, 0, 0)
    }

    pub fn set_eventfd(&mut self, eventfd: libc::c_int) {
        self.flags |= IocbFlags::RESFD.bits();
        self.resfd = eventfd as u32;
    }

    pub fn set_priority(&mut self, priority: IOPriority) {
        self.flags |= IocbFlags::IOPRIO.bits();
        self.priority = priority;
    }

    pub fn set_rw_flags(&mut self, rw_flags: ReadWriteFlags) {
        self.rw_flags = rw_flags.bits();
    }

    pub fn iocb_flags(&self) -> IocbFlags {
        IocbFlags::from_bits_truncate(self.flags)
    }
}

/// Completion of a single request, `struct io_event`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    /// `Iocb::user_data` of the originating request
    pub data: u64,
    /// User address of the originating `Iocb`
    pub obj: u64,
    /// Bytes transferred, or a negative errno
    pub res: i64,
    pub res2: i64,
}

/// Header of the completion ring the kernel maps at the context address, `struct aio_ring`. The
/// `nr` completion slots follow directly after it.
#[repr(C)]
#[derive(Debug, Default)]
pub struct RingHeader {
    pub id: u32,
    pub nr: u32,
    pub head: u32,
    pub tail: u32,
    pub magic: u32,
    pub compat_features: u32,
    pub incompat_features: u32,
    pub header_length: u32,
}

/// Build an iovec covering `data`.
pub fn iovec_from(data: &[u8]) -> libc::iovec {
    libc::iovec {
        iov_base: data.as_ptr() as *mut libc::c_void,
        iov_len: data.len(),
    }
}
