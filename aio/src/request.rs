use std::marker::PhantomData;
use std::os::unix::io::{AsRawFd, RawFd};

use aio_sys::{
    iovec_from,
    IOPriority,
    Iocb,
    Opcode,
    ReadWriteFlags,
};

/// One I/O operation, ready to be pushed onto a [`Batch`](crate::Batch).
///
/// Every buffer the request points at is borrowed for `'buf`, so none of them can be freed or
/// touched while the request exists. The iovec array of a vectored request lives inside the
/// request itself.
///
/// A request the kernel accepted stays marked in flight until its [`InFlight`](crate::InFlight)
/// token is retired, and is refused by [`Batch::submit`](crate::Batch::submit) until then.
pub struct Request<'buf> {
    iocb: Iocb,
    iovecs: Vec<libc::iovec>,
    in_flight: bool,
    _buffers: PhantomData<&'buf mut [u8]>,
}

// The raw pointers only ever refer to buffers borrowed for 'buf.
unsafe impl Send for Request<'_> {}
unsafe impl Sync for Request<'_> {}

impl<'buf> Request<'buf> {
    pub fn new<F: AsRawFd>(file: &F) -> Self {
        Self::from_raw_fd(file.as_raw_fd())
    }

    pub fn from_raw_fd(fd: RawFd) -> Self {
        Request {
            iocb: Iocb::new(fd),
            iovecs: Vec::new(),
            in_flight: false,
            _buffers: PhantomData,
        }
    }

    pub fn read(&mut self, buf: &'buf mut [u8], offset: u64) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_pread(buf.as_mut_ptr(), buf.len(), offset as i64);
        self
    }

    pub fn write(&mut self, buf: &'buf [u8], offset: u64) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_pwrite(buf.as_ptr(), buf.len(), offset as i64);
        self
    }

    /// Scatter read into `bufs`, filled in the order given.
    pub fn readv<I>(&mut self, bufs: I, offset: u64) -> &mut Self
    where
        I: IntoIterator<Item = &'buf mut [u8]>,
    {
        self.iovecs.clear();
        self.iovecs.extend(bufs.into_iter().map(|buf| iovec_from(buf)));
        let iovecs: *const [libc::iovec] = self.iovecs.as_slice();
        self.iocb.prep_preadv(iovecs, offset as i64);
        self
    }

    /// Gather write from `bufs`, written in the order given.
    pub fn writev<I>(&mut self, bufs: I, offset: u64) -> &mut Self
    where
        I: IntoIterator<Item = &'buf [u8]>,
    {
        self.iovecs.clear();
        self.iovecs.extend(bufs.into_iter().map(iovec_from));
        let iovecs: *const [libc::iovec] = self.iovecs.as_slice();
        self.iocb.prep_pwritev(iovecs, offset as i64);
        self
    }

    pub fn fsync(&mut self) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_fsync();
        self
    }

    pub fn fdatasync(&mut self) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_fdsync();
        self
    }

    /// Complete once the file is ready for any of the poll(2) `events`.
    pub fn poll(&mut self, events: libc::c_short) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_poll(events);
        self
    }

    pub fn noop(&mut self) -> &mut Self {
        self.iovecs.clear();
        self.iocb.prep_noop();
        self
    }

    /// Correlation key, returned in [`IoEvent::data`](aio_sys::IoEvent::data).
    pub fn set_key(&mut self, key: u64) -> &mut Self {
        self.iocb.user_data = key;
        self
    }

    pub fn set_priority(&mut self, priority: IOPriority) -> &mut Self {
        self.iocb.set_priority(priority);
        self
    }

    pub fn set_rw_flags(&mut self, flags: ReadWriteFlags) -> &mut Self {
        self.iocb.set_rw_flags(flags);
        self
    }

    /// Have the kernel signal the eventfd `fd` when this request completes.
    pub fn set_completion_signal(&mut self, fd: RawFd) -> &mut Self {
        self.iocb.set_eventfd(fd);
        self
    }

    pub fn key(&self) -> u64 {
        self.iocb.user_data
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.iocb.opcode()
    }

    pub fn fd(&self) -> RawFd {
        self.iocb.fd as RawFd
    }

    pub fn iocb(&self) -> &Iocb {
        &self.iocb
    }

    /// The iovec array of a vectored request, empty otherwise.
    pub fn iovecs(&self) -> &[libc::iovec] {
        &self.iovecs
    }

    /// Whether the kernel accepted this request and its token has not been retired yet.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    pub(crate) fn iocb_ptr(&mut self) -> *mut Iocb {
        &mut self.iocb
    }
}
