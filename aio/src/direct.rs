//! Unbuffered (`O_DIRECT`) file access.
//!
//! Every buffer used against a file opened here must start on an [`ALIGN_SIZE`] boundary and span
//! a multiple of [`ALIGN_SIZE`] bytes. The kernel enforces this per request, failing the request
//! with `EINVAL`, not at open time.
use std::alloc::{self, Layout};
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr::NonNull;

/// Alignment, in bytes, of buffers, lengths and offsets for unbuffered I/O.
pub const ALIGN_SIZE: usize = 512;

/// Open `path` with `O_DIRECT` added to the open(2) `flags`. `perm` is the mode of a newly created
/// file.
pub fn open_direct<P: AsRef<Path>>(path: P, flags: libc::c_int, perm: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => options.write(true),
        libc::O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    options
        .append(flags & libc::O_APPEND != 0)
        .truncate(flags & libc::O_TRUNC != 0)
        .create(flags & libc::O_CREAT != 0)
        .create_new(flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0)
        .custom_flags(libc::O_DIRECT | (flags & !(libc::O_ACCMODE | libc::O_APPEND | libc::O_TRUNC | libc::O_CREAT | libc::O_EXCL)))
        .mode(perm);

    let file = options.open(path.as_ref())?;
    log::debug!("opened {} for direct I/O", path.as_ref().display());
    Ok(file)
}

/// Check a buffer against the direct I/O alignment rules without involving the kernel.
pub fn check_direct_buffer(buf: &[u8]) -> io::Result<()> {
    if buf.as_ptr() as usize % ALIGN_SIZE != 0 {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "buffer is not aligned for direct I/O"))
    } else if buf.len() % ALIGN_SIZE != 0 {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "buffer length is not a multiple of the direct I/O block"))
    } else {
        Ok(())
    }
}

/// Zeroed heap buffer aligned for direct I/O.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// `len` must be a non-zero multiple of [`ALIGN_SIZE`].
    pub fn new(len: usize) -> io::Result<Self> {
        if len == 0 || len % ALIGN_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "direct I/O buffers must be a non-zero multiple of 512 bytes",
            ));
        }

        let layout = Layout::from_size_align(len, ALIGN_SIZE)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;

        Ok(AlignedBuffer { ptr, layout })
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
