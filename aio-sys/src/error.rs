use core::fmt;

/// The AIO syscall that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    IoSetup,
    IoDestroy,
    IoSubmit,
    IoCancel,
    IoGetEvents,
}

impl Syscall {
    pub fn name(self) -> &'static str {
        match self {
            Syscall::IoSetup => "io_setup",
            Syscall::IoDestroy => "io_destroy",
            Syscall::IoSubmit => "io_submit",
            Syscall::IoCancel => "io_cancel",
            Syscall::IoGetEvents => "io_getevents",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AioError {
    /// Rejected before reaching the kernel
    InvalidArgument(&'static str),
    /// A null descriptor, or one with no operation prepared
    InvalidDescriptor,
    /// The kernel could not allocate a context or admit more requests
    ResourceExhausted(Syscall),
    Os {
        call: Syscall,
        errno: i32,
    },
    /// The request completed before it could be cancelled
    AlreadyCompleted,
    /// The kernel has no in-flight request matching the descriptor
    NotFound,
    /// Another reaper is draining this context
    ReaperClaimed,
}

pub type Result<T> = core::result::Result<T, AioError>;

impl AioError {
    /// Classify a failed syscall from its (positive) errno.
    pub(crate) fn from_errno(call: Syscall, errno: i32) -> Self {
        match (call, errno) {
            (Syscall::IoSetup, libc::EAGAIN)
            | (Syscall::IoSetup, libc::ENOMEM)
            | (Syscall::IoSubmit, libc::EAGAIN) => AioError::ResourceExhausted(call),
            _ => AioError::Os { call, errno },
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match *self {
            AioError::Os { errno, .. } => Some(errno),
            AioError::ResourceExhausted(_) => Some(libc::EAGAIN),
            AioError::InvalidArgument(_) | AioError::InvalidDescriptor => Some(libc::EINVAL),
            AioError::AlreadyCompleted | AioError::NotFound => Some(libc::EINVAL),
            AioError::ReaperClaimed => Some(libc::EBUSY),
        }
    }
}

impl fmt::Display for AioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AioError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            AioError::InvalidDescriptor => f.write_str("request has no operation prepared"),
            AioError::ResourceExhausted(call) => write!(f, "{}: kernel resources exhausted", call.name()),
            AioError::Os { call, errno } => write!(f, "{} failed with errno {}", call.name(), errno),
            AioError::AlreadyCompleted => f.write_str("request already completed"),
            AioError::NotFound => f.write_str("request not found in context"),
            AioError::ReaperClaimed => f.write_str("completions are already being reaped"),
        }
    }
}

impl core::error::Error for AioError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_errno_classification() {
        assert_eq!(AioError::ResourceExhausted(Syscall::IoSetup), AioError::from_errno(Syscall::IoSetup, libc::EAGAIN));
        assert_eq!(AioError::ResourceExhausted(Syscall::IoSetup), AioError::from_errno(Syscall::IoSetup, libc::ENOMEM));
        assert_eq!(AioError::ResourceExhausted(Syscall::IoSubmit), AioError::from_errno(Syscall::IoSubmit, libc::EAGAIN));
        assert_eq!(
            AioError::Os { call: Syscall::IoGetEvents, errno: libc::EINTR },
            AioError::from_errno(Syscall::IoGetEvents, libc::EINTR)
        );
        assert_eq!(Some(libc::EBADF), AioError::from_errno(Syscall::IoSubmit, libc::EBADF).raw_os_error());
    }
}
