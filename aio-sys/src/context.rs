use core::marker::PhantomData;
use core::sync::atomic::{
    AtomicBool,
    Ordering,
};
use core::time::Duration;
use crate::{
    AioContextId,
    AioError,
    CompletionRing,
    Iocb,
    IoEvent,
    Result,
    Syscall,
    SyscallLib,
    Syscalls,
    user_ptr,
};

pub type Aio = IoContext<Syscalls>;

/// How a successful cancellation was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The kernel returned the cancelled completion directly; it will not appear in the ring.
    Cancelled(IoEvent),
    /// Cancellation started; the completion is delivered through the ring and must be reaped.
    Queued,
}

/// A kernel AIO context.
///
/// `submit` and `cancel` may be called from many threads at once. Completions have a single
/// consumer: either `get_events` through `&mut self`, or the one [`CompletionReaper`] handed out by
/// [`IoContext::reaper`].
#[derive(Debug)]
pub struct IoContext<S: SyscallLib> {
    id: AioContextId,
    max_events: u32,
    user_ring: bool,
    reaper_claimed: AtomicBool,

    syscall_lib_marker: PhantomData<fn() -> S>,
}

impl<S: SyscallLib> IoContext<S> {
    /// Create a context able to hold `max_events` requests in flight.
    pub fn setup(max_events: usize) -> Result<Self> {
        Self::setup_with(max_events, true)
    }

    pub(crate) fn setup_with(max_events: usize, user_ring: bool) -> Result<Self> {
        if max_events == 0 || max_events > libc::c_uint::MAX as usize {
            return Err(AioError::InvalidArgument("max_events must be within 1..=u32::MAX"));
        }

        let mut id: AioContextId = 0;
        let result = S::io_setup(max_events as libc::c_uint, &mut id);
        if result < 0 {
            return Err(AioError::from_errno(Syscall::IoSetup, -result as i32));
        }

        log::debug!("io_setup({}) -> context 0x{:x}", max_events, id);
        Ok(Self::new(id, max_events as u32, user_ring))
    }

    /// Adopt an existing context. It is destroyed when the returned value is.
    ///
    /// # Safety
    ///
    /// `id` must be a live context id that nothing else will destroy.
    pub unsafe fn from_raw(id: AioContextId, max_events: u32) -> Self {
        Self::new(id, max_events, true)
    }

    fn new(id: AioContextId, max_events: u32, user_ring: bool) -> Self {
        IoContext {
            id,
            max_events,
            user_ring,
            reaper_claimed: AtomicBool::new(false),
            syscall_lib_marker: PhantomData,
        }
    }

    pub fn id(&self) -> AioContextId {
        self.id
    }

    /// The depth requested at setup
    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    /// Tear the context down. Completions that were not reaped are lost.
    pub fn destroy(mut self) -> Result<()> {
        let id = core::mem::replace(&mut self.id, 0);
        Self::destroy_id(id)
    }

    fn destroy_id(id: AioContextId) -> Result<()> {
        let result = S::io_destroy(id);
        if result < 0 {
            return Err(AioError::from_errno(Syscall::IoDestroy, -result as i32));
        }

        log::debug!("io_destroy(0x{:x})", id);
        Ok(())
    }

    /// Submit a batch, returning how many of the leading descriptors the kernel accepted. The rest
    /// were not submitted and may be submitted again.
    ///
    /// # Safety
    ///
    /// Every pointer must reference an `Iocb` that stays at the same address, together with every
    /// buffer and iovec array it references, until its completion has been reaped or its
    /// cancellation reported. None of them may already be in flight.
    pub unsafe fn submit(&self, iocbs: &mut [*mut Iocb]) -> Result<usize> {
        if iocbs.is_empty() {
            return Ok(0);
        }

        for &iocb in iocbs.iter() {
            if iocb.is_null() || (*iocb).opcode().is_none() {
                return Err(AioError::InvalidDescriptor);
            }
        }

        let result = S::io_submit(self.id, iocbs.len() as libc::c_long, iocbs.as_mut_ptr());
        if result < 0 {
            return Err(AioError::from_errno(Syscall::IoSubmit, -result as i32));
        }

        let submitted = result as usize;
        if submitted < iocbs.len() {
            log::debug!("io_submit accepted {} of {} requests", submitted, iocbs.len());
        }
        Ok(submitted)
    }

    /// Attempt to cancel an in-flight request.
    ///
    /// # Safety
    ///
    /// `iocb` must be the address the request was submitted from.
    pub unsafe fn cancel(&self, iocb: *mut Iocb) -> Result<CancelOutcome> {
        if iocb.is_null() {
            return Err(AioError::InvalidDescriptor);
        }

        let mut event = IoEvent::default();
        let result = S::io_cancel(self.id, iocb, &mut event);
        match -result as i32 {
            0 => Ok(CancelOutcome::Cancelled(event)),
            libc::EINPROGRESS => Ok(CancelOutcome::Queued),
            libc::EINVAL => Err(AioError::NotFound),
            errno => Err(AioError::from_errno(Syscall::IoCancel, errno)),
        }
    }

    /// Whether the completion of the request submitted from `iocb` is in the mapped ring and not
    /// yet reaped. Always `false` when the ring is not used.
    ///
    /// Only a snapshot: the reaper may take the event, and the kernel may add it, right after.
    pub fn completion_pending(&self, iocb: *const Iocb) -> bool {
        if !self.user_ring {
            return false;
        }

        match unsafe { CompletionRing::from_context(self.id) } {
            Some(ring) => ring.contains(user_ptr(iocb)),
            None => false,
        }
    }

    /// Reap between `min_nr` and `events.len()` completions. See [`CompletionReaper::get_events`].
    pub fn get_events(&mut self, min_nr: usize, events: &mut [IoEvent], timeout: Option<Duration>) -> Result<usize> {
        self.get_events_shared(min_nr, events, timeout)
    }

    /// Claim the single completion consumer of a shared context.
    pub fn reaper(&self) -> Result<CompletionReaper<'_, S>> {
        self.reaper_claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| AioError::ReaperClaimed)?;
        Ok(CompletionReaper { ctx: self })
    }

    // Callers guarantee they are the only consumer.
    fn get_events_shared(&self, min_nr: usize, events: &mut [IoEvent], timeout: Option<Duration>) -> Result<usize> {
        if min_nr > events.len() {
            return Err(AioError::InvalidArgument("min_nr exceeds the number of events requested"));
        }

        if let Some(reaped) = self.reap_user_ring(events, timeout) {
            log::trace!("reaped {} events from the user ring", reaped);
            return Ok(reaped);
        }

        let mut timespec = timeout.map(to_timespec);
        let timeout_ptr = match timespec {
            Some(ref mut ts) => ts as *mut libc::timespec,
            None => core::ptr::null_mut(),
        };

        let result = S::io_getevents(
            self.id,
            min_nr as libc::c_long,
            events.len() as libc::c_long,
            events.as_mut_ptr(),
            timeout_ptr,
        );
        if result < 0 {
            return Err(AioError::from_errno(Syscall::IoGetEvents, -result as i32));
        }

        log::trace!("io_getevents reaped {} events", result);
        Ok(result as usize)
    }

    /// Reap straight from the mapped ring. `None` means the syscall is needed: the ring is unusable,
    /// or it was empty and the caller is willing to wait.
    ///
    /// Never waits for `min_nr`: any non-zero count is returned as is.
    pub(crate) fn reap_user_ring(&self, events: &mut [IoEvent], timeout: Option<Duration>) -> Option<usize> {
        if !self.user_ring {
            return None;
        }

        let mut ring = unsafe { CompletionRing::from_context(self.id) }?;
        let reaped = ring.reap(events);

        if reaped > 0 {
            Some(reaped)
        } else if timeout == Some(Duration::ZERO) && ring.is_empty() {
            Some(0)
        } else {
            None
        }
    }
}

impl<S: SyscallLib> Drop for IoContext<S> {
    fn drop(&mut self) {
        if self.id != 0 {
            if let Err(err) = Self::destroy_id(self.id) {
                log::warn!("failed to destroy aio context 0x{:x}: {}", self.id, err);
            }
        }
    }
}

/// The single completion consumer of a context, released on drop.
#[derive(Debug)]
pub struct CompletionReaper<'a, S: SyscallLib> {
    ctx: &'a IoContext<S>,
}

impl<S: SyscallLib> CompletionReaper<'_, S> {
    /// Reap up to `events.len()` completions in kernel completion order.
    ///
    /// Completions already in the ring are returned without a syscall, even when there are fewer
    /// than `min_nr`. Only when the ring is unusable, or empty with a non-zero `timeout`, does this
    /// block in `io_getevents` for at least `min_nr` events. `None` waits forever.
    pub fn get_events(&mut self, min_nr: usize, events: &mut [IoEvent], timeout: Option<Duration>) -> Result<usize> {
        self.ctx.get_events_shared(min_nr, events, timeout)
    }
}

impl<S: SyscallLib> Drop for CompletionReaper<'_, S> {
    fn drop(&mut self) {
        self.ctx.reaper_claimed.store(false, Ordering::Release);
    }
}

fn to_timespec(timeout: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: core::cmp::min(timeout.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    }
}
