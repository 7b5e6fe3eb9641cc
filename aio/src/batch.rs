use std::io;

use aio_sys::{
    user_ptr,
    AioError,
    CancelOutcome,
    IoContext,
    IoEvent,
    Iocb,
    Result,
    SyscallLib,
};

use crate::Request;

/// Requests gathered for a single `io_submit`.
pub struct Batch<'r, 'buf> {
    requests: Vec<&'r mut Request<'buf>>,
}

/// Outcome of [`Batch::submit`].
pub struct Submitted<'r, 'buf> {
    /// Accepted requests, in submission order
    pub in_flight: Vec<InFlight<'r, 'buf>>,
    /// Requests the kernel did not take, untouched and ready to be submitted again
    pub rejected: Vec<&'r mut Request<'buf>>,
}

impl<'r, 'buf> Default for Batch<'r, 'buf> {
    fn default() -> Self {
        Batch { requests: Vec::new() }
    }
}

impl<'r, 'buf> Batch<'r, 'buf> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Batch { requests: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, request: &'r mut Request<'buf>) -> &mut Self {
        self.requests.push(request);
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Hand the batch to the kernel.
    ///
    /// A short count is not an error: the requests past it come back in
    /// [`Submitted::rejected`]. Fails before anything is submitted with
    /// [`AioError::InvalidDescriptor`] if a request has no operation prepared, and with
    /// [`AioError::InvalidArgument`] if a request is still in flight from an earlier submission.
    ///
    /// # Safety
    ///
    /// The kernel owns an accepted request and every buffer it references until the request's
    /// completion is produced, but the borrow held by its [`InFlight`] token ends as soon as the
    /// token is dropped. Each token must be retired, or its completion otherwise reaped, before its
    /// request or any of those buffers is dropped, moved or prepared again.
    ///
    /// ```compile_fail
    /// let ctx = aio::IoContextBuilder::new().build().unwrap();
    /// let mut request = aio::Request::from_raw_fd(0);
    /// request.noop();
    /// let mut batch = aio::Batch::new();
    /// batch.push(&mut request);
    /// let _ = batch.submit(&ctx);
    /// ```
    pub unsafe fn submit<S: SyscallLib>(self, ctx: &IoContext<S>) -> Result<Submitted<'r, 'buf>> {
        let mut requests = self.requests;
        if requests.iter().any(|request| request.is_in_flight()) {
            return Err(AioError::InvalidArgument("request is already in flight"));
        }

        let mut iocbs: Vec<*mut Iocb> = requests.iter_mut().map(|request| request.iocb_ptr()).collect();
        let accepted = ctx.submit(&mut iocbs)?;

        let rejected = requests.split_off(accepted);
        let in_flight = requests
            .into_iter()
            .map(|request| {
                request.set_in_flight(true);
                InFlight { request }
            })
            .collect();
        Ok(Submitted { in_flight, rejected })
    }
}

/// Proof that a request is owned by the kernel.
///
/// The token holds the request's only borrow, so the request cannot be prepared again or dropped
/// (and neither can its buffers) while the token is alive. Dropping the token instead of retiring
/// it leaves the request marked in flight for good.
#[must_use = "the request stays in flight until the token is retired"]
pub struct InFlight<'r, 'buf> {
    request: &'r mut Request<'buf>,
}

impl<'r, 'buf> InFlight<'r, 'buf> {
    pub fn key(&self) -> u64 {
        self.request.key()
    }

    /// Whether `event` is this request's completion.
    pub fn matches(&self, event: &IoEvent) -> bool {
        event.obj == user_ptr(self.request.iocb() as *const Iocb)
    }

    /// Give the request back once its completion has been reaped. A foreign event returns the
    /// token unchanged.
    pub fn retire(mut self, event: &IoEvent) -> std::result::Result<Completion<'r, 'buf>, Self> {
        if self.matches(event) {
            self.request.set_in_flight(false);
            Ok(Completion {
                request: self.request,
                event: *event,
            })
        } else {
            Err(self)
        }
    }

    /// Ask the kernel to cancel the request.
    ///
    /// On [`CancelOutcome::Cancelled`] the returned event retires the token. When the kernel
    /// refuses, the result tells why as far as the ring shows:
    /// - [`AioError::AlreadyCompleted`]: the completion is waiting in the ring and retires this
    ///   token once reaped.
    /// - [`AioError::NotFound`]: no completion is waiting. Either the operation cannot be cancelled
    ///   (reads and writes of regular files) and is still running, or its completion was already
    ///   reaped and not yet retired.
    pub fn cancel<S: SyscallLib>(&mut self, ctx: &IoContext<S>) -> Result<CancelOutcome> {
        let iocb = self.request.iocb_ptr();
        match unsafe { ctx.cancel(iocb) } {
            Err(AioError::NotFound) if ctx.completion_pending(iocb) => Err(AioError::AlreadyCompleted),
            other => other,
        }
    }
}

/// A retired request together with its completion.
pub struct Completion<'r, 'buf> {
    request: &'r mut Request<'buf>,
    event: IoEvent,
}

impl<'r, 'buf> Completion<'r, 'buf> {
    pub fn key(&self) -> u64 {
        self.event.data
    }

    pub fn result(&self) -> i64 {
        self.event.res
    }

    pub fn result2(&self) -> i64 {
        self.event.res2
    }

    pub fn event(&self) -> &IoEvent {
        &self.event
    }

    /// Bytes transferred, or the error the kernel reported.
    pub fn bytes(&self) -> io::Result<usize> {
        if self.event.res < 0 {
            Err(io::Error::from_raw_os_error(-self.event.res as i32))
        } else {
            Ok(self.event.res as usize)
        }
    }

    pub fn request(&self) -> &Request<'buf> {
        &*self.request
    }

    /// The request, free to be prepared and submitted again.
    pub fn into_request(self) -> &'r mut Request<'buf> {
        self.request
    }
}
