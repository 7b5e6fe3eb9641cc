use core::ptr::{
    addr_of,
    addr_of_mut,
};
use core::sync::atomic::{
    fence,
    Ordering,
};
use crate::{
    AioContextId,
    IoEvent,
    RingHeader,
    AIO_RING_MAGIC,
};

/// User space view of the completion ring the kernel maps at the context address.
///
/// The kernel produces events by advancing `tail`; we consume them by advancing `head`. Nothing
/// here is atomic with respect to another consumer, so at most one `CompletionRing` may be walking
/// a given context at a time.
#[derive(Debug)]
pub struct CompletionRing {
    // written by us, and by the kernel when it reaps on our behalf in io_getevents
    k_header: *mut RingHeader,
    // `nr` slots directly after the header
    k_events: *const IoEvent,
}

impl CompletionRing {
    /// Map the ring behind a context id, `None` when the memory does not carry the ring magic or
    /// has no slots.
    ///
    /// # Safety
    ///
    /// `ctx` must be zero, or the id of a live context (or memory laid out like one) that stays
    /// mapped for as long as the returned ring is used.
    pub unsafe fn from_context(ctx: AioContextId) -> Option<Self> {
        if ctx == 0 {
            return None;
        }

        let k_header = ctx as usize as *mut RingHeader;
        let ring = CompletionRing {
            k_header,
            k_events: k_header.add(1) as *const IoEvent,
        };

        if ring.magic() != AIO_RING_MAGIC || ring.capacity() == 0 {
            None
        } else {
            Some(ring)
        }
    }

    fn magic(&self) -> u32 {
        unsafe { core::ptr::read_volatile(addr_of!((*self.k_header).magic)) }
    }

    /// Number of slots in the ring
    pub fn capacity(&self) -> u32 {
        unsafe { core::ptr::read_volatile(addr_of!((*self.k_header).nr)) }
    }

    pub fn head(&self) -> u32 {
        unsafe { core::ptr::read_volatile(addr_of!((*self.k_header).head)) }
    }

    pub fn tail(&self) -> u32 {
        load_acquire(unsafe { addr_of!((*self.k_header).tail) })
    }

    pub fn is_empty(&self) -> bool {
        self.head() == self.tail()
    }

    fn event_at(&self, index: u32) -> Option<IoEvent> {
        if index >= self.capacity() {
            None
        } else {
            Some(unsafe { core::ptr::read_volatile(self.k_events.add(index as usize)) })
        }
    }

    /// Whether an event for the request submitted from user address `obj` sits between `head` and
    /// `tail`, waiting to be reaped. The kernel may add events while this runs.
    pub fn contains(&self, obj: u64) -> bool {
        let capacity = self.capacity();
        let tail = self.tail();
        let mut index = self.head();

        for _ in 0..capacity {
            if index == tail {
                break;
            }
            match self.event_at(index) {
                Some(event) if event.obj == obj => return true,
                Some(_) => index = (index + 1) % capacity,
                None => break,
            }
        }

        false
    }

    fn set_head(&mut self, head: u32) {
        unsafe { core::ptr::write_volatile(addr_of_mut!((*self.k_header).head), head) };
    }

    /// Copy completions out of the ring in kernel order, until `events` is full or the ring is
    /// drained. Returns how many were copied.
    pub fn reap(&mut self, events: &mut [IoEvent]) -> usize {
        let mut reaped = 0;

        while reaped < events.len() {
            let head = self.head();
            if head == self.tail() {
                break;
            }

            let event = match self.event_at(head) {
                Some(event) => event,
                // the kernel never publishes an out of range head
                None => break,
            };
            events[reaped] = event;

            // The slot must be fully read before the kernel can see it released.
            fence(Ordering::Acquire);
            self.set_head((head + 1) % self.capacity());
            reaped += 1;
        }

        reaped
    }
}

fn load_acquire<T>(ptr: *const T) -> T {
    let read_once = unsafe { core::ptr::read_volatile(ptr) };
    fence(Ordering::Acquire);
    read_once
}
