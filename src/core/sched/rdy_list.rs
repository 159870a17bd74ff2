//! Per-priority ready list.
//!
//! One intrusive doubly-linked list per priority level. Threads join at
//! the tail and are scheduled from the head; a preempted thread rejoins at
//! the head so it resumes before its FIFO peers.

use core::ptr::NonNull;

use crate::thread::Tcb;

/// Ready list for a single priority level.
#[derive(Debug)]
pub struct ReadyList {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
    #[cfg(feature = "defmt")]
    count: usize,
}

impl ReadyList {
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
            #[cfg(feature = "defmt")]
            count: 0,
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// First thread to be scheduled at this level.
    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of entries, tracked for diagnostics only.
    #[cfg(feature = "defmt")]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Append at the tail (FIFO order).
    ///
    /// # Safety
    /// `tcb` must be valid and not linked into any list.
    pub fn insert_tail(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.next = None;
        tcb_ref.prev = self.tail;

        if let Some(tail) = self.tail {
            unsafe { (*tail.as_ptr()).next = Some(tcb) };
        } else {
            self.head = Some(tcb);
        }
        self.tail = Some(tcb);

        self.bump(1);
    }

    /// Prepend at the head, ahead of the FIFO peers.
    ///
    /// # Safety
    /// `tcb` must be valid and not linked into any list.
    pub fn insert_head(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.prev = None;
        tcb_ref.next = self.head;

        if let Some(head) = self.head {
            unsafe { (*head.as_ptr()).prev = Some(tcb) };
        } else {
            self.tail = Some(tcb);
        }
        self.head = Some(tcb);

        self.bump(1);
    }

    /// Unlink a thread from this list.
    ///
    /// # Safety
    /// `tcb` must be valid and linked into this list.
    pub fn remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.prev {
            Some(prev) => unsafe { (*prev.as_ptr()).next = tcb_ref.next },
            None => self.head = tcb_ref.next,
        }
        match tcb_ref.next {
            Some(next) => unsafe { (*next.as_ptr()).prev = tcb_ref.prev },
            None => self.tail = tcb_ref.prev,
        }

        tcb_ref.prev = None;
        tcb_ref.next = None;

        self.bump(-1);
    }

    #[cfg(feature = "defmt")]
    #[inline]
    fn bump(&mut self, delta: isize) {
        self.count = self.count.wrapping_add_signed(delta);
    }

    #[cfg(not(feature = "defmt"))]
    #[inline]
    fn bump(&mut self, _delta: isize) {}
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

// Only mutated inside critical sections.
unsafe impl Send for ReadyList {}
unsafe impl Sync for ReadyList {}

impl Copy for ReadyList {}

impl Clone for ReadyList {
    fn clone(&self) -> Self {
        *self
    }
}
