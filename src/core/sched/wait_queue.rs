//! Wait queue - doubly linked list of blocked threads
//!
//! Synchronization objects park blocked threads on a wait queue. The
//! queue reuses the TCB ready-list links (a thread is never ready and
//! blocked at the same time) and records a back pointer in the TCB so the
//! timeout path can unlink the thread without knowing which object it
//! blocked on.

use core::ptr::NonNull;

use crate::thread::Tcb;

/// Queue of threads blocked on a synchronization object.
#[derive(Debug)]
pub struct WaitQueue {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
}

impl WaitQueue {
    /// Create a new empty wait queue
    pub const fn new() -> Self {
        WaitQueue {
            head: None,
            tail: None,
        }
    }

    /// Get head of queue (first to be released)
    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    /// Check if queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert TCB at the tail (FIFO order)
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert(&mut self, mut tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { tcb.as_mut() };

        tcb_ref.next = None;
        tcb_ref.prev = self.tail;
        tcb_ref.wait_obj = self as *mut WaitQueue;

        match self.tail {
            Some(tail) => {
                unsafe { (*tail.as_ptr()).next = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        self.tail = Some(tcb);
    }

    /// Insert TCB ordered by priority, most urgent first
    ///
    /// FIFO among threads of equal priority: the new entry goes behind
    /// existing entries at its own level.
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert_by_prio(&mut self, mut tcb: NonNull<Tcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;

        // Find the first entry strictly less urgent than the new one.
        let mut point = self.head;
        while let Some(p) = point {
            if unsafe { p.as_ref() }.prio < prio {
                break;
            }
            point = unsafe { p.as_ref() }.next;
        }

        let tcb_ref = unsafe { tcb.as_mut() };
        tcb_ref.wait_obj = self as *mut WaitQueue;
        tcb_ref.next = point;

        match point {
            Some(mut next) => {
                let next_ref = unsafe { next.as_mut() };
                tcb_ref.prev = next_ref.prev;
                next_ref.prev = Some(tcb);
            }
            None => {
                tcb_ref.prev = self.tail;
                self.tail = Some(tcb);
            }
        }

        match tcb_ref.prev {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }
    }

    /// Remove a TCB from the queue
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and is in this queue.
    pub fn remove(&mut self, mut tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { tcb.as_mut() };

        match tcb_ref.prev {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next = tcb_ref.next };
            }
            None => {
                self.head = tcb_ref.next;
            }
        }

        match tcb_ref.next {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev = tcb_ref.prev };
            }
            None => {
                self.tail = tcb_ref.prev;
            }
        }

        tcb_ref.prev = None;
        tcb_ref.next = None;
        tcb_ref.wait_obj = core::ptr::null_mut();
    }

    /// Remove and return the head of the queue
    pub fn pop_front(&mut self) -> Option<NonNull<Tcb>> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: WaitQueue is only modified within critical sections
unsafe impl Send for WaitQueue {}
unsafe impl Sync for WaitQueue {}
