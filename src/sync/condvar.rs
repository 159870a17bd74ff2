//! Condition variables
//!
//! A condition variable pairs with a [`Mutex`] to wait for a predicate on
//! the state the mutex protects. Waiters queue in priority order; `signal`
//! releases the most urgent waiter with `Msg::Ok`, `broadcast` releases
//! every waiter with `Msg::Reset` so callers can tell the two apart.
//!
//! The mutex is released and the wait entered atomically under the kernel
//! lock, closing the window where a signal could fire between the two. On
//! a normal wakeup the mutex is re-acquired before returning; on timeout
//! it is not, and the caller must not touch the protected state.

use core::cell::UnsafeCell;

use crate::critical::{is_isr_context, critical_section, CriticalSection};
use crate::dbg_check;
use crate::debug;
use crate::kernel;
use crate::sched::{self, WaitQueue};
use crate::sync::mutex::Mutex;
use crate::types::{Msg, ThreadState, Interval, TIME_IMMEDIATE, TIME_INFINITE};

/// Condition variable
pub struct Condvar {
    queue: UnsafeCell<WaitQueue>,
}

unsafe impl Sync for Condvar {}
unsafe impl Send for Condvar {}

impl Condvar {
    /// Create a new condition variable with no waiters
    pub const fn new() -> Self {
        Condvar {
            queue: UnsafeCell::new(WaitQueue::new()),
        }
    }

    /// Wait on the condition variable, releasing `mtx` while blocked.
    ///
    /// The caller must own `mtx`. `TIME_IMMEDIATE` is a usage error: a
    /// condition wait cannot poll.
    ///
    /// # Returns
    /// * `Msg::Ok` - woken by [`signal`](Condvar::signal); `mtx` re-acquired
    /// * `Msg::Reset` - woken by [`broadcast`](Condvar::broadcast); `mtx`
    ///   re-acquired
    /// * `Msg::Timeout` - timeout elapsed; `mtx` NOT re-acquired
    pub fn wait(&self, mtx: &Mutex, timeout: Interval) -> Msg {
        dbg_check!(!is_isr_context(), "condvar wait in ISR");
        dbg_check!(timeout != TIME_IMMEDIATE, "condvar wait cannot poll");

        let cs = CriticalSection::enter();

        let cur = kernel::current_tcb(&cs)
            .unwrap_or_else(|| debug::sys_halt("no current thread"));
        dbg_check!(mtx.owned_by(&cs, cur), "condvar wait without owning the mutex");

        mtx.unlock_s(&cs);
        unsafe { &mut *self.queue.get() }.insert_by_prio(cur);

        let msg = sched::sleep_with_timeout(cs, ThreadState::WtCond, timeout);

        if !msg.is_timeout() {
            let _ = mtx.lock(TIME_INFINITE);
        }
        msg
    }

    /// Wait without a timeout. The mutex is always re-acquired.
    #[inline]
    pub fn wait_forever(&self, mtx: &Mutex) -> Msg {
        self.wait(mtx, TIME_INFINITE)
    }

    /// Wake the most urgent waiter with `Msg::Ok`, switching to it at once
    /// when it is more urgent than the caller. No-op without waiters.
    pub fn signal(&self) {
        critical_section(|cs| {
            if let Some(waiter) = unsafe { &mut *self.queue.get() }.pop_front() {
                sched::wakeup_s(cs, waiter, Msg::Ok);
            }
        });
    }

    /// Wake the most urgent waiter with the kernel already locked, legal
    /// from interrupt handlers.
    pub fn signal_i(&self, cs: &CriticalSection) {
        if let Some(waiter) = unsafe { &mut *self.queue.get() }.pop_front() {
            sched::wakeup_i(cs, waiter, Msg::Ok);
        }
    }

    /// Wake every waiter with `Msg::Reset`, then reschedule.
    pub fn broadcast(&self) {
        critical_section(|cs| {
            let queue = unsafe { &mut *self.queue.get() };
            while let Some(waiter) = queue.pop_front() {
                sched::wakeup_i(cs, waiter, Msg::Reset);
            }
            sched::reschedule_s(cs);
        });
    }

    /// Whether any thread is waiting.
    pub fn has_waiters(&self) -> bool {
        critical_section(|_cs| !unsafe { &*self.queue.get() }.is_empty())
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
