//! Semaphore implementation
//!
//! Counting semaphores for thread synchronization and resource counting.
//! Waiters queue in FIFO order; a signal with waiters present hands the
//! unit directly to the longest-waiting thread without touching the
//! counter.

use core::cell::UnsafeCell;

use crate::critical::{is_isr_context, critical_section, CriticalSection};
use crate::dbg_check;
use crate::kernel;
use crate::sched::{self, WaitQueue};
use crate::types::{Msg, ThreadState, Interval, TIME_IMMEDIATE};

/// Semaphore counter type
pub type SemCount = u32;

struct SemState {
    queue: WaitQueue,
    count: SemCount,
}

/// Counting semaphore
pub struct Semaphore {
    inner: UnsafeCell<SemState>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    /// Create a new semaphore with an initial count
    pub const fn new(count: SemCount) -> Self {
        Semaphore {
            inner: UnsafeCell::new(SemState {
                queue: WaitQueue::new(),
                count,
            }),
        }
    }

    /// Wait on the semaphore.
    ///
    /// Takes a unit when available, otherwise blocks up to `timeout` ticks.
    /// `TIME_IMMEDIATE` polls, `TIME_INFINITE` waits forever.
    ///
    /// # Returns
    /// * `Msg::Ok` - unit acquired
    /// * `Msg::Timeout` - timeout elapsed, or polling found no unit
    /// * `Msg::Reset` - the semaphore was reset while waiting
    pub fn wait(&self, timeout: Interval) -> Msg {
        dbg_check!(!is_isr_context(), "semaphore wait in ISR");

        let cs = CriticalSection::enter();
        let sem = unsafe { &mut *self.inner.get() };

        if sem.count > 0 {
            sem.count -= 1;
            return Msg::Ok;
        }

        if timeout == TIME_IMMEDIATE {
            return Msg::Timeout;
        }

        let cur = match kernel::current_tcb(&cs) {
            Some(p) => p,
            None => return Msg::Timeout,
        };
        sem.queue.insert(cur);

        sched::sleep_with_timeout(cs, ThreadState::WtSem, timeout)
    }

    /// Signal the semaphore from thread context.
    ///
    /// Wakes the longest-waiting thread, switching to it at once when it is
    /// more urgent than the caller; increments the counter when nobody
    /// waits.
    pub fn signal(&self) {
        critical_section(|cs| {
            let sem = unsafe { &mut *self.inner.get() };

            match sem.queue.pop_front() {
                Some(waiter) => sched::wakeup_s(cs, waiter, Msg::Ok),
                None => {
                    dbg_check!(sem.count < SemCount::MAX, "semaphore overflow");
                    sem.count += 1;
                }
            }
        });
    }

    /// Signal the semaphore with the kernel already locked, legal from
    /// interrupt handlers. Preemption is evaluated at the interrupt
    /// epilogue.
    pub fn signal_i(&self, cs: &CriticalSection) {
        let sem = unsafe { &mut *self.inner.get() };

        match sem.queue.pop_front() {
            Some(waiter) => sched::wakeup_i(cs, waiter, Msg::Ok),
            None => {
                dbg_check!(sem.count < SemCount::MAX, "semaphore overflow");
                sem.count += 1;
            }
        }
    }

    /// Reset the semaphore to a new count.
    ///
    /// Every waiter is released with `Msg::Reset`; waits interrupted this
    /// way must not assume the protected resource was acquired.
    pub fn reset(&self, count: SemCount) {
        critical_section(|cs| {
            let sem = unsafe { &mut *self.inner.get() };

            while let Some(waiter) = sem.queue.pop_front() {
                sched::wakeup_i(cs, waiter, Msg::Reset);
            }
            sem.count = count;

            sched::reschedule_s(cs);
        });
    }

    /// Current count
    #[inline]
    pub fn count(&self) -> SemCount {
        critical_section(|_cs| unsafe { (*self.inner.get()).count })
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_wait_consumes_units_then_times_out() {
        let sem = Semaphore::new(2);

        assert_eq!(sem.wait(TIME_IMMEDIATE), Msg::Ok);
        assert_eq!(sem.wait(TIME_IMMEDIATE), Msg::Ok);
        assert_eq!(sem.count(), 0);

        // No units left: polling must not block.
        assert_eq!(sem.wait(TIME_IMMEDIATE), Msg::Timeout);
    }

    #[test]
    fn signal_without_waiters_increments_count() {
        let sem = Semaphore::new(0);

        critical_section(|cs| sem.signal_i(cs));
        critical_section(|cs| sem.signal_i(cs));
        assert_eq!(sem.count(), 2);

        assert_eq!(sem.wait(TIME_IMMEDIATE), Msg::Ok);
        assert_eq!(sem.count(), 1);
    }
}
