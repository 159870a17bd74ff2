//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting to
//! prevent priority inversion: while a more urgent thread waits, the owner
//! runs at the waiter's priority. Each thread tracks the mutexes it owns;
//! at unlock the owner's priority is recomputed from the waiters still
//! queued on its remaining mutexes, so a boost conferred through one mutex
//! survives the release of another.
//!
//! Locking is not recursive; taking a mutex twice from the same thread is
//! a usage error caught by the `checks` machinery.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::critical::{is_isr_context, critical_section, CriticalSection};
use crate::dbg_assert;
use crate::dbg_check;
use crate::kernel;
use crate::sched::{self, WaitQueue};
use crate::thread::Tcb;
use crate::types::{Msg, Prio, ThreadState, Interval, TIME_IMMEDIATE};

struct MutexState {
    queue: WaitQueue,
    owner: Option<NonNull<Tcb>>,
    /// Next mutex in the owner's owned-mutex list.
    next_owned: *mut Mutex,
}

/// Mutex with priority inheritance
pub struct Mutex {
    inner: UnsafeCell<MutexState>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

/// Links `m` into `tcb`'s owned-mutex list. Lock held.
fn push_owned(tcb: &mut Tcb, m: *mut Mutex) {
    unsafe { (*(*m).inner.get()).next_owned = tcb.mtx_list };
    tcb.mtx_list = m;
}

/// Unlinks `m` from `tcb`'s owned-mutex list. Lock held.
fn unlink_owned(tcb: &mut Tcb, m: *mut Mutex) {
    let mut point = tcb.mtx_list;
    let mut prev: *mut Mutex = core::ptr::null_mut();

    while !point.is_null() {
        let next = unsafe { (*(*point).inner.get()).next_owned };
        if point == m {
            if prev.is_null() {
                tcb.mtx_list = next;
            } else {
                unsafe { (*(*prev).inner.get()).next_owned = next };
            }
            unsafe { (*(*m).inner.get()).next_owned = core::ptr::null_mut() };
            return;
        }
        prev = point;
        point = next;
    }

    dbg_assert!(false, "unlocked mutex not in owned list");
}

/// Highest priority justified by the waiters still queued on `tcb`'s owned
/// mutexes, floored at its base priority. Lock held.
fn owned_ceiling(tcb: &Tcb) -> Prio {
    let mut prio = tcb.base_prio;
    let mut point = tcb.mtx_list;

    while !point.is_null() {
        let state = unsafe { &*(*point).inner.get() };
        if let Some(head) = state.queue.head() {
            let head_prio = unsafe { head.as_ref() }.prio;
            if head_prio > prio {
                prio = head_prio;
            }
        }
        point = state.next_owned;
    }

    prio
}

impl Mutex {
    /// Create a new, unowned mutex
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(MutexState {
                queue: WaitQueue::new(),
                owner: None,
                next_owned: core::ptr::null_mut(),
            }),
        }
    }

    /// Acquire the mutex.
    ///
    /// Waiters queue in priority order. While waiting on a less urgent
    /// owner, the owner's priority is raised to the waiter's.
    ///
    /// # Returns
    /// * `Msg::Ok` - mutex acquired, the caller is now the owner
    /// * `Msg::Timeout` - timeout elapsed, or polling found it owned
    pub fn lock(&self, timeout: Interval) -> Msg {
        dbg_check!(!is_isr_context(), "mutex lock in ISR");

        let cs = CriticalSection::enter();
        let mtx = unsafe { &mut *self.inner.get() };

        let cur = match kernel::current_tcb(&cs) {
            Some(p) => p,
            None => return Msg::Timeout,
        };

        if mtx.owner.is_none() {
            mtx.owner = Some(cur);
            push_owned(
                unsafe { &mut *cur.as_ptr() },
                self as *const Mutex as *mut Mutex,
            );
            return Msg::Ok;
        }

        dbg_check!(mtx.owner != Some(cur), "recursive mutex lock");

        if timeout == TIME_IMMEDIATE {
            return Msg::Timeout;
        }

        // Priority inheritance: lift the owner to the waiter's level.
        let cur_prio = unsafe { cur.as_ref() }.prio;
        if let Some(owner) = mtx.owner {
            let owner_ref = unsafe { &mut *owner.as_ptr() };
            if cur_prio > owner_ref.prio {
                if owner_ref.is_ready() {
                    unsafe { kernel::ready_queue(&cs).change_prio(owner, cur_prio) };
                } else {
                    owner_ref.prio = cur_prio;
                }
            }
        }

        mtx.queue.insert_by_prio(cur);

        // On Msg::Ok the unlocker has already transferred ownership and
        // linked this mutex into the owned list.
        sched::sleep_with_timeout(cs, ThreadState::WtMutex, timeout)
    }

    /// Acquire the mutex without blocking.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.lock(TIME_IMMEDIATE).is_ok()
    }

    /// Release the mutex with the lock already held, without rescheduling.
    ///
    /// Recomputes the caller's priority from the waiters still queued on
    /// its remaining owned mutexes, then hands ownership to the most
    /// urgent waiter, which is made ready behind its peers. The caller
    /// must reschedule before leaving the critical section.
    pub(crate) fn unlock_s(&self, cs: &CriticalSection) {
        let mtx = unsafe { &mut *self.inner.get() };

        let cur = kernel::current_tcb(cs);
        dbg_check!(mtx.owner == cur, "mutex unlock by non-owner");

        if let Some(cur) = cur {
            let cur_ref = unsafe { &mut *cur.as_ptr() };
            unlink_owned(cur_ref, self as *const Mutex as *mut Mutex);
            // The current thread is not in the ready queue, adjusting the
            // boost needs no requeue.
            cur_ref.prio = owned_ceiling(cur_ref);
        }

        match mtx.queue.pop_front() {
            Some(waiter) => {
                mtx.owner = Some(waiter);
                push_owned(
                    unsafe { &mut *waiter.as_ptr() },
                    self as *const Mutex as *mut Mutex,
                );
                sched::wakeup_i(cs, waiter, Msg::Ok);
            }
            None => mtx.owner = None,
        }
    }

    /// Release the mutex.
    ///
    /// After the caller's boost is dropped the woken waiter competes with
    /// every other ready thread: the reschedule picks whichever is most
    /// urgent, not necessarily the waiter.
    pub fn unlock(&self) {
        dbg_check!(!is_isr_context(), "mutex unlock in ISR");

        critical_section(|cs| {
            self.unlock_s(cs);
            sched::reschedule_s(cs);
        });
    }

    /// Whether `tcb` currently owns this mutex. Lock held.
    #[cfg(feature = "condvar")]
    pub(crate) fn owned_by(&self, _cs: &CriticalSection, tcb: NonNull<Tcb>) -> bool {
        unsafe { &*self.inner.get() }.owner == Some(tcb)
    }

    /// Check if the mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        critical_section(|_cs| unsafe { (*self.inner.get()).owner.is_some() })
    }

    /// Current owner's priority, if owned
    pub fn owner_prio(&self) -> Option<Prio> {
        critical_section(|_cs| {
            let mtx = unsafe { &*self.inner.get() };
            mtx.owner.map(|p| unsafe { p.as_ref() }.prio)
        })
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    fn make_tcb(prio: Prio) -> NonNull<Tcb> {
        let tcb = Box::leak(Box::new(Tcb::new()));
        tcb.prio = prio;
        tcb.base_prio = prio;
        NonNull::from(tcb)
    }

    fn set_current(tcb: Option<NonNull<Tcb>>) {
        unsafe {
            (*core::ptr::addr_of_mut!(crate::kernel::CPU_STATE)).tcb_cur =
                tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
        }
    }

    // Single test so the current-thread pointer is not contended by the
    // parallel test harness.
    #[test]
    fn unlock_recomputes_priority_from_remaining_owned_mutexes() {
        let owner = make_tcb(10);
        unsafe { &mut *owner.as_ptr() }.state = ThreadState::Current;
        set_current(Some(owner));

        let m1 = Mutex::new();
        let m2 = Mutex::new();

        // Owner takes both mutexes.
        assert!(m1.lock(TIME_IMMEDIATE).is_ok());
        assert!(m2.lock(TIME_IMMEDIATE).is_ok());
        assert_eq!(
            unsafe { owner.as_ref() }.mtx_list,
            &m2 as *const Mutex as *mut Mutex
        );

        let cs = CriticalSection::enter();

        // A prio-30 waiter blocks on m1 and boosts the owner.
        let waiter = make_tcb(30);
        unsafe { &mut *waiter.as_ptr() }.state = ThreadState::WtMutex;
        unsafe { &mut *m1.inner.get() }.queue.insert_by_prio(waiter);
        unsafe { &mut *owner.as_ptr() }.prio = 30;

        // Releasing the unrelated m2 must keep the boost: m1 still holds
        // the prio-30 waiter.
        m2.unlock_s(&cs);
        assert_eq!(unsafe { owner.as_ref() }.prio, 30);
        assert!(unsafe { &*m2.inner.get() }.owner.is_none());

        // The waiter gives up (timeout path unlinks it); the boost now
        // drops at the next unlock.
        unsafe { &mut *m1.inner.get() }.queue.remove(waiter);
        m1.unlock_s(&cs);
        assert_eq!(unsafe { owner.as_ref() }.prio, 10);
        assert!(unsafe { &*m1.inner.get() }.owner.is_none());
        assert!(unsafe { owner.as_ref() }.mtx_list.is_null());

        set_current(None);
    }
}
