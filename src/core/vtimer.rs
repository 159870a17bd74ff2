//! Virtual timers.
//!
//! Armed timers live in an ordered intrusive delta list: each node stores
//! the difference between its own deadline and the deadline of the node
//! before it, so advancing time by one tick costs a single decrement of the
//! head. Insertion walks the list consuming the requested delay hop by hop
//! and re-bases the follower at the insertion point.
//!
//! Invariant: the sum of deltas from the head up to any node equals that
//! node's remaining time, and the list is sorted ascending by deadline.
//!
//! Every mutating operation exists in two tiers: an `_i` variant that
//! assumes the kernel lock is held (callable from ISR handlers) and a plain
//! variant that acquires the lock around it.

use core::ptr::NonNull;

use crate::critical::{critical_section, CriticalSection};
use crate::dbg_assert;
use crate::dbg_check;
use crate::kernel;
use crate::types::{Interval, TIME_IMMEDIATE, TIME_INFINITE};

/// Timer callback type.
///
/// Invoked from the tick handler with the kernel already locked (I-class
/// context): the callback must not block and may only use `_i` entry points.
pub type TimerFn = fn(&CriticalSection, *mut ());

/// A one-shot or continuous software timer.
///
/// The structure is an intrusive node; it must stay pinned in memory while
/// armed (static storage or an enclosing TCB).
pub struct VirtualTimer {
    next: Option<NonNull<VirtualTimer>>,
    prev: Option<NonNull<VirtualTimer>>,
    /// Ticks between the predecessor's deadline and this node's deadline.
    delta: Interval,
    func: Option<TimerFn>,
    arg: *mut (),
    /// Re-arm interval for continuous timers, 0 for one-shot.
    reload: Interval,
    armed: bool,
}

unsafe impl Send for VirtualTimer {}
unsafe impl Sync for VirtualTimer {}

impl VirtualTimer {
    /// Creates a new, disarmed timer.
    pub const fn new() -> Self {
        VirtualTimer {
            next: None,
            prev: None,
            delta: 0,
            func: None,
            arg: core::ptr::null_mut(),
            reload: 0,
            armed: false,
        }
    }

    /// Whether the timer is currently linked into the timer queue.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn do_set_i(
        &mut self,
        cs: &CriticalSection,
        delay: Interval,
        func: TimerFn,
        arg: *mut (),
        reload: Interval,
    ) {
        dbg_check!(delay != TIME_IMMEDIATE, "immediate timer delay");
        dbg_assert!(!self.armed, "timer already armed");

        self.func = Some(func);
        self.arg = arg;
        self.reload = reload;

        // An infinite delay never fires; the node is simply not linked.
        if delay == TIME_INFINITE {
            return;
        }

        let vt = NonNull::from(&mut *self);
        unsafe { kernel::timer_queue(cs).insert(vt, delay) };
    }

    /// Arms the timer to fire `func(arg)` once, no earlier than `delay`
    /// ticks from now. Lock already held.
    #[inline]
    pub fn set_i(&mut self, cs: &CriticalSection, delay: Interval, func: TimerFn, arg: *mut ()) {
        self.do_set_i(cs, delay, func, arg, 0);
    }

    /// Arms the timer to fire every `delay` ticks. Lock already held.
    #[inline]
    pub fn set_continuous_i(
        &mut self,
        cs: &CriticalSection,
        delay: Interval,
        func: TimerFn,
        arg: *mut (),
    ) {
        self.do_set_i(cs, delay, func, arg, delay);
    }

    /// Arms the timer to fire once. Acquires the lock.
    pub fn set(&mut self, delay: Interval, func: TimerFn, arg: *mut ()) {
        critical_section(|cs| self.set_i(cs, delay, func, arg));
    }

    /// Arms the timer to fire periodically. Acquires the lock.
    pub fn set_continuous(&mut self, delay: Interval, func: TimerFn, arg: *mut ()) {
        critical_section(|cs| self.set_continuous_i(cs, delay, func, arg));
    }

    /// Disarms the timer. Safe to call redundantly: a timer that already
    /// fired or was never armed is left untouched. Lock already held.
    pub fn reset_i(&mut self, cs: &CriticalSection) {
        self.reload = 0;
        let vt = NonNull::from(&mut *self);
        unsafe { kernel::timer_queue(cs).remove(vt) };
    }

    /// Disarms the timer. Acquires the lock.
    pub fn reset(&mut self) {
        critical_section(|cs| self.reset_i(cs));
    }

    /// Remaining ticks before the timer fires, `None` when disarmed.
    /// Lock already held.
    pub fn remaining_i(&self, cs: &CriticalSection) -> Option<Interval> {
        let vt = NonNull::from(self);
        kernel::timer_queue(cs).remaining(vt)
    }

    /// Remaining ticks before the timer fires. Acquires the lock.
    pub fn remaining(&self) -> Option<Interval> {
        critical_section(|cs| self.remaining_i(cs))
    }
}

impl Default for VirtualTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered delta list of armed timers.
pub struct TimerQueue {
    head: Option<NonNull<VirtualTimer>>,
}

unsafe impl Send for TimerQueue {}
unsafe impl Sync for TimerQueue {}

impl TimerQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        TimerQueue { head: None }
    }

    /// Whether no timer is armed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Links a timer `delay` ticks into the future.
    ///
    /// Walks the list decrementing `delay` by each hop's stored delta until
    /// the insertion point is found; the remainder becomes the new node's
    /// delta and the follower is re-based by the same amount.
    ///
    /// # Safety
    /// `vt` must point to a valid, disarmed timer that stays pinned while
    /// armed; the caller must hold the kernel lock.
    pub unsafe fn insert(&mut self, vt: NonNull<VirtualTimer>, mut delay: Interval) {
        let mut point = self.head;
        let mut prev: Option<NonNull<VirtualTimer>> = None;

        while let Some(p) = point {
            let p_ref = unsafe { &mut *p.as_ptr() };
            if delay < p_ref.delta {
                p_ref.delta -= delay;
                break;
            }
            delay -= p_ref.delta;
            prev = point;
            point = p_ref.next;
        }

        let vt_ref = unsafe { &mut *vt.as_ptr() };
        vt_ref.delta = delay;
        vt_ref.prev = prev;
        vt_ref.next = point;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).next = Some(vt) },
            None => self.head = Some(vt),
        }
        if let Some(mut n) = point {
            unsafe { n.as_mut().prev = Some(vt) };
        }

        vt_ref.armed = true;
    }

    /// Unlinks a timer, preserving the absolute deadlines of its followers
    /// by adding its delta onto the next node. No-op when disarmed.
    ///
    /// # Safety
    /// `vt` must point to a valid timer; the caller must hold the kernel
    /// lock.
    pub unsafe fn remove(&mut self, vt: NonNull<VirtualTimer>) {
        let vt_ref = unsafe { &mut *vt.as_ptr() };
        if !vt_ref.armed {
            return;
        }

        if let Some(mut n) = vt_ref.next {
            unsafe {
                n.as_mut().delta += vt_ref.delta;
                n.as_mut().prev = vt_ref.prev;
            }
        }
        match vt_ref.prev {
            Some(p) => unsafe { (*p.as_ptr()).next = vt_ref.next },
            None => self.head = vt_ref.next,
        }

        vt_ref.next = None;
        vt_ref.prev = None;
        vt_ref.armed = false;
    }

    /// Advances the queue by one tick.
    ///
    /// Decrements the head delta, then fires every timer whose deadline is
    /// reached, in deadline order. Callbacks run with the kernel still
    /// locked; continuous timers are re-inserted with their reload interval.
    pub fn tick(&mut self, cs: &CriticalSection) {
        let Some(head) = self.head else { return };

        let h = unsafe { &mut *head.as_ptr() };
        dbg_assert!(h.delta > 0, "corrupt timer delta");
        h.delta -= 1;

        while let Some(head) = self.head {
            let h = unsafe { &mut *head.as_ptr() };
            if h.delta != 0 {
                break;
            }

            // Deadline reached: unlink and mark disarmed before invoking
            // the callback so the callback may re-arm this same timer.
            self.head = h.next;
            if let Some(mut n) = h.next {
                unsafe { n.as_mut().prev = None };
            }
            h.next = None;
            h.prev = None;
            h.armed = false;

            if let Some(func) = h.func {
                func(cs, h.arg);
            }

            if h.reload > 0 && h.reload != TIME_INFINITE && !h.armed {
                unsafe { self.insert(head, h.reload) };
            }
        }
    }

    /// Remaining ticks before `vt` fires, `None` when it is not armed.
    pub fn remaining(&self, vt: NonNull<VirtualTimer>) -> Option<Interval> {
        if !unsafe { vt.as_ref() }.armed {
            return None;
        }

        let mut total: Interval = 0;
        let mut point = self.head;
        while let Some(p) = point {
            let p_ref = unsafe { p.as_ref() };
            total += p_ref.delta;
            if p == vt {
                return Some(total);
            }
            point = p_ref.next;
        }

        dbg_assert!(false, "armed timer not in queue");
        None
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the kernel timer queue by one tick. Lock already held.
pub(crate) fn tick_i(cs: &CriticalSection) {
    kernel::timer_queue(cs).tick(cs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn bump(_cs: &CriticalSection, arg: *mut ()) {
        let ctr = unsafe { &*(arg as *const AtomicU32) };
        ctr.fetch_add(1, Ordering::Relaxed);
    }

    fn armed_timer(ctr: &AtomicU32) -> VirtualTimer {
        let mut vt = VirtualTimer::new();
        vt.func = Some(bump);
        vt.arg = ctr as *const AtomicU32 as *mut ();
        vt
    }

    fn run_ticks(q: &mut TimerQueue, n: u32) {
        for _ in 0..n {
            critical_section(|cs| q.tick(cs));
        }
    }

    #[test]
    fn fires_in_deadline_order() {
        let ca = AtomicU32::new(0);
        let cb = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);
        let mut b = armed_timer(&cb);

        unsafe {
            q.insert(NonNull::from(&mut a), 3);
            q.insert(NonNull::from(&mut b), 1);
        }

        run_ticks(&mut q, 1);
        assert_eq!(cb.load(Ordering::Relaxed), 1);
        assert_eq!(ca.load(Ordering::Relaxed), 0);
        assert!(!b.is_armed());
        assert!(a.is_armed());

        run_ticks(&mut q, 2);
        assert_eq!(ca.load(Ordering::Relaxed), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn equal_deadlines_fire_same_tick() {
        let ca = AtomicU32::new(0);
        let cb = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);
        let mut b = armed_timer(&cb);

        unsafe {
            q.insert(NonNull::from(&mut a), 2);
            q.insert(NonNull::from(&mut b), 2);
        }

        run_ticks(&mut q, 1);
        assert_eq!(ca.load(Ordering::Relaxed) + cb.load(Ordering::Relaxed), 0);

        run_ticks(&mut q, 1);
        assert_eq!(ca.load(Ordering::Relaxed), 1);
        assert_eq!(cb.load(Ordering::Relaxed), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn disarm_prevents_firing_and_rebases_followers() {
        let ca = AtomicU32::new(0);
        let cb = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);
        let mut b = armed_timer(&cb);

        unsafe {
            q.insert(NonNull::from(&mut a), 5);
            q.insert(NonNull::from(&mut b), 9);
            q.remove(NonNull::from(&mut a));
        }

        // The follower keeps its absolute deadline.
        assert_eq!(
            q.remaining(NonNull::from(&mut b)),
            Some(9)
        );

        run_ticks(&mut q, 8);
        assert_eq!(cb.load(Ordering::Relaxed), 0);
        run_ticks(&mut q, 1);
        assert_eq!(cb.load(Ordering::Relaxed), 1);

        assert_eq!(ca.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn redundant_disarm_is_harmless() {
        let ca = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);

        unsafe {
            q.remove(NonNull::from(&mut a));
            q.insert(NonNull::from(&mut a), 2);
            q.remove(NonNull::from(&mut a));
            q.remove(NonNull::from(&mut a));
        }

        run_ticks(&mut q, 10);
        assert_eq!(ca.load(Ordering::Relaxed), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn long_and_short_coexist() {
        // A 1-tick timer inserted in front of a 99-tick timer must not
        // disturb the long deadline.
        let c_short = AtomicU32::new(0);
        let c_long = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut long = armed_timer(&c_long);
        let mut short = armed_timer(&c_short);

        unsafe {
            q.insert(NonNull::from(&mut long), 99);
            q.insert(NonNull::from(&mut short), 1);
        }
        assert_eq!(q.remaining(NonNull::from(&mut long)), Some(99));

        run_ticks(&mut q, 1);
        assert_eq!(c_short.load(Ordering::Relaxed), 1);

        run_ticks(&mut q, 97);
        assert_eq!(c_long.load(Ordering::Relaxed), 0);
        run_ticks(&mut q, 1);
        assert_eq!(c_long.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn continuous_timer_reloads() {
        let ca = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);
        a.reload = 4;

        unsafe { q.insert(NonNull::from(&mut a), 4) };

        run_ticks(&mut q, 12);
        assert_eq!(ca.load(Ordering::Relaxed), 3);
        assert!(a.is_armed());

        unsafe { q.remove(NonNull::from(&mut a)) };
        run_ticks(&mut q, 12);
        assert_eq!(ca.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn remaining_reports_none_when_disarmed() {
        let ca = AtomicU32::new(0);
        let mut q = TimerQueue::new();
        let mut a = armed_timer(&ca);

        assert_eq!(q.remaining(NonNull::from(&mut a)), None);
        unsafe { q.insert(NonNull::from(&mut a), 7) };
        assert_eq!(q.remaining(NonNull::from(&mut a)), Some(7));
        run_ticks(&mut q, 3);
        assert_eq!(q.remaining(NonNull::from(&mut a)), Some(4));
    }
}
