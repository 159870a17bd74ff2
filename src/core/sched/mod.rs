//! Scheduler module
//!
//! Priority-based preemptive scheduler with optional round-robin rotation
//! among equal-priority threads.
//!
//! The running thread is never kept in the ready queue: blocking removes
//! nothing, and every switch pops the most urgent ready thread. Two insert
//! flavors control fairness: `behind` places a thread after its peers with a
//! fresh quantum, `ahead` places a preempted thread before its peers with
//! its quantum preserved.
//!
//! Functions suffixed `_s` must be called with the kernel locked from
//! thread context; `_i` variants are additionally legal from interrupt
//! handlers.

mod prio;
mod rdy_list;
mod wait_queue;

pub use prio::PrioTable;
pub use rdy_list::ReadyList;
pub use wait_queue::WaitQueue;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX};
use crate::critical::{critical_section, CriticalSection};
use crate::dbg_assert;
use crate::dbg_check;
use crate::debug;
use crate::kernel;
use crate::thread::Tcb;
use crate::types::{Interval, Msg, Prio, ThreadState, TIME_IMMEDIATE, TIME_INFINITE};

#[cfg(feature = "round-robin")]
use crate::config::CFG_TIME_QUANTUM;

/// Ready queue: per-priority FIFO lists plus the priority bitmap.
pub struct ReadyQueue {
    tbl: PrioTable,
    lists: [ReadyList; CFG_PRIO_MAX],
}

impl ReadyQueue {
    pub const fn new() -> Self {
        ReadyQueue {
            tbl: PrioTable::new(),
            lists: [ReadyList::new(); CFG_PRIO_MAX],
        }
    }

    pub fn reset(&mut self) {
        self.tbl.init();
        for list in self.lists.iter_mut() {
            list.init();
        }
    }

    /// Most urgent ready priority, `None` when no thread is ready.
    #[inline]
    pub fn first_prio(&self) -> Option<Prio> {
        if self.tbl.is_empty() {
            None
        } else {
            Some(self.tbl.get_highest())
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tbl.is_empty()
    }

    /// Insert behind equal-priority peers (FIFO order).
    ///
    /// # Safety
    /// `tcb` must be valid and not in any list.
    pub unsafe fn insert_behind(&mut self, tcb: NonNull<Tcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;
        self.lists[prio as usize].insert_tail(tcb);
        self.tbl.insert(prio);
    }

    /// Insert ahead of equal-priority peers.
    ///
    /// # Safety
    /// `tcb` must be valid and not in any list.
    pub unsafe fn insert_ahead(&mut self, tcb: NonNull<Tcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;
        self.lists[prio as usize].insert_head(tcb);
        self.tbl.insert(prio);
    }

    /// Remove a thread from its ready list.
    ///
    /// # Safety
    /// `tcb` must be valid and in the ready queue.
    pub unsafe fn remove(&mut self, tcb: NonNull<Tcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;
        let list = &mut self.lists[prio as usize];
        list.remove(tcb);
        if list.is_empty() {
            self.tbl.remove(prio);
        }
    }

    /// Remove and return the most urgent ready thread.
    pub fn pop_highest(&mut self) -> Option<NonNull<Tcb>> {
        let prio = self.first_prio()?;
        let list = &mut self.lists[prio as usize];
        let head = list.head()?;
        list.remove(head);
        if list.is_empty() {
            self.tbl.remove(prio);
        }
        Some(head)
    }

    /// Move a ready thread to a different priority level.
    ///
    /// Used by priority inheritance when the boosted owner is sitting in
    /// the ready queue.
    ///
    /// # Safety
    /// `tcb` must be valid and in the ready queue.
    pub unsafe fn change_prio(&mut self, tcb: NonNull<Tcb>, new_prio: Prio) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let old_prio = tcb_ref.prio;

        if old_prio == new_prio {
            return;
        }

        let old_list = &mut self.lists[old_prio as usize];
        old_list.remove(tcb);
        if old_list.is_empty() {
            self.tbl.remove(old_prio);
        }

        tcb_ref.prio = new_prio;

        self.lists[new_prio as usize].insert_tail(tcb);
        self.tbl.insert(new_prio);
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Ready state transitions ============

/// Make a thread ready, behind its equal-priority peers.
///
/// The caller is responsible for `rdy_msg` and for having unlinked the
/// thread from whatever it was blocked on.
pub fn ready_behind_i(cs: &CriticalSection, tcb: NonNull<Tcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    dbg_assert!(
        !tcb_ref.is_ready() && !tcb_ref.is_current() && !tcb_ref.is_final(),
        "readying a ready thread"
    );

    tcb_ref.state = ThreadState::Ready;
    #[cfg(feature = "round-robin")]
    {
        tcb_ref.quantum = CFG_TIME_QUANTUM;
    }

    unsafe { kernel::ready_queue(cs).insert_behind(tcb) };
}

/// Make a thread ready, ahead of its equal-priority peers, preserving its
/// remaining quantum. Used for preempted threads.
pub fn ready_ahead_i(cs: &CriticalSection, tcb: NonNull<Tcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    dbg_assert!(
        !tcb_ref.is_ready() && !tcb_ref.is_current() && !tcb_ref.is_final(),
        "readying a ready thread"
    );

    tcb_ref.state = ThreadState::Ready;

    unsafe { kernel::ready_queue(cs).insert_ahead(tcb) };
}

// ============ Context switch plumbing ============

/// Pop the most urgent ready thread, make it current and request the
/// switch. The previous current thread must already be accounted for.
fn switch_to_next(cs: &CriticalSection) {
    let next = kernel::ready_queue(cs)
        .pop_highest()
        .unwrap_or_else(|| debug::sys_halt("empty ready queue"));

    unsafe { (*next.as_ptr()).state = ThreadState::Current };
    kernel::set_next_tcb(cs, next);
    crate::port::os_ctx_sw();
}

#[cfg(feature = "checks")]
fn check_stack(tcb: &Tcb) {
    use crate::config::{CFG_STACK_FILL, CFG_STACK_GUARD_WORDS};

    if tcb.stk_base.is_null() {
        return;
    }
    for i in 0..CFG_STACK_GUARD_WORDS.min(tcb.stk_size) {
        if unsafe { *tcb.stk_base.add(i) } != CFG_STACK_FILL {
            debug::sys_halt("stack overflow");
        }
    }
}

/// Put the current thread to sleep in `new_state` and switch away.
///
/// The actual processor switch is taken when the caller's critical section
/// ends; kernel state is already coherent when this returns.
pub fn go_sleep_s(cs: &CriticalSection, new_state: ThreadState) {
    let cur = kernel::current_tcb(cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    dbg_assert!(cur_ref.prio != CFG_PRIO_IDLE, "idle thread blocked");

    #[cfg(feature = "checks")]
    check_stack(cur_ref);

    cur_ref.state = new_state;
    #[cfg(feature = "round-robin")]
    {
        cur_ref.quantum = CFG_TIME_QUANTUM;
    }

    switch_to_next(cs);
}

/// Timeout callback armed by [`sleep_with_timeout`].
///
/// Runs from the tick handler with the kernel locked. The blocked thread
/// may have been woken between the timer firing being decided and this call
/// never happens then: a thread found `Ready`, `Current` or `Final` lost
/// the race to a regular wakeup and is left alone.
fn wakeup_timeout(cs: &CriticalSection, arg: *mut ()) {
    let tcb = match NonNull::new(arg as *mut Tcb) {
        Some(p) => p,
        None => return,
    };
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    match tcb_ref.state {
        ThreadState::Ready | ThreadState::Current | ThreadState::Final => return,
        ThreadState::Sleeping => {}
        ThreadState::Suspended => {
            // Empty the reference slot so a later resume finds nothing.
            if let Some(r) = NonNull::new(tcb_ref.wt_ref) {
                unsafe { r.as_ref() }.clear(cs);
                tcb_ref.wt_ref = core::ptr::null_mut();
            }
        }
        _ => {
            // Blocked on a synchronization object: unlink from its queue.
            if let Some(mut q) = NonNull::new(tcb_ref.wait_obj) {
                unsafe { q.as_mut().remove(tcb) };
            }
        }
    }

    tcb_ref.rdy_msg = Msg::Timeout;
    ready_behind_i(cs, tcb);
}

/// Block the current thread in `new_state` with an optional timeout,
/// returning the wakeup message.
///
/// Consumes the critical section: the switch to the next thread is taken
/// when the guard drops, and a fresh critical section collects the result
/// after the thread is scheduled again. `TIME_INFINITE` blocks without a
/// timeout; `TIME_IMMEDIATE` is a usage error here, callers polling must
/// resolve it before blocking.
pub fn sleep_with_timeout(cs: CriticalSection, new_state: ThreadState, timeout: Interval) -> Msg {
    dbg_check!(timeout != TIME_IMMEDIATE, "blocking with immediate timeout");

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    let cur_ptr = cur.as_ptr();

    if timeout != TIME_INFINITE {
        unsafe { &mut *cur_ptr }.timer.set_i(
            &cs,
            timeout,
            wakeup_timeout,
            cur_ptr as *mut (),
        );
    }

    go_sleep_s(&cs, new_state);
    drop(cs);

    // Rescheduled: collect the verdict and disarm a still-pending timer.
    critical_section(|cs| {
        let cur_ref = unsafe { &mut *cur_ptr };
        cur_ref.timer.reset_i(cs);
        cur_ref.rdy_msg
    })
}

/// Block the current thread in `new_state` without a timeout.
#[inline]
pub fn sleep_s(cs: CriticalSection, new_state: ThreadState) -> Msg {
    sleep_with_timeout(cs, new_state, TIME_INFINITE)
}

// ============ Wakeup ============

/// Make a woken thread ready without considering preemption. Legal from
/// interrupt handlers; preemption is evaluated in the interrupt epilogue.
pub fn wakeup_i(cs: &CriticalSection, tcb: NonNull<Tcb>, msg: Msg) {
    unsafe { (*tcb.as_ptr()).rdy_msg = msg };
    ready_behind_i(cs, tcb);
}

/// Wake a thread from thread context, switching to it at once when it is
/// more urgent than the caller.
///
/// The woken thread must already be unlinked from whatever it was blocked
/// on. When the woken thread preempts, the caller re-enters the ready queue
/// ahead of its peers with its quantum intact.
pub fn wakeup_s(cs: &CriticalSection, tcb: NonNull<Tcb>, msg: Msg) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    tcb_ref.rdy_msg = msg;

    let cur = kernel::current_tcb(cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    if tcb_ref.prio <= cur_ref.prio {
        ready_behind_i(cs, tcb);
        return;
    }

    // The woken thread is more urgent: displace the caller.
    cur_ref.state = ThreadState::Ready;
    unsafe { kernel::ready_queue(cs).insert_ahead(cur) };

    tcb_ref.state = ThreadState::Current;
    kernel::set_next_tcb(cs, tcb);
    crate::port::os_ctx_sw();
}

// ============ Rescheduling ============

/// Reschedule if a more urgent thread became ready, for example after a
/// priority change. The displaced caller keeps its position ahead of its
/// peers.
pub fn reschedule_s(cs: &CriticalSection) {
    let cur = match kernel::current_tcb(cs) {
        Some(p) => p,
        None => return,
    };
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    let first = match kernel::ready_queue(cs).first_prio() {
        Some(p) => p,
        None => return,
    };

    if first <= cur_ref.prio {
        return;
    }

    cur_ref.state = ThreadState::Ready;
    unsafe { kernel::ready_queue(cs).insert_ahead(cur) };
    switch_to_next(cs);
}

/// Voluntarily yield to threads of equal or higher priority.
///
/// The caller goes behind its peers with a fresh quantum; no-op when no
/// other thread of at least its priority is ready.
pub fn yield_s(cs: &CriticalSection) {
    let cur = match kernel::current_tcb(cs) {
        Some(p) => p,
        None => return,
    };
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    let first = match kernel::ready_queue(cs).first_prio() {
        Some(p) => p,
        None => return,
    };

    if first < cur_ref.prio {
        return;
    }

    cur_ref.state = ThreadState::Ready;
    #[cfg(feature = "round-robin")]
    {
        cur_ref.quantum = CFG_TIME_QUANTUM;
    }
    unsafe { kernel::ready_queue(cs).insert_behind(cur) };
    switch_to_next(cs);
}

// ============ Interrupt-driven preemption ============

/// Whether the interrupt epilogue must preempt the current thread.
///
/// A strictly more urgent ready thread always preempts. With round-robin,
/// an equal-priority thread preempts once the current thread's quantum is
/// used up.
pub fn preemption_required(cs: &CriticalSection) -> bool {
    let cur = match kernel::current_tcb(cs) {
        Some(p) => p,
        None => return false,
    };
    let cur_ref = unsafe { cur.as_ref() };

    // A switch already pended by a nested handler displaced the current
    // thread; deciding again would enqueue it twice.
    if !cur_ref.is_current() {
        return false;
    }

    let first = match kernel::ready_queue(cs).first_prio() {
        Some(p) => p,
        None => return false,
    };

    #[cfg(feature = "round-robin")]
    return if cur_ref.quantum > 0 {
        first > cur_ref.prio
    } else {
        first >= cur_ref.prio
    };

    #[cfg(not(feature = "round-robin"))]
    return first > cur_ref.prio;
}

/// Preempt the current thread from the interrupt epilogue.
///
/// A thread losing the processor with quantum remaining re-enters ahead of
/// its peers; one that exhausted its quantum rotates behind them with a
/// fresh quantum.
pub fn do_preemption(cs: &CriticalSection) {
    let cur = kernel::current_tcb(cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    #[cfg(feature = "checks")]
    check_stack(cur_ref);

    cur_ref.state = ThreadState::Ready;

    #[cfg(feature = "round-robin")]
    {
        if cur_ref.quantum == 0 {
            cur_ref.quantum = CFG_TIME_QUANTUM;
            unsafe { kernel::ready_queue(cs).insert_behind(cur) };
        } else {
            unsafe { kernel::ready_queue(cs).insert_ahead(cur) };
        }
    }
    #[cfg(not(feature = "round-robin"))]
    unsafe {
        kernel::ready_queue(cs).insert_ahead(cur)
    };

    let next = kernel::ready_queue(cs)
        .pop_highest()
        .unwrap_or_else(|| debug::sys_halt("empty ready queue"));
    unsafe { (*next.as_ptr()).state = ThreadState::Current };
    kernel::set_next_tcb(cs, next);
    crate::port::os_int_ctx_sw();
}

/// Round-robin quantum accounting, called once per tick.
#[cfg(feature = "round-robin")]
pub fn quantum_tick_i(cs: &CriticalSection) {
    if let Some(cur) = kernel::current_tcb(cs) {
        let cur_ref = unsafe { &mut *cur.as_ptr() };
        if cur_ref.quantum > 0 {
            cur_ref.quantum -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadRef;
    use std::boxed::Box;

    fn make_tcb(prio: Prio, state: ThreadState) -> NonNull<Tcb> {
        let tcb = Box::leak(Box::new(Tcb::new()));
        tcb.prio = prio;
        tcb.base_prio = prio;
        tcb.state = state;
        NonNull::from(tcb)
    }

    // Single test so the global ready queue is not contended by the
    // parallel test harness.
    #[test]
    fn timeout_callback_respects_thread_state() {
        let cs = CriticalSection::enter();

        // An already-ready thread won the race against its timeout; the
        // callback must leave it untouched.
        let winner = make_tcb(9, ThreadState::Ready);
        unsafe { (*winner.as_ptr()).rdy_msg = Msg::Ok };
        wakeup_timeout(&cs, winner.as_ptr() as *mut ());
        assert_eq!(unsafe { winner.as_ref() }.state, ThreadState::Ready);
        assert_eq!(unsafe { winner.as_ref() }.rdy_msg, Msg::Ok);

        // A thread blocked on a synchronization object is unlinked from
        // its wait queue and readied with the timeout verdict.
        let mut queue = WaitQueue::new();
        let blocked = make_tcb(9, ThreadState::WtSem);
        queue.insert_by_prio(blocked);
        wakeup_timeout(&cs, blocked.as_ptr() as *mut ());
        assert!(queue.is_empty());
        assert!(unsafe { blocked.as_ref() }.wait_obj.is_null());
        assert_eq!(unsafe { blocked.as_ref() }.state, ThreadState::Ready);
        assert_eq!(unsafe { blocked.as_ref() }.rdy_msg, Msg::Timeout);
        unsafe { kernel::ready_queue(&cs).remove(blocked) };

        // A suspended thread's reference slot is emptied, so a resume
        // arriving after the timeout finds nothing and the timeout
        // verdict stands.
        let slot = ThreadRef::new();
        let parked = make_tcb(9, ThreadState::Suspended);
        slot.set(&cs, parked);
        unsafe {
            (*parked.as_ptr()).wt_ref = &slot as *const ThreadRef as *mut ThreadRef;
        }
        wakeup_timeout(&cs, parked.as_ptr() as *mut ());
        assert!(slot.get(&cs).is_none());
        assert!(unsafe { parked.as_ref() }.wt_ref.is_null());
        assert_eq!(unsafe { parked.as_ref() }.state, ThreadState::Ready);
        assert_eq!(unsafe { parked.as_ref() }.rdy_msg, Msg::Timeout);

        crate::thread::os_thread_resume_i(&cs, &slot, Msg::Data(7));
        assert_eq!(unsafe { parked.as_ref() }.rdy_msg, Msg::Timeout);
        unsafe { kernel::ready_queue(&cs).remove(parked) };
    }
}
