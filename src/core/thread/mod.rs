//! Thread management module
//!
//! Thread creation, termination, join, timed sleeps and the
//! suspend/resume-by-reference protocol.

mod tcb;

pub use tcb::Tcb;

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::config::{
    CFG_PRIO_HIGH, CFG_PRIO_LOW, CFG_STACK_FILL, CFG_STK_SIZE_MIN,
};
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::dbg_assert;
use crate::dbg_check;
use crate::debug;
use crate::kernel;
use crate::registry;
use crate::sched;
use crate::time;
use crate::types::{
    Interval, Msg, Prio, StkElement, ThreadFn, ThreadState, Tick,
    TIME_IMMEDIATE, TIME_INFINITE,
};

#[cfg(feature = "round-robin")]
use crate::config::CFG_TIME_QUANTUM;

// ============ Thread reference ============

/// A single-slot reference used by the suspend/resume protocol.
///
/// A thread parks itself on an empty slot with [`os_thread_suspend`]; a
/// producer wakes it at most once with [`os_thread_resume`] or
/// [`os_thread_resume_i`]. The slot empties on every wakeup path, including
/// timeout, so a resume never touches a thread that already moved on.
pub struct ThreadRef(UnsafeCell<Option<NonNull<Tcb>>>);

unsafe impl Send for ThreadRef {}
unsafe impl Sync for ThreadRef {}

impl ThreadRef {
    /// Creates an empty reference slot.
    pub const fn new() -> Self {
        ThreadRef(UnsafeCell::new(None))
    }

    /// Thread currently parked on this slot, if any.
    #[inline]
    pub fn get(&self, _cs: &CriticalSection) -> Option<NonNull<Tcb>> {
        unsafe { *self.0.get() }
    }

    #[inline]
    pub(crate) fn set(&self, _cs: &CriticalSection, tcb: NonNull<Tcb>) {
        unsafe { *self.0.get() = Some(tcb) };
    }

    /// Empties the slot, returning the parked thread.
    #[inline]
    pub(crate) fn take(&self, _cs: &CriticalSection) -> Option<NonNull<Tcb>> {
        unsafe { (*self.0.get()).take() }
    }

    /// Empties the slot.
    #[inline]
    pub(crate) fn clear(&self, _cs: &CriticalSection) {
        unsafe { *self.0.get() = None };
    }
}

impl Default for ThreadRef {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Creation ============

/// Shared TCB/stack setup for thread creation. Lock already held.
unsafe fn setup_thread(
    cs: &CriticalSection,
    tcb: *mut Tcb,
    name: &'static str,
    thread_fn: ThreadFn,
    arg: *mut (),
    prio: Prio,
    stk_base: *mut StkElement,
    stk_size: usize,
) -> NonNull<Tcb> {
    let tcb_ref = unsafe { &mut *tcb };
    tcb_ref.init();

    tcb_ref.name = name;
    tcb_ref.prio = prio;
    tcb_ref.base_prio = prio;
    // Nascent until inserted into the ready queue.
    tcb_ref.state = ThreadState::Sleeping;
    #[cfg(feature = "round-robin")]
    {
        tcb_ref.quantum = CFG_TIME_QUANTUM;
    }

    // Paint the stack so the overflow check has a pattern to verify.
    for i in 0..stk_size {
        unsafe { stk_base.add(i).write(CFG_STACK_FILL) };
    }

    tcb_ref.stk_ptr = unsafe {
        crate::port::os_thread_stk_init(thread_fn, arg, stk_base, stk_size)
    };
    tcb_ref.stk_base = stk_base;
    tcb_ref.stk_size = stk_size;

    let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
    registry::insert_i(cs, tcb_nonnull);
    tcb_nonnull
}

/// Create a new thread from static storage.
///
/// The new thread enters the ready queue behind its equal-priority peers;
/// when the kernel is running and the new thread is more urgent than the
/// caller it starts executing before this function returns.
///
/// Returns a handle usable with [`os_thread_join`] and the wakeup APIs.
///
/// # Example
/// ```ignore
/// static mut WORKER_TCB: Tcb = Tcb::new();
/// static mut WORKER_STK: [StkElement; 256] = [0; 256];
///
/// fn worker(_: *mut ()) {
///     // ...
/// }
///
/// let handle = os_thread_create(
///     unsafe { &mut WORKER_TCB },
///     unsafe { &mut WORKER_STK },
///     "worker",
///     worker,
///     core::ptr::null_mut(),
///     12,
/// );
/// ```
pub fn os_thread_create(
    tcb: &'static mut Tcb,
    stack: &'static mut [StkElement],
    name: &'static str,
    thread_fn: ThreadFn,
    arg: *mut (),
    prio: Prio,
) -> NonNull<Tcb> {
    dbg_check!(
        (CFG_PRIO_LOW..=CFG_PRIO_HIGH).contains(&prio),
        "invalid thread priority"
    );
    dbg_check!(stack.len() >= CFG_STK_SIZE_MIN, "stack too small");
    dbg_check!(!is_isr_context(), "thread creation in ISR");

    critical_section(|cs| {
        let handle = unsafe {
            setup_thread(
                cs,
                tcb as *mut Tcb,
                name,
                thread_fn,
                arg,
                prio,
                stack.as_mut_ptr(),
                stack.len(),
            )
        };

        sched::ready_behind_i(cs, handle);

        if kernel::KERNEL.is_running() {
            sched::reschedule_s(cs);
        }

        handle
    })
}

/// Internal thread creation for kernel use (idle thread). Accepts the idle
/// priority and skips rescheduling.
#[doc(hidden)]
pub(crate) unsafe fn os_thread_create_internal(
    cs: &CriticalSection,
    tcb: *mut Tcb,
    name: &'static str,
    thread_fn: ThreadFn,
    prio: Prio,
    stk_base: *mut StkElement,
    stk_size: usize,
) -> NonNull<Tcb> {
    let handle = unsafe {
        setup_thread(cs, tcb, name, thread_fn, core::ptr::null_mut(), prio, stk_base, stk_size)
    };

    sched::ready_behind_i(cs, handle);
    handle
}

// ============ Termination ============

/// Terminate the calling thread with an exit code.
///
/// The TCB stays in the registry in `Final` state until another thread
/// collects the exit code with [`os_thread_join`]. Returning from the
/// thread entry function is equivalent to `os_thread_exit(Msg::Ok)`.
pub fn os_thread_exit(msg: Msg) -> ! {
    dbg_check!(!is_isr_context(), "thread exit in ISR");

    let cs = CriticalSection::enter();

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    let cur_ref = unsafe { &mut *cur.as_ptr() };

    cur_ref.exit_code = msg;

    if let Some(joiner) = cur_ref.joiner.take() {
        sched::wakeup_i(&cs, joiner, Msg::Ok);
    }

    sched::go_sleep_s(&cs, ThreadState::Final);
    drop(cs);

    debug::sys_halt("terminated thread resumed")
}

/// Wait for a thread to terminate and collect its exit code.
///
/// At most one thread may join a given thread, exactly once; the joined
/// TCB is removed from the registry and its storage may be reused after
/// this returns.
pub fn os_thread_join(thread: NonNull<Tcb>) -> Msg {
    dbg_check!(!is_isr_context(), "join in ISR");

    let cs = CriticalSection::enter();

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    dbg_check!(thread != cur, "joining self");

    let target = unsafe { &mut *thread.as_ptr() };
    dbg_check!(!target.joined, "thread joined twice");

    if !target.is_final() {
        dbg_check!(target.joiner.is_none(), "thread already has a joiner");
        target.joiner = Some(cur);
        sched::sleep_s(cs, ThreadState::WtExit);
    } else {
        drop(cs);
    }

    critical_section(|cs| {
        let target = unsafe { &mut *thread.as_ptr() };
        dbg_assert!(target.is_final(), "joined thread not terminated");
        target.joined = true;
        registry::remove_i(cs, thread);
        target.exit_code
    })
}

// ============ Sleeps ============

/// Sleep for a fixed number of ticks.
pub fn os_thread_sleep(ticks: Interval) {
    dbg_check!(
        ticks != TIME_IMMEDIATE && ticks != TIME_INFINITE,
        "invalid sleep duration"
    );
    dbg_check!(!is_isr_context(), "sleep in ISR");

    let cs = CriticalSection::enter();
    let _ = sched::sleep_with_timeout(cs, ThreadState::Sleeping, ticks);
}

/// Sleep until an absolute tick value. Returns immediately when the
/// deadline equals the current time; a deadline already in the past wraps
/// into the future, use [`os_thread_sleep_until_windowed`] when that can
/// happen.
pub fn os_thread_sleep_until(deadline: Tick) {
    dbg_check!(!is_isr_context(), "sleep in ISR");

    let cs = CriticalSection::enter();
    let delta = time::time_diff(kernel::KERNEL.tick_get(), deadline);
    if delta != 0 {
        let _ = sched::sleep_with_timeout(cs, ThreadState::Sleeping, delta);
    }
}

/// Sleep until `next`, but only when the current time still lies inside
/// the window `[prev, next)`. Returns `next`, which makes periodic loops
/// immune to drift:
///
/// ```ignore
/// let mut deadline = time::now();
/// loop {
///     deadline = os_thread_sleep_until_windowed(deadline, time::time_add(deadline, PERIOD));
///     // periodic work
/// }
/// ```
pub fn os_thread_sleep_until_windowed(prev: Tick, next: Tick) -> Tick {
    dbg_check!(!is_isr_context(), "sleep in ISR");

    let cs = CriticalSection::enter();
    let now = kernel::KERNEL.tick_get();
    if time::is_in_range(now, prev, next) {
        let _ = sched::sleep_with_timeout(
            cs,
            ThreadState::Sleeping,
            time::time_diff(now, next),
        );
    }
    next
}

/// Voluntarily give up the processor to equal or higher priority threads.
pub fn os_thread_yield() {
    dbg_check!(!is_isr_context(), "yield in ISR");

    critical_section(|cs| sched::yield_s(cs));
}

// ============ Suspend / resume ============

/// Park the calling thread on a reference slot until resumed or the
/// timeout elapses.
///
/// Returns the message passed by the resumer, `Msg::Timeout` when the
/// timeout elapsed first. `TIME_IMMEDIATE` polls and always times out.
pub fn os_thread_suspend(r: &ThreadRef, timeout: Interval) -> Msg {
    dbg_check!(!is_isr_context(), "suspend in ISR");

    if timeout == TIME_IMMEDIATE {
        return Msg::Timeout;
    }

    let cs = CriticalSection::enter();

    dbg_assert!(r.get(&cs).is_none(), "reference slot already in use");

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    r.set(&cs, cur);
    unsafe { (*cur.as_ptr()).wt_ref = r as *const ThreadRef as *mut ThreadRef };

    sched::sleep_with_timeout(cs, ThreadState::Suspended, timeout)
}

/// Resume the thread parked on `r`, if any, from an interrupt handler or
/// any lock-held context. At most one resume takes effect per suspend.
pub fn os_thread_resume_i(cs: &CriticalSection, r: &ThreadRef, msg: Msg) {
    if let Some(tcb) = r.take(cs) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        dbg_assert!(
            tcb_ref.state == ThreadState::Suspended,
            "resuming a thread not suspended"
        );
        tcb_ref.wt_ref = core::ptr::null_mut();
        sched::wakeup_i(cs, tcb, msg);
    }
}

/// Resume the thread parked on `r`, if any, from thread context. When the
/// resumed thread is more urgent than the caller it runs at once.
pub fn os_thread_resume(r: &ThreadRef, msg: Msg) {
    critical_section(|cs| {
        if let Some(tcb) = r.take(cs) {
            let tcb_ref = unsafe { &mut *tcb.as_ptr() };
            dbg_assert!(
                tcb_ref.state == ThreadState::Suspended,
                "resuming a thread not suspended"
            );
            tcb_ref.wt_ref = core::ptr::null_mut();
            sched::wakeup_s(cs, tcb, msg);
        }
    });
}
